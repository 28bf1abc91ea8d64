//! Admin key extractor for the `/api/admin` routes.

use crate::handlers::ErrorResponse;
use crate::state::AppState;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::Json;

pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// Proof that the request carried the configured `ADMIN_API_KEY`
pub struct AdminKey;

impl FromRequestParts<AppState> for AdminKey {
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let expected = state.config.admin_api_key.as_deref().ok_or_else(|| {
            (
                StatusCode::FORBIDDEN,
                Json(ErrorResponse::new("Admin API is disabled", 403)),
            )
        })?;

        let provided = parts
            .headers
            .get(ADMIN_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(ErrorResponse::new("Missing x-admin-key header", 401)),
                )
            })?;

        if !keys_match(provided.as_bytes(), expected.as_bytes()) {
            tracing::warn!("Rejected admin request with a wrong key");
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::new("Invalid admin key", 401)),
            ));
        }

        Ok(AdminKey)
    }
}

/// Constant-time for equal lengths
fn keys_match(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
