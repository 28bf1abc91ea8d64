//! # Admin Handlers
//!
//! Read a user's stored subscription and grant a tier by hand. Grants go
//! through the same update constructors as webhooks, so the expiry rules
//! are the same.

use crate::auth::AdminKey;
use crate::handlers::{bad_request, payment_error_to_response, ApiError};
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use buildfy_core::{PaymentProvenance, Subscription, SubscriptionUpdate, Tier};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

const MANUAL_PROVIDER: &str = "manual";

/// Manual grant request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantRequest {
    pub tier: String,
    #[serde(default)]
    pub payment_id: Option<String>,
    /// Free-text reason, logged only
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionResponse {
    pub user_id: String,
    pub subscription: Option<Subscription>,
    /// Tier the user can use right now
    pub effective_tier: Tier,
}

#[derive(Debug, Serialize)]
pub struct GrantResponse {
    pub user_id: String,
    pub written: Vec<&'static str>,
    pub subscription: Option<Subscription>,
}

/// The update a manual grant writes
pub fn grant_update(tier: Tier, payment_id: Option<String>) -> SubscriptionUpdate {
    let now = Utc::now();
    let payment_id = payment_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| format!("manual_{}", Uuid::new_v4().simple()));

    if tier.is_paid() {
        let provenance = PaymentProvenance {
            provider: MANUAL_PROVIDER.to_string(),
            payment_id,
            price: None,
            payment_method: None,
        };
        SubscriptionUpdate::activated(tier, provenance, now, now)
    } else {
        // revoking writes the same fields as a refund
        SubscriptionUpdate::refunded(payment_id, MANUAL_PROVIDER, now)
    }
}

/// Read a user's stored subscription
#[instrument(skip(state, _admin))]
pub async fn get_subscription(
    State(state): State<AppState>,
    _admin: AdminKey,
    Path(user_id): Path<String>,
) -> Result<Json<SubscriptionResponse>, ApiError> {
    let subscription = state
        .store
        .get_subscription(&user_id)
        .await
        .map_err(payment_error_to_response)?;

    let effective_tier = subscription
        .as_ref()
        .map(|s| s.effective_tier(Utc::now()))
        .unwrap_or_default();

    Ok(Json(SubscriptionResponse {
        user_id,
        subscription,
        effective_tier,
    }))
}

/// Grant (or revoke) a tier by hand
#[instrument(skip(state, _admin, payload))]
pub async fn grant_subscription(
    State(state): State<AppState>,
    _admin: AdminKey,
    Path(user_id): Path<String>,
    payload: Result<Json<GrantRequest>, JsonRejection>,
) -> Result<Json<GrantResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| bad_request(e.body_text()))?;
    let tier = Tier::parse(&request.tier)
        .ok_or_else(|| bad_request(format!("Unknown tier: {}", request.tier)))?;

    let update = grant_update(tier, request.payment_id);
    state
        .store
        .merge_subscription(&user_id, &update)
        .await
        .map_err(payment_error_to_response)?;

    info!(
        "Manual grant: user={}, tier={}, payment_id={:?}, note={:?}",
        user_id,
        tier,
        update.payment_id,
        request.note.as_deref().unwrap_or("")
    );

    let subscription = state
        .store
        .get_subscription(&user_id)
        .await
        .map_err(payment_error_to_response)?;

    Ok(Json(GrantResponse {
        user_id,
        written: update.field_names(),
        subscription,
    }))
}
