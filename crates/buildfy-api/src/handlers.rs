//! # Request Handlers
//!
//! Axum request handlers for the billing API: plans, payment creation,
//! status queries, the PayU browser callback, and provider webhooks.

use crate::pages;
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use buildfy_core::{
    subscription_update_for, PaymentError, PaymentEvent, PaymentEventKind, PaymentRequest,
    PaymentResult, RedirectMethod, WebhookHeaders,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

// =============================================================================
// Request/Response Types
// =============================================================================

/// Dodo-style payment creation response
#[derive(Debug, Serialize)]
pub struct CreatePaymentResponse {
    pub provider: String,
    pub payment_id: String,
    /// Redirect the customer here
    pub payment_url: String,
}

/// Form description returned instead of HTML when the client asks for JSON
#[derive(Debug, Serialize)]
pub struct PaymentFormResponse {
    pub provider: String,
    pub payment_id: String,
    pub method: RedirectMethod,
    pub action: String,
    pub fields: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    #[serde(default)]
    pub payment_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PaymentStatusResponse {
    pub provider: String,
    pub payment_id: String,
    pub status: String,
}

/// Webhook acknowledgement
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub event: String,
    /// Whether a subscription record was written
    pub updated: bool,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: u16) -> Self {
        Self {
            error: error.into(),
            code,
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub(crate) fn payment_error_to_response(err: PaymentError) -> ApiError {
    let code = err.status_code();
    let response = ErrorResponse::new(err.to_string(), code);
    (
        StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        Json(response),
    )
}

pub(crate) fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::new(message, 400)),
    )
}

fn json_rejection(rejection: JsonRejection) -> ApiError {
    let (status, json) = bad_request("Invalid request body");
    (status, Json(json.0.with_details(rejection.body_text())))
}

pub(crate) fn webhook_headers(headers: &HeaderMap) -> WebhookHeaders {
    headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)))
        .collect()
}

fn wants_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("application/json"))
}

// =============================================================================
// Event processing
// =============================================================================

/// Merge-write the subscription change an event causes.
///
/// Returns whether anything was written. Events without a user id, and
/// successes for a plan the catalog does not know, are logged and skipped.
/// `updated_at` is the event time, so a redelivered event writes the same
/// record again.
pub async fn apply_event(state: &AppState, event: &PaymentEvent) -> PaymentResult<bool> {
    let Some(user_id) = event.user_id.as_deref() else {
        warn!(
            "Event {} ({}) for payment {} carries no user id, nothing written",
            event.event_id,
            event.kind.label(),
            event.payment_id
        );
        return Ok(false);
    };

    let plan = event
        .plan_id
        .as_deref()
        .and_then(|id| state.catalog.get(id))
        .or_else(|| {
            event
                .product_id
                .as_deref()
                .and_then(|product| state.catalog.by_dodo_product(product))
        });

    let Some(update) = subscription_update_for(event, plan, event.occurred_at) else {
        if event.kind == PaymentEventKind::PaymentSucceeded {
            warn!(
                "Payment {} succeeded for unknown plan {:?} (product {:?}), nothing written",
                event.payment_id, event.plan_id, event.product_id
            );
        } else {
            info!(
                "No subscription change for {} event on payment {}",
                event.kind.label(),
                event.payment_id
            );
        }
        return Ok(false);
    };

    state.store.merge_subscription(user_id, &update).await?;

    info!(
        "Updated subscription: user={}, provider={}, event={}, tier={:?}, fields={:?}",
        user_id,
        event.provider,
        event.kind.label(),
        update.tier,
        update.field_names()
    );
    Ok(true)
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "buildfy-api",
        "version": env!("CARGO_PKG_VERSION"),
        "providers": state.strategies.providers(),
        "store": state.store.backend_name()
    }))
}

/// Active plans for the pricing page
pub async fn list_plans(State(state): State<AppState>) -> impl IntoResponse {
    let plans: Vec<_> = state.catalog.active_plans().collect();
    Json(serde_json::json!({
        "plans": plans,
        "count": plans.len()
    }))
}

/// Create a payment with the given provider.
///
/// PayU answers with an auto-submitting HTML form (or its JSON description
/// when the client accepts JSON); Dodo answers with the payment URL.
#[instrument(skip(state, headers, payload))]
pub async fn create_payment(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<PaymentRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let strategy = state
        .strategies
        .require(&provider)
        .map_err(payment_error_to_response)?;
    let Json(request) = payload.map_err(json_rejection)?;
    request.validate().map_err(payment_error_to_response)?;

    let plan = state
        .catalog
        .get(&request.plan_id)
        .filter(|plan| plan.active)
        .ok_or_else(|| {
            payment_error_to_response(PaymentError::PlanNotFound {
                plan_id: request.plan_id.clone(),
            })
        })?;

    info!(
        "Creating payment: provider={}, plan={}, user={}, amount={}",
        provider,
        plan.id,
        request.user_id,
        plan.price.display()
    );

    let link = strategy
        .create_payment(&request, plan, &state.urls)
        .await
        .map_err(|e| {
            error!("Failed to create payment: {}", e);
            payment_error_to_response(e)
        })?;

    let method = link.method;
    let response = match method {
        RedirectMethod::Post if wants_json(&headers) => Json(PaymentFormResponse {
            fields: link
                .form_fields
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect(),
            provider: link.provider,
            payment_id: link.payment_id,
            method,
            action: link.url,
        })
        .into_response(),
        RedirectMethod::Post => Html(pages::auto_submit_form(&link)).into_response(),
        RedirectMethod::Get => Json(CreatePaymentResponse {
            provider: link.provider,
            payment_id: link.payment_id,
            payment_url: link.url,
        })
        .into_response(),
    };

    Ok(response)
}

/// Ask the provider for a payment's current status
#[instrument(skip(state))]
pub async fn payment_status(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<PaymentStatusResponse>, ApiError> {
    let strategy = state
        .strategies
        .require(&provider)
        .map_err(payment_error_to_response)?;

    let payment_id = query
        .payment_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| bad_request("payment_id query parameter is required"))?;

    let status = strategy.payment_status(&payment_id).await.map_err(|e| {
        error!("Status query failed: {}", e);
        payment_error_to_response(e)
    })?;

    Ok(Json(PaymentStatusResponse {
        provider,
        payment_id,
        status: status.as_str().to_string(),
    }))
}

/// PayU surl/furl: the browser posts the result here after checkout
#[instrument(skip(state, headers, body))]
pub async fn payu_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let strategy = match state.strategies.require("payu") {
        Ok(strategy) => strategy,
        Err(e) => return payment_error_to_response(e).into_response(),
    };

    let failure_page = |reason: &str, status: StatusCode| {
        let target = with_params(&state.urls.failure_url(), &[("provider", "payu"), ("reason", reason)]);
        (status, Html(pages::redirect_page("Payment could not be confirmed", &target)))
            .into_response()
    };

    let event = match strategy.verify_webhook(&body, &webhook_headers(&headers)).await {
        Ok(event) => event,
        Err(e) => {
            warn!("Rejected PayU callback: {}", e);
            let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::BAD_REQUEST);
            return failure_page("verification", status);
        }
    };

    if let Err(e) = apply_event(&state, &event).await {
        error!("Failed to record PayU callback {}: {}", event.payment_id, e);
        return failure_page("processing", StatusCode::INTERNAL_SERVER_ERROR);
    }

    let params = [
        ("provider", "payu"),
        ("payment_id", event.payment_id.as_str()),
        ("status", event.kind.label()),
    ];
    let page = if event.kind == PaymentEventKind::PaymentSucceeded {
        let target = with_params(&state.urls.success_url(), &params);
        pages::redirect_page("Payment successful", &target)
    } else {
        let target = with_params(&state.urls.failure_url(), &params);
        pages::redirect_page("Payment not completed", &target)
    };

    Html(page).into_response()
}

fn with_params(base: &str, params: &[(&str, &str)]) -> String {
    reqwest::Url::parse_with_params(base, params)
        .map(String::from)
        .unwrap_or_else(|_| base.to_string())
}

/// Provider webhook: verify, map, merge-write
#[instrument(skip(state, headers, body), fields(bytes = body.len()))]
pub async fn provider_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let strategy = state
        .strategies
        .require(&provider)
        .map_err(payment_error_to_response)?;

    let event = strategy
        .verify_webhook(&body, &webhook_headers(&headers))
        .await
        .map_err(|e| {
            error!("Webhook verification failed: {}", e);
            payment_error_to_response(e)
        })?;

    info!(
        "Received webhook: provider={}, event={}, id={}, payment={}",
        provider,
        event.kind.label(),
        event.event_id,
        event.payment_id
    );

    let updated = apply_event(&state, &event).await.map_err(|e| {
        error!("Failed to apply webhook {}: {}", event.event_id, e);
        payment_error_to_response(e)
    })?;

    Ok(Json(WebhookAck {
        received: true,
        event: event.kind.label().to_string(),
        updated,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response() {
        let err = ErrorResponse::new("Test error", 400).with_details("field x");
        assert_eq!(err.error, "Test error");
        assert_eq!(err.code, 400);
        assert_eq!(err.details.as_deref(), Some("field x"));
    }

    #[test]
    fn test_payment_error_conversion() {
        let (status, _json) =
            payment_error_to_response(PaymentError::InvalidRequest("Bad data".to_string()));
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _json) = payment_error_to_response(PaymentError::WebhookVerificationFailed(
            "Signature mismatch".to_string(),
        ));
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _json) = payment_error_to_response(PaymentError::UnknownProvider {
            provider: "paypal".to_string(),
        });
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_with_params_encodes() {
        assert_eq!(
            with_params("https://buildfy.app/payment/success", &[("payment_id", "BFY 1&2")]),
            "https://buildfy.app/payment/success?payment_id=BFY+1%262"
        );
    }

    #[test]
    fn test_wants_json() {
        let mut headers = HeaderMap::new();
        assert!(!wants_json(&headers));
        headers.insert(header::ACCEPT, "application/json".parse().unwrap());
        assert!(wants_json(&headers));
    }
}
