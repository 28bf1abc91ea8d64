//! # Dodo Webhook Handling
//!
//! Dodo signs webhooks with the Standard Webhooks scheme:
//!
//! - headers `webhook-id`, `webhook-timestamp` (unix seconds), `webhook-signature`
//! - signed content `"{webhook-id}.{webhook-timestamp}.{body}"`
//! - HMAC-SHA256 keyed with the base64 part of the `whsec_` secret
//! - signature header holds space-separated `v1,<base64>` entries

use base64::{engine::general_purpose::STANDARD, Engine as _};
use buildfy_core::{
    Currency, PaymentError, PaymentEvent, PaymentEventKind, PaymentResult,
};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const HEADER_ID: &str = "webhook-id";
pub const HEADER_TIMESTAMP: &str = "webhook-timestamp";
pub const HEADER_SIGNATURE: &str = "webhook-signature";

/// Maximum clock skew accepted between Dodo and us
pub const TIMESTAMP_TOLERANCE_SECS: i64 = 300;

/// Event types that should be enabled in the Dodo dashboard
pub const REQUIRED_WEBHOOK_EVENTS: &[&str] = &[
    "payment.succeeded",
    "payment.failed",
    "payment.processing",
    "payment.cancelled",
    "subscription.active",
    "subscription.renewed",
    "subscription.on_hold",
    "subscription.failed",
    "subscription.cancelled",
    "subscription.expired",
    "refund.succeeded",
];

fn signing_key(secret: &str) -> PaymentResult<Vec<u8>> {
    let encoded = secret.strip_prefix("whsec_").unwrap_or(secret);
    STANDARD.decode(encoded.trim()).map_err(|e| {
        PaymentError::Configuration(format!("Webhook secret is not valid base64: {}", e))
    })
}

fn keyed_mac(secret: &str, msg_id: &str, timestamp: &str, payload: &[u8]) -> PaymentResult<HmacSha256> {
    let key = signing_key(secret)?;
    let mut mac = HmacSha256::new_from_slice(&key)
        .map_err(|e| PaymentError::Internal(format!("HMAC key: {}", e)))?;
    mac.update(msg_id.as_bytes());
    mac.update(b".");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Produce a `v1,<base64>` signature (what Dodo sends)
pub fn sign(secret: &str, msg_id: &str, timestamp: i64, payload: &[u8]) -> PaymentResult<String> {
    let mac = keyed_mac(secret, msg_id, &timestamp.to_string(), payload)?;
    Ok(format!("v1,{}", STANDARD.encode(mac.finalize().into_bytes())))
}

/// Verify a Standard Webhooks signature
pub fn verify_signature(
    secret: &str,
    msg_id: &str,
    timestamp: &str,
    payload: &[u8],
    signature_header: &str,
    now: DateTime<Utc>,
) -> PaymentResult<()> {
    let sent_at: i64 = timestamp.trim().parse().map_err(|_| {
        PaymentError::WebhookVerificationFailed("Invalid webhook-timestamp".to_string())
    })?;

    let within_tolerance = now
        .timestamp()
        .checked_sub(sent_at)
        .is_some_and(|skew| skew.unsigned_abs() <= TIMESTAMP_TOLERANCE_SECS.unsigned_abs());
    if !within_tolerance {
        return Err(PaymentError::WebhookVerificationFailed(
            "Timestamp outside tolerance".to_string(),
        ));
    }

    let mac = keyed_mac(secret, msg_id, timestamp.trim(), payload)?;

    let valid = signature_header
        .split_whitespace()
        .filter_map(|entry| entry.split_once(','))
        .filter(|(version, _)| *version == "v1")
        .filter_map(|(_, sig)| STANDARD.decode(sig).ok())
        .any(|sig| mac.clone().verify_slice(&sig).is_ok());

    if !valid {
        return Err(PaymentError::WebhookVerificationFailed(
            "Signature mismatch".to_string(),
        ));
    }
    Ok(())
}

// =============================================================================
// Payload
// =============================================================================

#[derive(Debug, Deserialize)]
struct DodoWebhookPayload {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    timestamp: Option<String>,
    data: serde_json::Map<String, serde_json::Value>,
}

/// Map Dodo's event type strings
pub fn event_kind(event_type: &str) -> PaymentEventKind {
    match event_type {
        "payment.succeeded" | "subscription.active" | "subscription.renewed" => {
            PaymentEventKind::PaymentSucceeded
        }
        "payment.failed"
        | "payment.cancelled"
        | "subscription.failed"
        | "subscription.on_hold" => PaymentEventKind::PaymentFailed,
        "payment.processing" => PaymentEventKind::PaymentPending,
        "subscription.cancelled" | "subscription.expired" => {
            PaymentEventKind::SubscriptionCancelled
        }
        "refund.succeeded" => PaymentEventKind::Refunded,
        other => PaymentEventKind::Unknown(other.to_string()),
    }
}

fn str_field(obj: &serde_json::Map<String, serde_json::Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Parse a verified webhook body into a payment event
pub fn parse_event(
    msg_id: &str,
    payload: &[u8],
    fallback_time: DateTime<Utc>,
) -> PaymentResult<PaymentEvent> {
    let body: DodoWebhookPayload = serde_json::from_slice(payload)
        .map_err(|e| PaymentError::WebhookParseError(format!("Failed to parse webhook: {}", e)))?;

    let data = &body.data;
    let payment_id = str_field(data, "payment_id")
        .or_else(|| str_field(data, "subscription_id"))
        .or_else(|| str_field(data, "refund_id"))
        .ok_or_else(|| {
            PaymentError::WebhookParseError("Event data has no payment or subscription id".to_string())
        })?;

    let occurred_at = body
        .timestamp
        .as_deref()
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        .map(|ts| ts.with_timezone(&Utc))
        .unwrap_or(fallback_time);

    let mut event = PaymentEvent::new(
        "dodo",
        msg_id,
        event_kind(&body.event_type),
        payment_id,
        occurred_at,
    );

    if let Some(metadata) = data.get("metadata").and_then(|m| m.as_object()) {
        event.user_id = str_field(metadata, "userId").or_else(|| str_field(metadata, "user_id"));
        event.plan_id = str_field(metadata, "planId").or_else(|| str_field(metadata, "plan_id"));
    }

    event.product_id = str_field(data, "product_id").or_else(|| {
        data.get("product_cart")
            .and_then(|cart| cart.as_array())
            .and_then(|items| items.first())
            .and_then(|item| item.as_object())
            .and_then(|item| str_field(item, "product_id"))
    });

    event.amount = ["total_amount", "recurring_pre_tax_amount", "amount"]
        .iter()
        .find_map(|key| data.get(*key).and_then(|v| v.as_i64()));
    event.currency = str_field(data, "currency").and_then(|c| Currency::parse(&c));
    event.payment_method = str_field(data, "payment_method");
    event.customer_email = data
        .get("customer")
        .and_then(|c| c.as_object())
        .and_then(|c| str_field(c, "email"));
    event.raw_data = Some(serde_json::Value::Object(body.data));

    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    // base64("buildfy-test-signing-key")
    const SECRET: &str = "whsec_YnVpbGRmeS10ZXN0LXNpZ25pbmcta2V5";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_sign_then_verify() {
        let payload = br#"{"type":"payment.succeeded"}"#;
        let ts = now().timestamp();
        let sig = sign(SECRET, "msg_1", ts, payload).unwrap();

        assert!(sig.starts_with("v1,"));
        assert!(verify_signature(SECRET, "msg_1", &ts.to_string(), payload, &sig, now()).is_ok());
    }

    #[test]
    fn test_any_signed_part_change_fails() {
        let payload = br#"{"type":"payment.succeeded"}"#;
        let ts = now().timestamp();
        let sig = sign(SECRET, "msg_1", ts, payload).unwrap();
        let ts_str = ts.to_string();

        assert!(verify_signature(SECRET, "msg_2", &ts_str, payload, &sig, now()).is_err());
        assert!(verify_signature(SECRET, "msg_1", &(ts + 1).to_string(), payload, &sig, now()).is_err());
        assert!(verify_signature(SECRET, "msg_1", &ts_str, b"{}", &sig, now()).is_err());
        assert!(verify_signature("whsec_b3RoZXIta2V5", "msg_1", &ts_str, payload, &sig, now()).is_err());
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let payload = b"{}";
        let old = now().timestamp() - TIMESTAMP_TOLERANCE_SECS - 1;
        let sig = sign(SECRET, "msg_1", old, payload).unwrap();

        let err = verify_signature(SECRET, "msg_1", &old.to_string(), payload, &sig, now()).unwrap_err();
        assert!(err.to_string().contains("tolerance"));
    }

    #[test]
    fn test_future_timestamp_rejected() {
        let payload = b"{}";
        let ahead = now().timestamp() + TIMESTAMP_TOLERANCE_SECS + 1;
        let sig = sign(SECRET, "msg_1", ahead, payload).unwrap();

        let err = verify_signature(SECRET, "msg_1", &ahead.to_string(), payload, &sig, now()).unwrap_err();
        assert!(err.to_string().contains("tolerance"));

        let edge = now().timestamp() + TIMESTAMP_TOLERANCE_SECS;
        let sig = sign(SECRET, "msg_1", edge, payload).unwrap();
        assert!(verify_signature(SECRET, "msg_1", &edge.to_string(), payload, &sig, now()).is_ok());
    }

    #[test]
    fn test_extreme_timestamps_rejected() {
        for ts in [i64::MIN, i64::MIN + 1, i64::MAX, -1, 0] {
            let result = verify_signature(SECRET, "msg_1", &ts.to_string(), b"{}", "v1,AAAA", now());
            assert!(
                matches!(result, Err(PaymentError::WebhookVerificationFailed(ref m)) if m.contains("tolerance")),
                "timestamp {} accepted",
                ts
            );
        }
    }

    #[test]
    fn test_multiple_signatures_any_matches() {
        let payload = b"{}";
        let ts = now().timestamp();
        let good = sign(SECRET, "msg_1", ts, payload).unwrap();
        let header = format!("v1,bm90LWl0 v2,ignored {}", good);

        assert!(verify_signature(SECRET, "msg_1", &ts.to_string(), payload, &header, now()).is_ok());
    }

    #[test]
    fn test_invalid_secret_is_configuration_error() {
        let result = sign("whsec_***", "msg", 0, b"{}");
        assert!(matches!(result, Err(PaymentError::Configuration(_))));
    }

    #[test]
    fn test_parse_payment_succeeded() {
        let payload = json!({
            "business_id": "bus_1",
            "type": "payment.succeeded",
            "timestamp": "2025-06-01T11:59:30Z",
            "data": {
                "payload_type": "Payment",
                "payment_id": "pay_abc",
                "total_amount": 249900,
                "currency": "INR",
                "payment_method": "upi_collect",
                "status": "succeeded",
                "customer": { "customer_id": "cus_1", "email": "ada@example.com", "name": "Ada" },
                "metadata": { "userId": "uid_1", "planId": "pro" },
                "product_cart": [ { "product_id": "pdt_pro", "quantity": 1 } ]
            }
        })
        .to_string();

        let event = parse_event("msg_1", payload.as_bytes(), now()).unwrap();

        assert_eq!(event.kind, PaymentEventKind::PaymentSucceeded);
        assert_eq!(event.event_id, "msg_1");
        assert_eq!(event.payment_id, "pay_abc");
        assert_eq!(event.user_id.as_deref(), Some("uid_1"));
        assert_eq!(event.plan_id.as_deref(), Some("pro"));
        assert_eq!(event.product_id.as_deref(), Some("pdt_pro"));
        assert_eq!(event.amount, Some(249900));
        assert_eq!(event.currency, Some(Currency::INR));
        assert_eq!(event.customer_email.as_deref(), Some("ada@example.com"));
        assert_eq!(
            event.occurred_at,
            Utc.with_ymd_and_hms(2025, 6, 1, 11, 59, 30).unwrap()
        );
    }

    #[test]
    fn test_parse_subscription_event() {
        let payload = json!({
            "type": "subscription.cancelled",
            "data": {
                "subscription_id": "sub_1",
                "product_id": "pdt_std",
                "recurring_pre_tax_amount": 29900,
                "currency": "INR",
                "metadata": { "user_id": "uid_2" }
            }
        })
        .to_string();

        let event = parse_event("msg_2", payload.as_bytes(), now()).unwrap();

        assert_eq!(event.kind, PaymentEventKind::SubscriptionCancelled);
        assert_eq!(event.payment_id, "sub_1");
        assert_eq!(event.user_id.as_deref(), Some("uid_2"));
        assert_eq!(event.plan_id, None);
        assert_eq!(event.product_id.as_deref(), Some("pdt_std"));
        assert_eq!(event.occurred_at, now());
    }

    #[test]
    fn test_parse_without_ids_fails() {
        let payload = br#"{"type":"payment.succeeded","data":{}}"#;
        assert!(matches!(
            parse_event("msg", payload, now()),
            Err(PaymentError::WebhookParseError(_))
        ));
    }

    #[test]
    fn test_event_kind_mapping() {
        assert_eq!(event_kind("subscription.renewed"), PaymentEventKind::PaymentSucceeded);
        assert_eq!(event_kind("subscription.on_hold"), PaymentEventKind::PaymentFailed);
        assert_eq!(event_kind("payment.processing"), PaymentEventKind::PaymentPending);
        assert_eq!(event_kind("refund.succeeded"), PaymentEventKind::Refunded);
        assert_eq!(
            event_kind("dispute.opened"),
            PaymentEventKind::Unknown("dispute.opened".to_string())
        );
    }
}
