//! # Payment Events
//!
//! Provider-neutral payment statuses and verified webhook events, plus the
//! mapping from an event to the subscription write it causes.

use crate::plan::{Currency, Plan, Price};
use crate::subscription::{PaymentProvenance, SubscriptionStatus, SubscriptionUpdate};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Internal payment status, mapped from each provider's status strings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Succeeded,
    Failed,
    Pending,
    Cancelled,
    Refunded,
    Unknown,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Succeeded => "succeeded",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Pending => "pending",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::Unknown => "unknown",
        }
    }

    /// Record status this payment status implies, if any
    pub fn subscription_status(&self) -> Option<SubscriptionStatus> {
        match self {
            PaymentStatus::Succeeded => Some(SubscriptionStatus::Active),
            PaymentStatus::Failed => Some(SubscriptionStatus::PaymentFailed),
            PaymentStatus::Cancelled | PaymentStatus::Refunded => {
                Some(SubscriptionStatus::Cancelled)
            }
            PaymentStatus::Pending | PaymentStatus::Unknown => None,
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Webhook event kinds we act on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentEventKind {
    PaymentSucceeded,
    PaymentFailed,
    PaymentPending,
    SubscriptionCancelled,
    Refunded,
    /// Unknown event (acknowledged, not acted on)
    Unknown(String),
}

impl PaymentEventKind {
    pub fn label(&self) -> &str {
        match self {
            PaymentEventKind::PaymentSucceeded => "payment_succeeded",
            PaymentEventKind::PaymentFailed => "payment_failed",
            PaymentEventKind::PaymentPending => "payment_pending",
            PaymentEventKind::SubscriptionCancelled => "subscription_cancelled",
            PaymentEventKind::Refunded => "refunded",
            PaymentEventKind::Unknown(raw) => raw,
        }
    }
}

impl From<PaymentStatus> for PaymentEventKind {
    fn from(status: PaymentStatus) -> Self {
        match status {
            PaymentStatus::Succeeded => PaymentEventKind::PaymentSucceeded,
            PaymentStatus::Failed => PaymentEventKind::PaymentFailed,
            PaymentStatus::Pending => PaymentEventKind::PaymentPending,
            PaymentStatus::Cancelled => PaymentEventKind::SubscriptionCancelled,
            PaymentStatus::Refunded => PaymentEventKind::Refunded,
            PaymentStatus::Unknown => PaymentEventKind::Unknown("unknown".to_string()),
        }
    }
}

/// A verified webhook event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentEvent {
    /// Provider name
    pub provider: String,

    /// Event or delivery id from the provider
    pub event_id: String,

    /// Event kind
    pub kind: PaymentEventKind,

    /// Provider payment / transaction id
    pub payment_id: String,

    /// Buildfy user id carried through the payment metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Plan id carried through the payment metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,

    /// Provider product id (Dodo), used when the plan id is missing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,

    /// Amount paid (in smallest unit)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<Currency>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,

    /// When the provider says the payment happened
    pub occurred_at: DateTime<Utc>,

    /// Raw event data (for debugging)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_data: Option<serde_json::Value>,
}

impl PaymentEvent {
    pub fn new(
        provider: impl Into<String>,
        event_id: impl Into<String>,
        kind: PaymentEventKind,
        payment_id: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            provider: provider.into(),
            event_id: event_id.into(),
            kind,
            payment_id: payment_id.into(),
            user_id: None,
            plan_id: None,
            product_id: None,
            amount: None,
            currency: None,
            payment_method: None,
            customer_email: None,
            occurred_at,
            raw_data: None,
        }
    }

    /// Price actually paid, when the provider reported both amount and currency
    pub fn price(&self) -> Option<Price> {
        match (self.amount, self.currency) {
            (Some(amount), Some(currency)) => Some(Price::from_minor(amount, currency)),
            _ => None,
        }
    }
}

/// Map a verified event to the subscription write it causes.
///
/// A success needs the purchased plan; without it nothing is written.
/// The expiry counts from the event time, so a redelivered webhook writes
/// the same expiry again.
pub fn subscription_update_for(
    event: &PaymentEvent,
    plan: Option<&Plan>,
    now: DateTime<Utc>,
) -> Option<SubscriptionUpdate> {
    match &event.kind {
        PaymentEventKind::PaymentSucceeded => {
            let plan = plan?;
            let provenance = PaymentProvenance {
                provider: event.provider.clone(),
                payment_id: event.payment_id.clone(),
                price: event.price().or_else(|| Some(plan.price.clone())),
                payment_method: event.payment_method.clone(),
            };
            Some(SubscriptionUpdate::activated(
                plan.tier,
                provenance,
                event.occurred_at,
                now,
            ))
        }
        PaymentEventKind::PaymentFailed => Some(SubscriptionUpdate::payment_failed(
            event.payment_id.clone(),
            event.provider.clone(),
            now,
        )),
        PaymentEventKind::SubscriptionCancelled => Some(SubscriptionUpdate::cancelled(now)),
        PaymentEventKind::Refunded => Some(SubscriptionUpdate::refunded(
            event.payment_id.clone(),
            event.provider.clone(),
            now,
        )),
        PaymentEventKind::PaymentPending | PaymentEventKind::Unknown(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tier::{Expiry, Tier};
    use chrono::TimeZone;

    fn event(kind: PaymentEventKind) -> PaymentEvent {
        let mut event = PaymentEvent::new(
            "dodo",
            "msg_1",
            kind,
            "pay_1",
            Utc.with_ymd_and_hms(2025, 5, 1, 12, 0, 0).unwrap(),
        );
        event.user_id = Some("user_1".to_string());
        event.amount = Some(249900);
        event.currency = Some(Currency::INR);
        event
    }

    fn pro_plan() -> Plan {
        Plan::new("pro", "Pro", Tier::Pro, Price::new(2499.0, Currency::INR))
    }

    #[test]
    fn test_success_expiry_counts_from_event_time() {
        let now = Utc.with_ymd_and_hms(2025, 5, 3, 0, 0, 0).unwrap();
        let update =
            subscription_update_for(&event(PaymentEventKind::PaymentSucceeded), Some(&pro_plan()), now)
                .unwrap();

        assert_eq!(update.tier, Some(Tier::Pro));
        assert_eq!(update.paid, Some(true));
        assert_eq!(update.amount, Some(2499.0));
        assert_eq!(
            update.subscription_expiry,
            Some(Expiry::At(Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap()))
        );
    }

    #[test]
    fn test_redelivery_writes_same_expiry() {
        let e = event(PaymentEventKind::PaymentSucceeded);
        let first = subscription_update_for(&e, Some(&pro_plan()), Utc::now()).unwrap();
        let again = subscription_update_for(&e, Some(&pro_plan()), Utc::now()).unwrap();

        assert_eq!(first.subscription_expiry, again.subscription_expiry);
        assert_eq!(first.tier, again.tier);
    }

    #[test]
    fn test_success_without_plan_writes_nothing() {
        let update = subscription_update_for(&event(PaymentEventKind::PaymentSucceeded), None, Utc::now());
        assert!(update.is_none());
    }

    #[test]
    fn test_non_success_kinds() {
        let now = Utc::now();

        let failed = subscription_update_for(&event(PaymentEventKind::PaymentFailed), None, now).unwrap();
        assert_eq!(failed.status, Some(SubscriptionStatus::PaymentFailed));
        assert_eq!(failed.tier, None);

        let cancelled =
            subscription_update_for(&event(PaymentEventKind::SubscriptionCancelled), None, now).unwrap();
        assert_eq!(cancelled.status, Some(SubscriptionStatus::Cancelled));

        let refunded = subscription_update_for(&event(PaymentEventKind::Refunded), None, now).unwrap();
        assert_eq!(refunded.tier, Some(Tier::Free));

        assert!(subscription_update_for(&event(PaymentEventKind::PaymentPending), None, now).is_none());
        assert!(subscription_update_for(
            &event(PaymentEventKind::Unknown("customer.created".into())),
            None,
            now
        )
        .is_none());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            PaymentStatus::Succeeded.subscription_status(),
            Some(SubscriptionStatus::Active)
        );
        assert_eq!(
            PaymentStatus::Failed.subscription_status(),
            Some(SubscriptionStatus::PaymentFailed)
        );
        assert_eq!(PaymentStatus::Pending.subscription_status(), None);
        assert_eq!(PaymentStatus::Unknown.subscription_status(), None);
        assert_eq!(
            PaymentEventKind::from(PaymentStatus::Refunded),
            PaymentEventKind::Refunded
        );
    }
}
