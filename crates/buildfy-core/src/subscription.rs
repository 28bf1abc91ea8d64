//! # Subscription Record
//!
//! The subscription fields merge-written onto a user document, and the
//! partial updates handlers write.

use crate::plan::Price;
use crate::tier::{Expiry, Tier};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Value of the `status` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
    PaymentFailed,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::PaymentFailed => "payment_failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(SubscriptionStatus::Active),
            "cancelled" => Some(SubscriptionStatus::Cancelled),
            "payment_failed" => Some(SubscriptionStatus::PaymentFailed),
            _ => None,
        }
    }
}

/// Document field names, in write order
pub mod fields {
    pub const TIER: &str = "tier";
    pub const STATUS: &str = "status";
    pub const PAID: &str = "paid";
    pub const PAYMENT_ID: &str = "payment_id";
    pub const AMOUNT: &str = "amount";
    pub const CURRENCY: &str = "currency";
    pub const PAYMENT_METHOD: &str = "payment_method";
    pub const PROVIDER: &str = "provider";
    pub const EXPIRY: &str = "subscriptionExpiry";
    pub const UPDATED_AT: &str = "updated_at";
}

/// The subscription as stored on a user document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    #[serde(default)]
    pub tier: Tier,

    #[serde(default)]
    pub status: Option<SubscriptionStatus>,

    #[serde(default)]
    pub paid: bool,

    #[serde(default)]
    pub payment_id: Option<String>,

    /// Amount in major units, as the frontend reads it
    #[serde(default)]
    pub amount: Option<f64>,

    #[serde(default)]
    pub currency: Option<String>,

    #[serde(default)]
    pub payment_method: Option<String>,

    #[serde(default)]
    pub provider: Option<String>,

    #[serde(rename = "subscriptionExpiry", default)]
    pub subscription_expiry: Expiry,

    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Subscription {
    /// The tier the user can use right now: the stored tier until it expires
    pub fn effective_tier(&self, now: DateTime<Utc>) -> Tier {
        if self.subscription_expiry.is_expired(now) {
            Tier::Free
        } else {
            self.tier
        }
    }

    /// Paid, marked active, and not past its expiry
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.paid
            && self.status == Some(SubscriptionStatus::Active)
            && self.tier.is_paid()
            && !self.subscription_expiry.is_expired(now)
    }

    /// Merge an update into this record. Absent fields are left untouched.
    pub fn apply(&mut self, update: &SubscriptionUpdate) {
        if let Some(tier) = update.tier {
            self.tier = tier;
        }
        if let Some(status) = update.status {
            self.status = Some(status);
        }
        if let Some(paid) = update.paid {
            self.paid = paid;
        }
        if let Some(ref payment_id) = update.payment_id {
            self.payment_id = Some(payment_id.clone());
        }
        if let Some(amount) = update.amount {
            self.amount = Some(amount);
        }
        if let Some(ref currency) = update.currency {
            self.currency = Some(currency.clone());
        }
        if let Some(ref method) = update.payment_method {
            self.payment_method = Some(method.clone());
        }
        if let Some(ref provider) = update.provider {
            self.provider = Some(provider.clone());
        }
        if let Some(expiry) = update.subscription_expiry {
            self.subscription_expiry = expiry;
        }
        if let Some(ref updated_at) = update.updated_at {
            self.updated_at = Some(updated_at.clone());
        }
    }
}

/// Provenance of the transaction that triggered an activation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaymentProvenance {
    pub provider: String,
    pub payment_id: String,
    pub price: Option<Price>,
    pub payment_method: Option<String>,
}

/// A partial subscription write. Only `Some` fields reach the document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SubscriptionUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SubscriptionStatus>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    /// `Some(Expiry::None)` writes an explicit null
    #[serde(rename = "subscriptionExpiry", skip_serializing_if = "Option::is_none")]
    pub subscription_expiry: Option<Expiry>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

fn timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl SubscriptionUpdate {
    /// Successful payment for `tier`; expiry counts from `paid_at`
    pub fn activated(
        tier: Tier,
        payment: PaymentProvenance,
        paid_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            tier: Some(tier),
            status: Some(SubscriptionStatus::Active),
            paid: Some(true),
            payment_id: Some(payment.payment_id),
            amount: payment.price.as_ref().map(Price::as_decimal),
            currency: payment.price.as_ref().map(|p| p.currency.as_str().to_string()),
            payment_method: payment.payment_method,
            provider: Some(payment.provider),
            subscription_expiry: Some(tier.expiry_from(paid_at)),
            updated_at: Some(timestamp(now)),
        }
    }

    /// Failed payment. Tier and expiry are left as they were.
    pub fn payment_failed(
        payment_id: impl Into<String>,
        provider: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            status: Some(SubscriptionStatus::PaymentFailed),
            paid: Some(false),
            payment_id: Some(payment_id.into()),
            provider: Some(provider.into()),
            updated_at: Some(timestamp(now)),
            ..Default::default()
        }
    }

    /// Cancelled renewal. Access runs until the stored expiry.
    pub fn cancelled(now: DateTime<Utc>) -> Self {
        Self {
            status: Some(SubscriptionStatus::Cancelled),
            updated_at: Some(timestamp(now)),
            ..Default::default()
        }
    }

    /// Refunded payment: back to the free tier immediately
    pub fn refunded(
        payment_id: impl Into<String>,
        provider: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            tier: Some(Tier::Free),
            status: Some(SubscriptionStatus::Cancelled),
            paid: Some(false),
            payment_id: Some(payment_id.into()),
            provider: Some(provider.into()),
            subscription_expiry: Some(Expiry::None),
            updated_at: Some(timestamp(now)),
            ..Default::default()
        }
    }

    /// Names of the document fields this update writes
    pub fn field_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        let present = [
            (fields::TIER, self.tier.is_some()),
            (fields::STATUS, self.status.is_some()),
            (fields::PAID, self.paid.is_some()),
            (fields::PAYMENT_ID, self.payment_id.is_some()),
            (fields::AMOUNT, self.amount.is_some()),
            (fields::CURRENCY, self.currency.is_some()),
            (fields::PAYMENT_METHOD, self.payment_method.is_some()),
            (fields::PROVIDER, self.provider.is_some()),
            (fields::EXPIRY, self.subscription_expiry.is_some()),
            (fields::UPDATED_AT, self.updated_at.is_some()),
        ];
        for (name, is_set) in present {
            if is_set {
                names.push(name);
            }
        }
        names
    }

    pub fn is_empty(&self) -> bool {
        self.field_names().is_empty()
    }
}
