//! # PayU Hosted Checkout
//!
//! The browser posts a hashed form to PayU's hosted checkout page. PayU
//! posts the result back (browser callback and server-to-server webhook)
//! with a reverse hash we verify before trusting anything in it.

use crate::config::PayuConfig;
use crate::hash::{self, HashFields};
use async_trait::async_trait;
use buildfy_core::{
    Currency, PaymentError, PaymentEvent, PaymentEventKind, PaymentLink, PaymentRequest,
    PaymentResult, PaymentStatus, PaymentStrategy, Plan, ReturnUrls, WebhookHeaders,
};
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

const PROVIDER: &str = "payu";

/// PayU reports `addedon` in IST
const IST_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

/// PayU hosted-checkout strategy
pub struct PayuStrategy {
    config: PayuConfig,
    client: Client,
}

impl PayuStrategy {
    /// Create a new PayU strategy
    pub fn new(config: PayuConfig) -> PaymentResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| PaymentError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Create from environment variables
    pub fn from_env() -> PaymentResult<Self> {
        Self::new(PayuConfig::from_env()?)
    }

    pub fn config(&self) -> &PayuConfig {
        &self.config
    }

    /// New merchant transaction id, `BFY` + 20 hex chars
    fn new_txnid() -> String {
        let id = Uuid::new_v4().simple().to_string();
        format!("BFY{}", &id[..20])
    }

    /// Build the hashed form fields for the hosted checkout page
    fn build_form(
        &self,
        txnid: &str,
        request: &PaymentRequest,
        plan: &Plan,
        urls: &ReturnUrls,
    ) -> Vec<(String, String)> {
        let amount = plan.price.as_decimal_string();
        let firstname = request.first_name();
        let email = request.user_email.trim();

        let fields = HashFields {
            key: &self.config.merchant_key,
            txnid,
            amount: &amount,
            productinfo: &plan.id,
            firstname,
            email,
            udf: [&request.user_id, &plan.id, "", "", ""],
        };
        let hash = hash::request_hash(&fields, &self.config.merchant_salt);
        let callback = urls.callback_url(PROVIDER);

        vec![
            ("key".to_string(), self.config.merchant_key.clone()),
            ("txnid".to_string(), txnid.to_string()),
            ("amount".to_string(), amount.clone()),
            ("productinfo".to_string(), plan.id.clone()),
            ("firstname".to_string(), firstname.to_string()),
            ("email".to_string(), email.to_string()),
            (
                "phone".to_string(),
                request.phone.clone().unwrap_or_default(),
            ),
            ("surl".to_string(), callback.clone()),
            ("furl".to_string(), callback),
            ("udf1".to_string(), request.user_id.clone()),
            ("udf2".to_string(), plan.id.clone()),
            ("hash".to_string(), hash),
        ]
    }

    /// Parse PayU's `addedon` timestamp
    fn parse_added_on(raw: &str) -> Option<DateTime<Utc>> {
        let naive = NaiveDateTime::parse_from_str(raw.trim(), "%Y-%m-%d %H:%M:%S").ok()?;
        let ist = FixedOffset::east_opt(IST_OFFSET_SECS)?;
        ist.from_local_datetime(&naive)
            .single()
            .map(|at| at.with_timezone(&Utc))
    }
}

/// Map PayU's transaction status strings
pub fn status_from_payu(status: &str) -> PaymentStatus {
    match status.trim().to_ascii_lowercase().as_str() {
        "success" | "captured" => PaymentStatus::Succeeded,
        "failure" | "failed" | "bounced" | "dropped" => PaymentStatus::Failed,
        "pending" | "in progress" | "initiated" => PaymentStatus::Pending,
        "usercancelled" | "cancelled" => PaymentStatus::Cancelled,
        "refunded" => PaymentStatus::Refunded,
        _ => PaymentStatus::Unknown,
    }
}

/// Verified PayU response fields
#[derive(Debug, Clone)]
pub struct PayuResponse {
    fields: HashMap<String, String>,
}

impl PayuResponse {
    /// Parse a form-encoded PayU post
    pub fn parse(payload: &[u8]) -> PaymentResult<Self> {
        let fields: HashMap<String, String> = serde_urlencoded::from_bytes(payload)
            .map_err(|e| PaymentError::WebhookParseError(format!("Invalid form body: {}", e)))?;
        Ok(Self { fields })
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|v| v.as_str())
    }

    fn field(&self, name: &str) -> &str {
        self.get(name).unwrap_or("")
    }

    fn require(&self, name: &str) -> PaymentResult<&str> {
        self.get(name)
            .ok_or_else(|| PaymentError::WebhookParseError(format!("Missing field: {}", name)))
    }

    fn non_empty(&self, name: &str) -> Option<String> {
        self.get(name)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from)
    }

    /// Check the reverse hash against our salt
    pub fn verify(&self, config: &PayuConfig) -> PaymentResult<()> {
        let received = self.require("hash")?;
        let key = self.require("key")?;

        if key != config.merchant_key {
            return Err(PaymentError::WebhookVerificationFailed(
                "Merchant key mismatch".to_string(),
            ));
        }

        let fields = HashFields {
            key,
            txnid: self.require("txnid")?,
            amount: self.require("amount")?,
            productinfo: self.field("productinfo"),
            firstname: self.field("firstname"),
            email: self.field("email"),
            udf: [
                self.field("udf1"),
                self.field("udf2"),
                self.field("udf3"),
                self.field("udf4"),
                self.field("udf5"),
            ],
        };
        let expected = hash::response_hash(
            &fields,
            self.require("status")?,
            &config.merchant_salt,
            self.get("additionalCharges"),
        );

        if !hash::constant_time_eq(received, &expected) {
            return Err(PaymentError::WebhookVerificationFailed(
                "Hash mismatch".to_string(),
            ));
        }
        Ok(())
    }

    /// Convert verified fields into a payment event
    pub fn into_event(self) -> PaymentResult<PaymentEvent> {
        let txnid = self.require("txnid")?.to_string();
        let status = status_from_payu(self.field("status"));
        let kind = match status {
            PaymentStatus::Unknown => PaymentEventKind::Unknown(self.field("status").to_string()),
            // abandoned at the checkout page, not a cancelled subscription
            PaymentStatus::Cancelled => PaymentEventKind::PaymentFailed,
            other => PaymentEventKind::from(other),
        };

        let occurred_at = self
            .get("addedon")
            .and_then(PayuStrategy::parse_added_on)
            .unwrap_or_else(Utc::now);

        let event_id = self.non_empty("mihpayid").unwrap_or_else(|| txnid.clone());
        let mut event = PaymentEvent::new(PROVIDER, event_id, kind, txnid, occurred_at);

        event.user_id = self.non_empty("udf1");
        event.plan_id = self
            .non_empty("udf2")
            .or_else(|| self.non_empty("productinfo"));
        event.amount = self
            .get("amount")
            .and_then(|a| a.trim().parse::<f64>().ok())
            .map(|a| Currency::INR.to_smallest_unit(a));
        event.currency = event.amount.map(|_| Currency::INR);
        event.payment_method = self.non_empty("mode");
        event.customer_email = self.non_empty("email");

        let raw: serde_json::Map<String, serde_json::Value> = self
            .fields
            .into_iter()
            .filter(|(k, _)| k != "hash")
            .map(|(k, v)| (k, serde_json::Value::String(v)))
            .collect();
        event.raw_data = Some(serde_json::Value::Object(raw));

        Ok(event)
    }
}

#[async_trait]
impl PaymentStrategy for PayuStrategy {
    #[instrument(skip(self, request, urls), fields(plan = %plan.id, user_id = %request.user_id))]
    async fn create_payment(
        &self,
        request: &PaymentRequest,
        plan: &Plan,
        urls: &ReturnUrls,
    ) -> PaymentResult<PaymentLink> {
        request.validate()?;

        let txnid = Self::new_txnid();
        let form = self.build_form(&txnid, request, plan, urls);

        info!(
            "Created PayU checkout form: txnid={}, amount={}",
            txnid,
            plan.price.display()
        );

        Ok(PaymentLink::form_post(
            PROVIDER,
            txnid,
            self.config.payment_url.clone(),
            form,
        ))
    }

    #[instrument(skip(self, payload, _headers))]
    async fn verify_webhook(
        &self,
        payload: &[u8],
        _headers: &WebhookHeaders,
    ) -> PaymentResult<PaymentEvent> {
        let response = PayuResponse::parse(payload)?;

        if let Err(e) = response.verify(&self.config) {
            warn!(
                "PayU hash verification failed: txnid={:?}, error={}",
                response.get("txnid"),
                e
            );
            return Err(e);
        }

        let event = response.into_event()?;
        debug!(
            "Verified PayU response: txnid={}, kind={:?}",
            event.payment_id, event.kind
        );
        Ok(event)
    }

    #[instrument(skip(self))]
    async fn payment_status(&self, payment_id: &str) -> PaymentResult<PaymentStatus> {
        let txnid = payment_id.trim();
        if txnid.is_empty() {
            return Err(PaymentError::InvalidRequest(
                "payment_id is required".to_string(),
            ));
        }

        let command = "verify_payment";
        let hash = hash::command_hash(
            &self.config.merchant_key,
            command,
            txnid,
            &self.config.merchant_salt,
        );
        let form = [
            ("key", self.config.merchant_key.as_str()),
            ("command", command),
            ("var1", txnid),
            ("hash", hash.as_str()),
        ];

        let response = self
            .client
            .post(&self.config.postservice_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| PaymentError::NetworkError(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PaymentError::NetworkError(e.to_string()))?;

        if !status.is_success() {
            error!("PayU API error: status={}, body={}", status, body);
            return Err(PaymentError::provider(
                PROVIDER,
                format!("HTTP {}: {}", status, body),
            ));
        }

        let parsed: VerifyPaymentResponse = serde_json::from_str(&body).map_err(|e| {
            PaymentError::Serialization(format!("Failed to parse PayU response: {}", e))
        })?;

        let details = parsed
            .transaction_details
            .get(txnid)
            .ok_or_else(|| PaymentError::provider(PROVIDER, format!("No details for {}", txnid)))?;

        let mapped = status_from_payu(&details.status);
        debug!("PayU status for {}: {} -> {}", txnid, details.status, mapped);
        Ok(mapped)
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

// =============================================================================
// PayU API Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct VerifyPaymentResponse {
    #[serde(default)]
    transaction_details: HashMap<String, TransactionDetails>,
}

#[derive(Debug, Deserialize)]
struct TransactionDetails {
    status: String,
}
