//! # Payment Strategy Trait
//!
//! Strategy pattern trait for payment providers.
//! Implementations: PayU (`buildfy-payu`), DodoPayments (`buildfy-dodo`).
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    PaymentStrategy (trait)                  │
//! │  ├── create_payment()                                       │
//! │  ├── verify_webhook()                                       │
//! │  ├── payment_status()                                       │
//! │  └── provider_name()                                        │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!                  ┌─────────┴─────────┐
//!          ┌───────┴───────┐   ┌───────┴───────┐
//!          │  PayuStrategy │   │  DodoStrategy │
//!          └───────────────┘   └───────────────┘
//! ```

use crate::error::{PaymentError, PaymentResult};
use crate::event::{PaymentEvent, PaymentStatus};
use crate::plan::Plan;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Payment-link creation request, as posted by the pricing page
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub plan_id: String,
    pub user_id: String,
    pub user_email: String,
    pub user_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl PaymentRequest {
    /// Reject requests the providers would refuse anyway
    pub fn validate(&self) -> PaymentResult<()> {
        let required = [
            ("planId", &self.plan_id),
            ("userId", &self.user_id),
            ("userEmail", &self.user_email),
            ("userName", &self.user_name),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(PaymentError::InvalidRequest(format!("{} is required", field)));
            }
        }

        let email = self.user_email.trim();
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
            _ => Err(PaymentError::InvalidRequest(format!(
                "userEmail is not a valid address: {}",
                email
            ))),
        }
    }

    /// First word of the user's name (PayU's `firstname`)
    pub fn first_name(&self) -> &str {
        self.user_name.split_whitespace().next().unwrap_or("")
    }
}

/// How the browser must be sent to the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RedirectMethod {
    /// Plain redirect to `url`
    Get,
    /// Auto-submitted form posted to `url`
    Post,
}

/// Where to send the customer to pay
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentLink {
    pub provider: String,
    /// Provider payment id (Dodo) or our transaction id (PayU)
    pub payment_id: String,
    pub url: String,
    pub method: RedirectMethod,
    /// Form fields for `RedirectMethod::Post`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub form_fields: Vec<(String, String)>,
}

impl PaymentLink {
    pub fn redirect(
        provider: impl Into<String>,
        payment_id: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            payment_id: payment_id.into(),
            url: url.into(),
            method: RedirectMethod::Get,
            form_fields: Vec::new(),
        }
    }

    pub fn form_post(
        provider: impl Into<String>,
        payment_id: impl Into<String>,
        url: impl Into<String>,
        form_fields: Vec<(String, String)>,
    ) -> Self {
        Self {
            provider: provider.into(),
            payment_id: payment_id.into(),
            url: url.into(),
            method: RedirectMethod::Post,
            form_fields,
        }
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.form_fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// URLs handed to providers for returning the customer
#[derive(Debug, Clone)]
pub struct ReturnUrls {
    /// Frontend origin (e.g. "https://buildfy.app")
    pub frontend_url: String,
    /// Public origin of this API, for provider callbacks
    pub api_url: String,
    pub success_path: String,
    pub failure_path: String,
}

impl ReturnUrls {
    pub fn new(frontend_url: impl Into<String>, api_url: impl Into<String>) -> Self {
        Self {
            frontend_url: trim_slash(frontend_url.into()),
            api_url: trim_slash(api_url.into()),
            success_path: "/payment/success".to_string(),
            failure_path: "/payment/failure".to_string(),
        }
    }

    pub fn success_url(&self) -> String {
        format!("{}{}", self.frontend_url, self.success_path)
    }

    pub fn failure_url(&self) -> String {
        format!("{}{}", self.frontend_url, self.failure_path)
    }

    /// API endpoint the provider posts the customer back to
    pub fn callback_url(&self, provider: &str) -> String {
        format!("{}/api/{}/callback", self.api_url, provider)
    }
}

impl Default for ReturnUrls {
    fn default() -> Self {
        Self::new("http://localhost:5173", "http://localhost:8080")
    }
}

fn trim_slash(mut url: String) -> String {
    while url.ends_with('/') {
        url.pop();
    }
    url
}

/// Webhook request headers, case-insensitive, independent of any HTTP framework
#[derive(Debug, Clone, Default)]
pub struct WebhookHeaders {
    headers: HashMap<String, String>,
}

impl WebhookHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    /// Builder: add a header
    pub fn with(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|v| v.as_str())
    }

    /// Header value or a verification error naming the header
    pub fn require(&self, name: &str) -> PaymentResult<&str> {
        self.get(name).ok_or_else(|| {
            PaymentError::WebhookVerificationFailed(format!("Missing {} header", name))
        })
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for WebhookHeaders {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = WebhookHeaders::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

/// Core trait for payment provider implementations.
#[async_trait]
pub trait PaymentStrategy: Send + Sync {
    /// Create a payment for `plan` and return where to send the customer.
    async fn create_payment(
        &self,
        request: &PaymentRequest,
        plan: &Plan,
        urls: &ReturnUrls,
    ) -> PaymentResult<PaymentLink>;

    /// Verify a webhook (or callback) and parse the event.
    ///
    /// # Arguments
    /// * `payload` - Raw request body bytes
    /// * `headers` - Request headers
    async fn verify_webhook(
        &self,
        payload: &[u8],
        headers: &WebhookHeaders,
    ) -> PaymentResult<PaymentEvent>;

    /// Ask the provider for the current status of a payment.
    async fn payment_status(&self, payment_id: &str) -> PaymentResult<PaymentStatus>;

    /// Get the provider name (for logging and routing).
    fn provider_name(&self) -> &'static str;

    /// Get the webhook endpoint path for this provider.
    /// Default: `/webhook/{provider_name}`
    fn webhook_path(&self) -> String {
        format!("/webhook/{}", self.provider_name())
    }
}

/// Type alias for a boxed payment strategy (dynamic dispatch)
pub type BoxedPaymentStrategy = Arc<dyn PaymentStrategy>;

/// Strategy selector for multiple providers
#[derive(Clone, Default)]
pub struct PaymentStrategySelector {
    strategies: HashMap<String, BoxedPaymentStrategy>,
}

impl PaymentStrategySelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a payment strategy
    pub fn register(&mut self, strategy: BoxedPaymentStrategy) {
        let name = strategy.provider_name().to_string();
        self.strategies.insert(name, strategy);
    }

    /// Register with builder pattern
    pub fn with_strategy(mut self, strategy: BoxedPaymentStrategy) -> Self {
        self.register(strategy);
        self
    }

    /// Get a strategy by provider name
    pub fn get(&self, provider: &str) -> Option<&BoxedPaymentStrategy> {
        self.strategies.get(provider)
    }

    /// Get a strategy or an `UnknownProvider` error
    pub fn require(&self, provider: &str) -> PaymentResult<&BoxedPaymentStrategy> {
        self.get(provider).ok_or_else(|| PaymentError::UnknownProvider {
            provider: provider.to_string(),
        })
    }

    /// List all registered providers, sorted
    pub fn providers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.strategies.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Check if a provider is registered
    pub fn has_provider(&self, provider: &str) -> bool {
        self.strategies.contains_key(provider)
    }
}
