//! # DodoPayments Configuration
//!
//! Configuration management for the DodoPayments integration.
//! All secrets are loaded from environment variables.

use buildfy_core::PaymentError;
use std::collections::HashMap;
use std::env;

const TEST_BASE_URL: &str = "https://test.dodopayments.com";
const LIVE_BASE_URL: &str = "https://live.dodopayments.com";

/// Plan id -> env var holding its Dodo product id
pub const PRODUCT_ENV_VARS: &[(&str, &str)] = &[
    ("standard", "DODO_PRODUCT_STANDARD"),
    ("pro", "DODO_PRODUCT_PRO"),
    ("lifetime", "DODO_PRODUCT_LIFETIME"),
];

/// Dodo environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DodoEnvironment {
    TestMode,
    LiveMode,
}

impl DodoEnvironment {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "test_mode" | "test" => Some(DodoEnvironment::TestMode),
            "live_mode" | "live" => Some(DodoEnvironment::LiveMode),
            _ => None,
        }
    }

    pub fn base_url(&self) -> &'static str {
        match self {
            DodoEnvironment::TestMode => TEST_BASE_URL,
            DodoEnvironment::LiveMode => LIVE_BASE_URL,
        }
    }
}

/// DodoPayments API configuration
#[derive(Debug, Clone)]
pub struct DodoConfig {
    /// Bearer API key
    pub api_key: String,

    /// Standard Webhooks signing secret (whsec_...)
    pub webhook_secret: String,

    pub environment: DodoEnvironment,

    /// API base URL (for testing/mocking)
    pub api_base_url: String,

    /// ISO country used for the billing address Dodo requires
    pub billing_country: String,

    /// Plan id -> Dodo product id
    pub products: HashMap<String, String>,
}

impl DodoConfig {
    /// Load configuration from environment variables.
    ///
    /// Required env vars:
    /// - `DODO_PAYMENTS_API_KEY`
    /// - `DODO_PAYMENTS_WEBHOOK_SECRET`
    ///
    /// Optional: `DODO_PAYMENTS_ENVIRONMENT`, `DODO_PAYMENTS_BASE_URL`,
    /// `DODO_BILLING_COUNTRY`, `DODO_PRODUCT_STANDARD`, `DODO_PRODUCT_PRO`,
    /// `DODO_PRODUCT_LIFETIME`
    pub fn from_env() -> Result<Self, PaymentError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let api_key = env::var("DODO_PAYMENTS_API_KEY").map_err(|_| {
            PaymentError::Configuration("DODO_PAYMENTS_API_KEY not set".to_string())
        })?;

        let webhook_secret = env::var("DODO_PAYMENTS_WEBHOOK_SECRET").map_err(|_| {
            PaymentError::Configuration("DODO_PAYMENTS_WEBHOOK_SECRET not set".to_string())
        })?;

        if !webhook_secret.starts_with("whsec_") {
            return Err(PaymentError::Configuration(
                "DODO_PAYMENTS_WEBHOOK_SECRET must start with whsec_".to_string(),
            ));
        }

        let environment = match env::var("DODO_PAYMENTS_ENVIRONMENT") {
            Ok(raw) => DodoEnvironment::parse(&raw).ok_or_else(|| {
                PaymentError::Configuration(format!(
                    "DODO_PAYMENTS_ENVIRONMENT must be test_mode or live_mode, got {}",
                    raw
                ))
            })?,
            Err(_) => DodoEnvironment::TestMode,
        };

        let mut config = Self::new(api_key.trim(), webhook_secret.trim(), environment);

        if let Ok(base_url) = env::var("DODO_PAYMENTS_BASE_URL") {
            config = config.with_api_base_url(base_url);
        }
        if let Ok(country) = env::var("DODO_BILLING_COUNTRY") {
            config.billing_country = country.trim().to_ascii_uppercase();
        }
        for (plan_id, var) in PRODUCT_ENV_VARS {
            if let Ok(product_id) = env::var(var) {
                if !product_id.trim().is_empty() {
                    config = config.with_product(*plan_id, product_id.trim());
                }
            }
        }

        Ok(config)
    }

    /// Create config with explicit values (for testing)
    pub fn new(
        api_key: impl Into<String>,
        webhook_secret: impl Into<String>,
        environment: DodoEnvironment,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            webhook_secret: webhook_secret.into(),
            environment,
            api_base_url: environment.base_url().to_string(),
            billing_country: "IN".to_string(),
            products: HashMap::new(),
        }
    }

    pub fn is_test_mode(&self) -> bool {
        self.environment == DodoEnvironment::TestMode
    }

    /// Get authorization header value
    pub fn auth_header(&self) -> String {
        format!("Bearer {}", self.api_key)
    }

    /// Builder: set custom API base URL (for testing)
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        let mut url = url.into();
        while url.ends_with('/') {
            url.pop();
        }
        self.api_base_url = url;
        self
    }

    /// Builder: map a plan id to a Dodo product id
    pub fn with_product(mut self, plan_id: impl Into<String>, product_id: impl Into<String>) -> Self {
        self.products.insert(plan_id.into(), product_id.into());
        self
    }
}
