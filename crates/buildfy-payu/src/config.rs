//! # PayU Configuration
//!
//! Configuration management for the PayU integration.
//! All secrets are loaded from environment variables.

use buildfy_core::PaymentError;
use std::env;

const TEST_PAYMENT_URL: &str = "https://test.payu.in/_payment";
const LIVE_PAYMENT_URL: &str = "https://secure.payu.in/_payment";
const TEST_POSTSERVICE_URL: &str = "https://test.payu.in/merchant/postservice.php?form=2";
const LIVE_POSTSERVICE_URL: &str = "https://info.payu.in/merchant/postservice.php?form=2";

/// PayU environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayuMode {
    Test,
    Live,
}

impl PayuMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "test" | "sandbox" => Some(PayuMode::Test),
            "live" | "production" => Some(PayuMode::Live),
            _ => None,
        }
    }

    /// Hosted checkout endpoint
    pub fn payment_url(&self) -> &'static str {
        match self {
            PayuMode::Test => TEST_PAYMENT_URL,
            PayuMode::Live => LIVE_PAYMENT_URL,
        }
    }

    /// Merchant postservice endpoint
    pub fn postservice_url(&self) -> &'static str {
        match self {
            PayuMode::Test => TEST_POSTSERVICE_URL,
            PayuMode::Live => LIVE_POSTSERVICE_URL,
        }
    }
}

/// PayU merchant configuration
#[derive(Debug, Clone)]
pub struct PayuConfig {
    /// Merchant key (public, sent with every request)
    pub merchant_key: String,

    /// Merchant salt (secret, only ever hashed)
    pub merchant_salt: String,

    pub mode: PayuMode,

    /// Hosted checkout endpoint the browser form posts to
    pub payment_url: String,

    /// Merchant postservice endpoint (status queries)
    pub postservice_url: String,
}

impl PayuConfig {
    /// Load configuration from environment variables.
    ///
    /// Required env vars:
    /// - `PAYU_MERCHANT_KEY`
    /// - `PAYU_MERCHANT_SALT`
    ///
    /// Optional: `PAYU_MODE` (`test` | `live`, default `test`)
    pub fn from_env() -> Result<Self, PaymentError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let merchant_key = env::var("PAYU_MERCHANT_KEY")
            .map_err(|_| PaymentError::Configuration("PAYU_MERCHANT_KEY not set".to_string()))?;

        let merchant_salt = env::var("PAYU_MERCHANT_SALT")
            .map_err(|_| PaymentError::Configuration("PAYU_MERCHANT_SALT not set".to_string()))?;

        if merchant_key.trim().is_empty() || merchant_salt.trim().is_empty() {
            return Err(PaymentError::Configuration(
                "PAYU_MERCHANT_KEY and PAYU_MERCHANT_SALT must not be empty".to_string(),
            ));
        }

        let mode = match env::var("PAYU_MODE") {
            Ok(raw) => PayuMode::parse(&raw).ok_or_else(|| {
                PaymentError::Configuration(format!(
                    "PAYU_MODE must be test or live, got {}",
                    raw
                ))
            })?,
            Err(_) => PayuMode::Test,
        };

        Ok(Self::new(merchant_key.trim(), merchant_salt.trim(), mode))
    }

    /// Create config with explicit values (for testing)
    pub fn new(
        merchant_key: impl Into<String>,
        merchant_salt: impl Into<String>,
        mode: PayuMode,
    ) -> Self {
        Self {
            merchant_key: merchant_key.into(),
            merchant_salt: merchant_salt.into(),
            mode,
            payment_url: mode.payment_url().to_string(),
            postservice_url: mode.postservice_url().to_string(),
        }
    }

    pub fn is_test_mode(&self) -> bool {
        self.mode == PayuMode::Test
    }

    /// Builder: set custom postservice URL (for testing)
    pub fn with_postservice_url(mut self, url: impl Into<String>) -> Self {
        self.postservice_url = url.into();
        self
    }

    /// Builder: set custom payment URL
    pub fn with_payment_url(mut self, url: impl Into<String>) -> Self {
        self.payment_url = url.into();
        self
    }
}
