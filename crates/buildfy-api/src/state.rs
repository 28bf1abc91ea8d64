//! # Application State
//!
//! Shared state for the Axum application.
//! Contains payment strategies, the plan catalog, the subscription store,
//! and configuration.

use crate::store::{FirestoreConfig, FirestoreStore};
use buildfy_core::{
    BoxedPaymentStrategy, BoxedSubscriptionStore, MemoryStore, PaymentStrategySelector,
    PlanCatalog, ReturnUrls,
};
use buildfy_dodo::DodoStrategy;
use buildfy_payu::PayuStrategy;
use std::sync::Arc;
use std::time::Duration;

/// Which subscription store backs the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Firestore,
}

impl StoreBackend {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Some(StoreBackend::Memory),
            "firestore" => Some(StoreBackend::Firestore),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreBackend::Memory => "memory",
            StoreBackend::Firestore => "firestore",
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Public origin of this API (provider callbacks)
    pub api_base_url: String,
    /// Frontend origin (payment result pages)
    pub frontend_url: String,
    /// Canonical site origin for the sitemap
    pub site_url: String,
    /// Environment (development, staging, production)
    pub environment: String,
    /// Key for the admin endpoints; unset disables them
    pub admin_api_key: Option<String>,
    pub store_backend: StoreBackend,
}

impl AppConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let frontend_url =
            var("FRONTEND_URL").unwrap_or_else(|| "http://localhost:5173".to_string());

        let store_backend = var("STORE_BACKEND")
            .and_then(|v| StoreBackend::parse(&v))
            .unwrap_or(if var("FIREBASE_PROJECT_ID").is_some() {
                StoreBackend::Firestore
            } else {
                StoreBackend::Memory
            });

        Self {
            host: var("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: var("PORT").and_then(|p| p.parse().ok()).unwrap_or(8080),
            api_base_url: var("API_BASE_URL")
                .unwrap_or_else(|| "http://localhost:8080".to_string()),
            site_url: var("SITE_URL").unwrap_or_else(|| frontend_url.clone()),
            frontend_url,
            environment: var("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
            admin_api_key: var("ADMIN_API_KEY"),
            store_backend,
        }
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> anyhow::Result<std::net::SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid socket address {}:{}: {}", self.host, self.port, e))
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn return_urls(&self) -> ReturnUrls {
        ReturnUrls::new(&self.frontend_url, &self.api_base_url)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Payment strategy selector
    pub strategies: PaymentStrategySelector,
    /// Plan catalog
    pub catalog: Arc<PlanCatalog>,
    /// Where subscription records are merge-written
    pub store: BoxedSubscriptionStore,
    /// Frontend and callback URLs
    pub urls: ReturnUrls,
    /// Application config
    pub config: AppConfig,
    /// Shared client for connectivity probes
    pub http_client: reqwest::Client,
}

impl AppState {
    /// Create the state from environment variables.
    ///
    /// A provider whose configuration is missing is skipped with a warning,
    /// so `/api/debug/env` can still report what is wrong.
    pub fn new() -> anyhow::Result<Self> {
        let config = AppConfig::from_env();
        let mut catalog = load_plan_catalog()?;
        let mut strategies = PaymentStrategySelector::new();

        match PayuStrategy::from_env() {
            Ok(payu) => {
                strategies.register(Arc::new(payu) as BoxedPaymentStrategy);
            }
            Err(e) => tracing::warn!("PayU disabled: {}", e),
        }

        match DodoStrategy::from_env() {
            Ok(dodo) => {
                catalog = catalog.with_dodo_products(&dodo.config().products);
                strategies.register(Arc::new(dodo) as BoxedPaymentStrategy);
            }
            Err(e) => tracing::warn!("DodoPayments disabled: {}", e),
        }

        let store: BoxedSubscriptionStore = match config.store_backend {
            StoreBackend::Firestore => {
                let firestore = FirestoreConfig::from_env()
                    .and_then(FirestoreStore::new)
                    .map_err(|e| anyhow::anyhow!("Failed to initialize Firestore: {}", e))?;
                Arc::new(firestore)
            }
            StoreBackend::Memory => {
                if config.is_production() {
                    tracing::warn!("Using the in-memory store in production");
                }
                Arc::new(MemoryStore::new())
            }
        };

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self::from_parts(config, strategies, catalog, store, http_client))
    }

    /// Assemble state from already-built parts (tests, embedding)
    pub fn from_parts(
        config: AppConfig,
        strategies: PaymentStrategySelector,
        catalog: PlanCatalog,
        store: BoxedSubscriptionStore,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            urls: config.return_urls(),
            strategies,
            catalog: Arc::new(catalog),
            store,
            config,
            http_client,
        }
    }
}

/// Load the plan catalog from config file, falling back to the built-in plans
fn load_plan_catalog() -> anyhow::Result<PlanCatalog> {
    let config_paths = [
        "config/plans.toml",
        "../config/plans.toml",
        "../../config/plans.toml",
    ];

    for path in config_paths {
        if let Ok(content) = std::fs::read_to_string(path) {
            let catalog = PlanCatalog::from_toml(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path, e))?;
            tracing::info!("Loaded {} plans from {}", catalog.len(), path);
            return Ok(catalog);
        }
    }

    tracing::warn!("No plan catalog found, using built-in plans");
    Ok(PlanCatalog::builtin())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_app_config_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert_eq!(config.site_url, "http://localhost:5173");
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert!(config.admin_api_key.is_none());
    }

    #[test]
    fn test_store_backend_selection() {
        let config = AppConfig::from_lookup(lookup(&[("FIREBASE_PROJECT_ID", "buildfy-prod")]));
        assert_eq!(config.store_backend, StoreBackend::Firestore);

        let config = AppConfig::from_lookup(lookup(&[
            ("FIREBASE_PROJECT_ID", "buildfy-prod"),
            ("STORE_BACKEND", "memory"),
        ]));
        assert_eq!(config.store_backend, StoreBackend::Memory);
    }

    #[test]
    fn test_return_urls_from_config() {
        let config = AppConfig::from_lookup(lookup(&[
            ("FRONTEND_URL", "https://buildfy.app"),
            ("API_BASE_URL", "https://api.buildfy.app/"),
        ]));
        let urls = config.return_urls();
        assert_eq!(urls.success_url(), "https://buildfy.app/payment/success");
        assert_eq!(urls.callback_url("payu"), "https://api.buildfy.app/api/payu/callback");
    }

    #[test]
    fn test_socket_addr() {
        let config = AppConfig {
            host: "0.0.0.0".to_string(),
            port: 3000,
            ..AppConfig::default()
        };
        assert_eq!(config.socket_addr().unwrap().to_string(), "0.0.0.0:3000");

        let config = AppConfig {
            host: "not a host".to_string(),
            ..AppConfig::default()
        };
        assert!(config.socket_addr().is_err());
    }
}
