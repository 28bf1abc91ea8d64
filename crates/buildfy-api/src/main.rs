//! # Buildfy API
//!
//! Billing backend for the Buildfy site builder.
//!
//! ## Usage
//!
//! ```bash
//! # Set environment variables
//! export PAYU_MERCHANT_KEY=...
//! export PAYU_MERCHANT_SALT=...
//! export DODO_PAYMENTS_API_KEY=...
//! export DODO_PAYMENTS_WEBHOOK_SECRET=whsec_...
//! export FIREBASE_PROJECT_ID=...
//!
//! # Run the server
//! buildfy-api
//! ```

use buildfy_api::{routes, state::AppState};
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging, JSON lines in production
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();
    let json_logs = std::env::var("ENVIRONMENT").is_ok_and(|env| env == "production");
    let registry = tracing_subscriber::registry().with(filter);
    if json_logs {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }

    print_banner();

    // Initialize application state
    let state = AppState::new()?;

    let addr = state.config.socket_addr()?;
    let is_prod = state.config.is_production();

    info!("Environment: {}", state.config.environment);
    info!("Plans loaded: {}", state.catalog.len());
    info!("Payment providers: {:?}", state.strategies.providers());
    info!("Subscription store: {}", state.store.backend_name());
    if state.config.admin_api_key.is_none() {
        info!("Admin endpoints disabled (ADMIN_API_KEY not set)");
    }

    let app = routes::create_router(state);

    info!("Buildfy API starting on http://{}", addr);

    if !is_prod {
        info!("Health: http://{}/health", addr);
        info!("Create payment: POST http://{}/api/payments/{{provider}}/create", addr);
        info!("Webhook: POST http://{}/webhook/{{provider}}", addr);
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn print_banner() {
    println!(
        r#"
  Buildfy API
  ━━━━━━━━━━━━━━━━━━━━━━━
  Payments and subscriptions
  Version: {}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
