//! # Routes
//!
//! Axum router configuration for the billing API.

use crate::state::{AppConfig, AppState};
use crate::{admin, diagnostics, handlers, seo};
use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Browsers may call the API from the frontend origin in production, from anywhere otherwise
fn cors_layer(config: &AppConfig) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    match HeaderValue::from_str(config.frontend_url.trim_end_matches('/')) {
        Ok(origin) if config.is_production() => cors.allow_origin(origin),
        _ => cors.allow_origin(Any),
    }
}

/// Create the main application router
///
/// Routes:
/// - GET  /, /health
/// - GET  /api/plans
/// - POST /api/payments/{provider}/create
/// - GET  /api/payments/{provider}/status?payment_id=
/// - POST /api/payu/callback - PayU browser return (surl/furl)
/// - GET  /api/debug/env, /api/debug/connectivity
/// - GET|PUT /api/admin/subscriptions/{user_id} - requires x-admin-key
/// - POST /webhook/{provider}
/// - GET  /sitemap.xml, /robots.txt
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    let payment_routes = Router::new()
        .route("/{provider}/create", post(handlers::create_payment))
        .route("/{provider}/status", get(handlers::payment_status));

    let debug_routes = Router::new()
        .route("/env", get(diagnostics::debug_env))
        .route("/connectivity", get(diagnostics::debug_connectivity));

    let admin_routes = Router::new().route(
        "/subscriptions/{user_id}",
        get(admin::get_subscription).put(admin::grant_subscription),
    );

    let api_routes = Router::new()
        .route("/plans", get(handlers::list_plans))
        .route("/payu/callback", post(handlers::payu_callback))
        .nest("/payments", payment_routes)
        .nest("/debug", debug_routes)
        .nest("/admin", admin_routes);

    // Webhook routes (raw body, verified per provider)
    let webhook_routes = Router::new().route("/{provider}", post(handlers::provider_webhook));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/", get(handlers::health))
        .route("/sitemap.xml", get(seo::sitemap))
        .route("/robots.txt", get(seo::robots))
        .nest("/api", api_routes)
        .nest("/webhook", webhook_routes)
        // Middleware
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        // State
        .with_state(state)
}
