//! # buildfy-api
//!
//! HTTP API for Buildfy billing.
//!
//! This crate provides:
//! - Axum-based HTTP server
//! - Payment-link creation for PayU and DodoPayments
//! - Webhook and callback handlers that merge-write subscriptions
//! - Environment and connectivity diagnostics
//! - `sitemap.xml` / `robots.txt` for the public site
//!
//! ## Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/health` | Health check |
//! | GET | `/api/plans` | List plans |
//! | POST | `/api/payments/{provider}/create` | Create payment link |
//! | GET | `/api/payments/{provider}/status` | Query payment status |
//! | POST | `/api/payu/callback` | PayU browser return |
//! | POST | `/webhook/{provider}` | Provider webhook |
//! | GET | `/api/debug/env` | Env var report |
//! | GET | `/api/debug/connectivity` | Outbound reachability |
//! | GET, PUT | `/api/admin/subscriptions/{user_id}` | Read / grant subscription |
//! | GET | `/sitemap.xml`, `/robots.txt` | SEO files |

pub mod admin;
pub mod auth;
pub mod diagnostics;
pub mod handlers;
pub mod pages;
pub mod routes;
pub mod seo;
pub mod state;
pub mod store;

pub use routes::create_router;
pub use state::{AppConfig, AppState};
