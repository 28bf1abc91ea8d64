//! # buildfy-dodo
//!
//! DodoPayments strategy for the Buildfy backend.
//!
//! - `create_payment` asks Dodo for a hosted payment link carrying
//!   `metadata.userId` and `metadata.planId`
//! - `verify_webhook` checks the Standard Webhooks signature before the body is parsed
//! - `payment_status` reads `GET /payments/{id}`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use buildfy_dodo::DodoStrategy;
//! use buildfy_core::PaymentStrategy;
//!
//! let strategy = DodoStrategy::from_env()?;
//! let link = strategy.create_payment(&request, &plan, &urls).await?;
//! // redirect the customer to link.url
//! ```

pub mod checkout;
pub mod config;
pub mod webhook;

// Re-exports
pub use checkout::{status_from_dodo, DodoStrategy};
pub use config::{DodoConfig, DodoEnvironment, PRODUCT_ENV_VARS};
pub use webhook::{verify_signature, REQUIRED_WEBHOOK_EVENTS};
