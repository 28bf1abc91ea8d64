//! # buildfy-core
//!
//! Core billing types and traits for the Buildfy backend.
//!
//! This crate provides:
//! - `Tier` and `Expiry`, with the single expiry calculation every writer uses
//! - `Plan` and `PlanCatalog` for the purchasable plans
//! - `Subscription` and `SubscriptionUpdate`, the record merge-written onto user documents
//! - `PaymentEvent` and `subscription_update_for` for webhook processing
//! - `PaymentStrategy` trait for implementing payment providers
//! - `SubscriptionStore` trait and an in-memory store
//! - `PaymentError` for typed error handling
//!
//! ## Example
//!
//! ```rust,ignore
//! use buildfy_core::{subscription_update_for, PlanCatalog, WebhookHeaders};
//!
//! let event = strategy.verify_webhook(&body, &headers).await?;
//! let plan = event.plan_id.as_deref().and_then(|id| catalog.get(id));
//!
//! if let (Some(user_id), Some(update)) = (&event.user_id, subscription_update_for(&event, plan, Utc::now())) {
//!     store.merge_subscription(user_id, &update).await?;
//! }
//! ```

pub mod error;
pub mod event;
pub mod plan;
pub mod store;
pub mod strategy;
pub mod subscription;
pub mod tier;

// Re-exports for convenience
pub use error::{PaymentError, PaymentResult};
pub use event::{subscription_update_for, PaymentEvent, PaymentEventKind, PaymentStatus};
pub use plan::{Currency, Plan, PlanCatalog, Price};
pub use store::{BoxedSubscriptionStore, MemoryStore, SubscriptionStore};
pub use strategy::{
    BoxedPaymentStrategy, PaymentLink, PaymentRequest, PaymentStrategy, PaymentStrategySelector,
    RedirectMethod, ReturnUrls, WebhookHeaders,
};
pub use subscription::{
    PaymentProvenance, Subscription, SubscriptionStatus, SubscriptionUpdate,
};
pub use tier::{Expiry, Tier, LIFETIME_EXPIRY};
