//! # buildfy-payu
//!
//! PayU payment strategy for the Buildfy backend.
//!
//! PayU's hosted checkout is form based:
//!
//! 1. `create_payment` returns a POST-form `PaymentLink` whose fields carry
//!    a SHA-512 request hash. The frontend auto-submits it to PayU.
//! 2. PayU posts the result to our callback (surl/furl) and, when configured
//!    in the dashboard, to the webhook endpoint. Both bodies are
//!    form-encoded and carry a reverse hash.
//! 3. `verify_webhook` recomputes that hash with the merchant salt before
//!    any field is trusted.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use buildfy_payu::PayuStrategy;
//! use buildfy_core::PaymentStrategy;
//!
//! let strategy = PayuStrategy::from_env()?;
//! let link = strategy.create_payment(&request, &plan, &urls).await?;
//! // render link.form_fields as an auto-submitting form posting to link.url
//! ```

pub mod checkout;
pub mod config;
pub mod hash;

// Re-exports
pub use checkout::{status_from_payu, PayuResponse, PayuStrategy};
pub use config::{PayuConfig, PayuMode};
