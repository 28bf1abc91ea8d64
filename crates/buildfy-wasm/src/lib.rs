//! # buildfy-wasm
//!
//! WebAssembly bindings for Buildfy tier gating.
//!
//! The builder canvas decides locally whether an export carries the
//! watermark and which tier a stored subscription still grants. The rules
//! are the ones the API writes with, taken from `buildfy-core`.
//!
//! ## Usage (JavaScript)
//!
//! ```javascript
//! import init, { effective_tier, requires_watermark } from 'buildfy-wasm';
//!
//! await init();
//!
//! const tier = effective_tier(JSON.stringify(userDoc), Date.now());
//! if (requires_watermark(tier)) {
//!   addWatermark(canvas);
//! }
//! ```
//!
//! ## Building
//!
//! ```bash
//! wasm-pack build --target web
//! ```

use buildfy_core::{Subscription, Tier};
use chrono::{DateTime, Utc};
use wasm_bindgen::prelude::*;

/// Unknown tier names gate like free
fn tier_or_free(tier: &str) -> Tier {
    Tier::parse(tier).unwrap_or_default()
}

fn parse_now(now_ms: f64) -> Result<DateTime<Utc>, String> {
    if !now_ms.is_finite() {
        return Err(format!("Invalid timestamp: {}", now_ms));
    }
    DateTime::from_timestamp_millis(now_ms as i64)
        .ok_or_else(|| format!("Timestamp out of range: {}", now_ms))
}

/// Tier a stored subscription document grants at `now_ms`
pub fn effective_tier_at(subscription_json: &str, now_ms: f64) -> Result<Tier, String> {
    let now = parse_now(now_ms)?;
    if subscription_json.trim().is_empty() || subscription_json.trim() == "null" {
        return Ok(Tier::Free);
    }
    let subscription: Subscription = serde_json::from_str(subscription_json)
        .map_err(|e| format!("Invalid subscription: {}", e))?;
    Ok(subscription.effective_tier(now))
}

/// Stored expiry for `tier` bought at `paid_at_iso`, `None` for free
pub fn expiry_for(tier: &str, paid_at_iso: &str) -> Result<Option<String>, String> {
    let tier = Tier::parse(tier).ok_or_else(|| format!("Unknown tier: {}", tier))?;
    let paid_at = DateTime::parse_from_rfc3339(paid_at_iso.trim())
        .map_err(|e| format!("Invalid paid_at {}: {}", paid_at_iso, e))?
        .with_timezone(&Utc);
    Ok(tier.expiry_from(paid_at).to_stored_string())
}

/// Whether exports at this tier carry the Buildfy watermark
#[wasm_bindgen]
pub fn requires_watermark(tier: &str) -> bool {
    tier_or_free(tier).requires_watermark()
}

#[wasm_bindgen]
pub fn is_paid_tier(tier: &str) -> bool {
    tier_or_free(tier).is_paid()
}

/// Tier name the subscription JSON grants at `now_ms` (ms since epoch)
#[wasm_bindgen]
pub fn effective_tier(subscription_json: &str, now_ms: f64) -> Result<String, JsValue> {
    effective_tier_at(subscription_json, now_ms)
        .map(|tier| tier.as_str().to_string())
        .map_err(|e| JsValue::from_str(&e))
}

/// Expiry string (`"lifetime"` or RFC 3339) for a purchase, `undefined` for free
#[wasm_bindgen]
pub fn plan_expiry(tier: &str, paid_at_iso: &str) -> Result<Option<String>, JsValue> {
    expiry_for(tier, paid_at_iso).map_err(|e| JsValue::from_str(&e))
}

/// Get library version
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
