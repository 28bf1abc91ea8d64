//! # Plans
//!
//! Purchasable plans and their prices.
//! Plans are loaded from `config/plans.toml`, with a built-in catalog as fallback.

use crate::tier::Tier;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Supported currencies (ISO 4217)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    INR,
    USD,
    EUR,
    GBP,
}

impl Currency {
    /// Returns the ISO 4217 currency code
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::INR => "INR",
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::GBP => "GBP",
        }
    }

    /// Case-insensitive lookup from a provider's currency code
    pub fn parse(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "INR" => Some(Currency::INR),
            "USD" => Some(Currency::USD),
            "EUR" => Some(Currency::EUR),
            "GBP" => Some(Currency::GBP),
            _ => None,
        }
    }

    /// All supported currencies use two decimal places
    pub fn decimal_places(&self) -> u8 {
        2
    }

    /// Convert a decimal amount to the smallest currency unit (paise, cents)
    pub fn to_smallest_unit(&self, amount: f64) -> i64 {
        let multiplier = 10_f64.powi(self.decimal_places() as i32);
        (amount * multiplier).round() as i64
    }

    /// Convert from smallest unit back to decimal
    pub fn from_smallest_unit(&self, amount: i64) -> f64 {
        let divisor = 10_f64.powi(self.decimal_places() as i32);
        amount as f64 / divisor
    }
}

impl Default for Currency {
    fn default() -> Self {
        Currency::INR
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Price with amount in smallest currency unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Amount in smallest currency unit (paise for INR)
    pub amount: i64,
    /// Currency
    pub currency: Currency,
}

impl Price {
    /// Create a new price from decimal amount
    pub fn new(amount: f64, currency: Currency) -> Self {
        Self {
            amount: currency.to_smallest_unit(amount),
            currency,
        }
    }

    /// Create a price from smallest unit
    pub fn from_minor(amount: i64, currency: Currency) -> Self {
        Self { amount, currency }
    }

    /// Get the decimal amount
    pub fn as_decimal(&self) -> f64 {
        self.currency.from_smallest_unit(self.amount)
    }

    /// Fixed two-decimal string, the form PayU hashes (e.g. "299.00")
    pub fn as_decimal_string(&self) -> String {
        let places = self.currency.decimal_places() as usize;
        format!("{:.*}", places, self.as_decimal())
    }

    /// Format for display (e.g., "₹299.00")
    pub fn display(&self) -> String {
        let symbol = match self.currency {
            Currency::INR => "₹",
            Currency::USD => "$",
            Currency::EUR => "€",
            Currency::GBP => "£",
        };
        format!("{}{}", symbol, self.as_decimal_string())
    }
}

/// A purchasable plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// Plan identifier sent by the frontend (e.g., "pro")
    pub id: String,

    /// Display name
    pub name: String,

    /// Short description
    #[serde(default)]
    pub description: String,

    /// Tier granted on successful payment
    pub tier: Tier,

    /// Price
    pub price: Price,

    /// DodoPayments product id for this plan
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dodo_product_id: Option<String>,

    /// Whether this plan is available for purchase
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

impl Plan {
    pub fn new(id: impl Into<String>, name: impl Into<String>, tier: Tier, price: Price) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            tier,
            price,
            dodo_product_id: None,
            active: true,
        }
    }

    /// Builder: set description
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// Builder: set the Dodo product id
    pub fn with_dodo_product(mut self, product_id: impl Into<String>) -> Self {
        self.dodo_product_id = Some(product_id.into());
        self
    }

    /// Whether the plan renews (standard and pro) or is bought once
    pub fn is_recurring(&self) -> bool {
        matches!(self.tier, Tier::Standard | Tier::Pro)
    }
}

/// Plan catalog (loaded from config)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanCatalog {
    pub plans: Vec<Plan>,
}

impl PlanCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self { plans: Vec::new() }
    }

    /// The catalog used when no `plans.toml` is found
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        catalog.add(
            Plan::new("standard", "Standard", Tier::Standard, Price::new(299.0, Currency::INR))
                .with_description("All widgets, no watermark, billed monthly"),
        );
        catalog.add(
            Plan::new("pro", "Pro", Tier::Pro, Price::new(2499.0, Currency::INR))
                .with_description("Everything in Standard plus code export, billed yearly"),
        );
        catalog.add(
            Plan::new("lifetime", "Lifetime", Tier::Lifetime, Price::new(4999.0, Currency::INR))
                .with_description("One payment, every future update"),
        );
        catalog
    }

    /// Add a plan to the catalog
    pub fn add(&mut self, plan: Plan) {
        self.plans.push(plan);
    }

    /// Find a plan by id (case-insensitive)
    pub fn get(&self, id: &str) -> Option<&Plan> {
        let id = id.trim();
        self.plans.iter().find(|p| p.id.eq_ignore_ascii_case(id))
    }

    /// Find the plan a Dodo product id belongs to
    pub fn by_dodo_product(&self, product_id: &str) -> Option<&Plan> {
        self.plans
            .iter()
            .find(|p| p.dodo_product_id.as_deref() == Some(product_id))
    }

    /// Get all active plans
    pub fn active_plans(&self) -> impl Iterator<Item = &Plan> {
        self.plans.iter().filter(|p| p.active)
    }

    /// Override Dodo product ids (plan id -> product id), e.g. from environment
    pub fn with_dodo_products(mut self, products: &HashMap<String, String>) -> Self {
        for plan in &mut self.plans {
            if let Some(product_id) = products.get(&plan.id) {
                plan.dodo_product_id = Some(product_id.clone());
            }
        }
        self
    }

    /// Load catalog from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_conversion() {
        let inr = Currency::INR;
        assert_eq!(inr.to_smallest_unit(299.99), 29999);
        assert_eq!(inr.from_smallest_unit(29999), 299.99);
        assert_eq!(Currency::parse("usd"), Some(Currency::USD));
        assert_eq!(Currency::parse("JPY"), None);
    }

    #[test]
    fn test_price_strings() {
        let price = Price::new(299.0, Currency::INR);
        assert_eq!(price.as_decimal_string(), "299.00");
        assert_eq!(price.display(), "₹299.00");

        let price = Price::from_minor(1999, Currency::USD);
        assert_eq!(price.as_decimal_string(), "19.99");
        assert_eq!(price.display(), "$19.99");
    }

    #[test]
    fn test_builtin_catalog() {
        let catalog = PlanCatalog::builtin();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.get("PRO").unwrap().tier, Tier::Pro);
        assert!(catalog.get("free").is_none());
        assert!(catalog.get("standard").unwrap().is_recurring());
        assert!(!catalog.get("lifetime").unwrap().is_recurring());
    }

    #[test]
    fn test_dodo_product_overrides() {
        let mut products = HashMap::new();
        products.insert("pro".to_string(), "pdt_pro_123".to_string());

        let catalog = PlanCatalog::builtin().with_dodo_products(&products);

        assert_eq!(catalog.by_dodo_product("pdt_pro_123").unwrap().id, "pro");
        assert!(catalog.get("standard").unwrap().dodo_product_id.is_none());
        assert!(catalog.by_dodo_product("pdt_unknown").is_none());
    }

    #[test]
    fn test_catalog_from_toml() {
        let toml_str = r#"
            [[plans]]
            id = "standard"
            name = "Standard"
            tier = "standard"
            price = { amount = 29900, currency = "INR" }
            dodo_product_id = "pdt_std"

            [[plans]]
            id = "legacy"
            name = "Legacy"
            tier = "pro"
            price = { amount = 100, currency = "USD" }
            active = false
        "#;

        let catalog = PlanCatalog::from_toml(toml_str).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.active_plans().count(), 1);
        assert_eq!(catalog.get("standard").unwrap().price.as_decimal_string(), "299.00");
        assert_eq!(catalog.by_dodo_product("pdt_std").unwrap().tier, Tier::Standard);
    }
}
