//! # Subscription Tiers
//!
//! Tier levels gate feature access in the builder. Every expiry date in the
//! system is derived from [`Tier::expiry_from`].

use chrono::{DateTime, Months, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Literal stored in `subscriptionExpiry` for tiers that never expire
pub const LIFETIME_EXPIRY: &str = "lifetime";

/// Subscription level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Standard,
    Pro,
    Lifetime,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::Free, Tier::Standard, Tier::Pro, Tier::Lifetime];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Standard => "standard",
            Tier::Pro => "pro",
            Tier::Lifetime => "lifetime",
        }
    }

    /// Case-insensitive parse
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Tier::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(value))
    }

    /// Expiry of a tier bought at `paid_at`.
    ///
    /// standard: one calendar month, pro: one calendar year,
    /// lifetime: never, free: no expiry policy.
    pub fn expiry_from(&self, paid_at: DateTime<Utc>) -> Expiry {
        let months = match self {
            Tier::Free => return Expiry::None,
            Tier::Lifetime => return Expiry::Lifetime,
            Tier::Standard => 1,
            Tier::Pro => 12,
        };

        // checked_add_months only fails past chrono's maximum date
        paid_at
            .checked_add_months(Months::new(months))
            .map(Expiry::At)
            .unwrap_or(Expiry::Lifetime)
    }

    pub fn is_paid(&self) -> bool {
        !matches!(self, Tier::Free)
    }

    /// Exports from the free tier carry the Buildfy watermark
    pub fn requires_watermark(&self) -> bool {
        matches!(self, Tier::Free)
    }
}

impl Default for Tier {
    fn default() -> Self {
        Tier::Free
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value of the `subscriptionExpiry` field.
///
/// Stored as an RFC 3339 timestamp, the literal `"lifetime"`, or `null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expiry {
    At(DateTime<Utc>),
    Lifetime,
    #[default]
    None,
}

impl Expiry {
    /// A dated expiry is reached at its timestamp; the other forms never expire.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self {
            Expiry::At(at) => *at <= now,
            Expiry::Lifetime | Expiry::None => false,
        }
    }

    /// String form as stored, `None` for a null expiry
    pub fn to_stored_string(&self) -> Option<String> {
        match self {
            Expiry::At(at) => Some(at.to_rfc3339_opts(SecondsFormat::Millis, true)),
            Expiry::Lifetime => Some(LIFETIME_EXPIRY.to_string()),
            Expiry::None => None,
        }
    }

    /// Inverse of [`Expiry::to_stored_string`]
    pub fn from_stored(value: Option<&str>) -> Result<Self, chrono::ParseError> {
        match value {
            None => Ok(Expiry::None),
            Some(LIFETIME_EXPIRY) => Ok(Expiry::Lifetime),
            Some(raw) => DateTime::parse_from_rfc3339(raw).map(|at| Expiry::At(at.with_timezone(&Utc))),
        }
    }
}

impl Serialize for Expiry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.to_stored_string() {
            Some(value) => serializer.serialize_str(&value),
            None => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for Expiry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        Expiry::from_stored(raw.as_deref()).map_err(serde::de::Error::custom)
    }
}
