//! # Subscription Store
//!
//! Document-store seam for subscription records. Writes are merges: only the
//! fields present in an update are replaced, and the last writer wins.

use crate::error::PaymentResult;
use crate::subscription::{Subscription, SubscriptionUpdate};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Merge `update` onto the user's document, creating it if absent.
    async fn merge_subscription(
        &self,
        user_id: &str,
        update: &SubscriptionUpdate,
    ) -> PaymentResult<()>;

    /// Read the user's subscription fields, `None` if the document does not exist.
    async fn get_subscription(&self, user_id: &str) -> PaymentResult<Option<Subscription>>;

    /// Backend name (for logging and diagnostics)
    fn backend_name(&self) -> &'static str;
}

pub type BoxedSubscriptionStore = Arc<dyn SubscriptionStore>;

/// In-process store for development and tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<String, Subscription>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of user documents written so far
    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn merge_subscription(
        &self,
        user_id: &str,
        update: &SubscriptionUpdate,
    ) -> PaymentResult<()> {
        let mut documents = self.documents.write().await;
        documents
            .entry(user_id.to_string())
            .or_default()
            .apply(update);
        Ok(())
    }

    async fn get_subscription(&self, user_id: &str) -> PaymentResult<Option<Subscription>> {
        Ok(self.documents.read().await.get(user_id).cloned())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::SubscriptionStatus;
    use crate::tier::Tier;
    use chrono::Utc;

    #[tokio::test]
    async fn test_merge_creates_then_updates() {
        let store = MemoryStore::new();
        assert!(store.get_subscription("u1").await.unwrap().is_none());

        let grant = SubscriptionUpdate {
            tier: Some(Tier::Lifetime),
            paid: Some(true),
            ..Default::default()
        };
        store.merge_subscription("u1", &grant).await.unwrap();
        store
            .merge_subscription("u1", &SubscriptionUpdate::cancelled(Utc::now()))
            .await
            .unwrap();

        let record = store.get_subscription("u1").await.unwrap().unwrap();
        assert_eq!(record.tier, Tier::Lifetime);
        assert!(record.paid);
        assert_eq!(record.status, Some(SubscriptionStatus::Cancelled));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_users_are_isolated() {
        let store = MemoryStore::new();
        store
            .merge_subscription("u1", &SubscriptionUpdate::cancelled(Utc::now()))
            .await
            .unwrap();

        assert!(store.get_subscription("u2").await.unwrap().is_none());
        assert_eq!(store.backend_name(), "memory");
    }
}
