//! # Firestore Store
//!
//! Subscription records live on `users/{uid}` documents in Firestore. Writes
//! go through the REST API as a `PATCH` with `updateMask.fieldPaths` listing
//! exactly the fields in the update, so the rest of the user document is
//! never touched.

use async_trait::async_trait;
use buildfy_core::{
    PaymentError, PaymentResult, Subscription, SubscriptionStore, SubscriptionUpdate,
};
use reqwest::{Client, StatusCode, Url};
use serde_json::{json, Map, Value};
use std::env;
use tracing::{debug, error, instrument};

const BACKEND: &str = "firestore";
const FIRESTORE_BASE_URL: &str = "https://firestore.googleapis.com";

/// Firestore REST configuration
#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    pub project_id: String,
    /// `https://firestore.googleapis.com` or the emulator origin
    pub base_url: String,
    /// OAuth bearer token; the emulator needs none
    pub access_token: Option<String>,
    pub collection: String,
}

impl FirestoreConfig {
    /// Load configuration from environment variables.
    ///
    /// - `FIREBASE_PROJECT_ID` (required)
    /// - `FIRESTORE_EMULATOR_HOST` (`host:port`, disables auth)
    /// - `FIRESTORE_ACCESS_TOKEN` (required without the emulator)
    pub fn from_env() -> PaymentResult<Self> {
        dotenvy::dotenv().ok();

        let project_id = env::var("FIREBASE_PROJECT_ID")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| {
                PaymentError::Configuration("FIREBASE_PROJECT_ID not set".to_string())
            })?;

        if let Ok(host) = env::var("FIRESTORE_EMULATOR_HOST") {
            return Ok(Self::new(project_id.trim(), format!("http://{}", host.trim()), None));
        }

        let token = env::var("FIRESTORE_ACCESS_TOKEN").map_err(|_| {
            PaymentError::Configuration(
                "FIRESTORE_ACCESS_TOKEN not set (or set FIRESTORE_EMULATOR_HOST)".to_string(),
            )
        })?;

        Ok(Self::new(
            project_id.trim(),
            FIRESTORE_BASE_URL,
            Some(token.trim().to_string()),
        ))
    }

    pub fn new(
        project_id: impl Into<String>,
        base_url: impl Into<String>,
        access_token: Option<String>,
    ) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            project_id: project_id.into(),
            base_url,
            access_token,
            collection: "users".to_string(),
        }
    }

    /// REST URL of a user document. Each part is percent-encoded as one
    /// path segment, so an id can never reach the query or another document.
    pub fn document_url(&self, user_id: &str) -> PaymentResult<Url> {
        let mut url = Url::parse(&self.base_url).map_err(|e| {
            PaymentError::Configuration(format!("Invalid Firestore URL {}: {}", self.base_url, e))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                PaymentError::Configuration(format!("Invalid Firestore URL {}", self.base_url))
            })?
            .pop_if_empty()
            .extend([
                "v1",
                "projects",
                self.project_id.as_str(),
                "databases",
                "(default)",
                "documents",
                self.collection.as_str(),
                user_id,
            ]);
        Ok(url)
    }
}

/// Firestore-backed subscription store
pub struct FirestoreStore {
    config: FirestoreConfig,
    client: Client,
}

impl FirestoreStore {
    pub fn new(config: FirestoreConfig) -> PaymentResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .map_err(|e| PaymentError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &FirestoreConfig {
        &self.config
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

/// Firestore document id rules: non-empty, at most 1500 bytes, no `/`,
/// not `.` or `..`, not `__name__`-style. Control characters are refused too.
fn check_user_id(user_id: &str) -> PaymentResult<&str> {
    let user_id = user_id.trim();
    let reserved = user_id.len() > 4 && user_id.starts_with("__") && user_id.ends_with("__");
    if user_id.is_empty()
        || user_id.len() > 1500
        || user_id.contains('/')
        || user_id.chars().any(char::is_control)
        || user_id == "."
        || user_id == ".."
        || reserved
    {
        return Err(PaymentError::InvalidRequest(format!(
            "Invalid user id: {:?}",
            user_id
        )));
    }
    Ok(user_id)
}

/// Encode a JSON value as a Firestore typed value
pub fn to_firestore_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            Some(i) if n.is_i64() => json!({ "integerValue": i.to_string() }),
            _ => json!({ "doubleValue": n.as_f64().unwrap_or_default() }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => json!({
            "arrayValue": { "values": items.iter().map(to_firestore_value).collect::<Vec<_>>() }
        }),
        Value::Object(map) => json!({ "mapValue": { "fields": to_firestore_fields(map) } }),
    }
}

fn to_firestore_fields(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .map(|(k, v)| (k.clone(), to_firestore_value(v)))
        .collect()
}

/// Decode a Firestore typed value into plain JSON
pub fn from_firestore_value(value: &Value) -> Value {
    let Some((kind, inner)) = value.as_object().and_then(|o| o.iter().next()) else {
        return Value::Null;
    };
    match kind.as_str() {
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" | "booleanValue"
        | "doubleValue" => inner.clone(),
        "integerValue" => inner
            .as_str()
            .and_then(|s| s.parse::<i64>().ok())
            .map(Value::from)
            .unwrap_or(Value::Null),
        "arrayValue" => Value::Array(
            inner
                .get("values")
                .and_then(|v| v.as_array())
                .map(|items| items.iter().map(from_firestore_value).collect())
                .unwrap_or_default(),
        ),
        "mapValue" => Value::Object(
            inner
                .get("fields")
                .and_then(|f| f.as_object())
                .map(from_firestore_fields)
                .unwrap_or_default(),
        ),
        _ => Value::Null,
    }
}

fn from_firestore_fields(fields: &Map<String, Value>) -> Map<String, Value> {
    fields
        .iter()
        .map(|(k, v)| (k.clone(), from_firestore_value(v)))
        .collect()
}

#[async_trait]
impl SubscriptionStore for FirestoreStore {
    #[instrument(skip(self, update), fields(fields = ?update.field_names()))]
    async fn merge_subscription(
        &self,
        user_id: &str,
        update: &SubscriptionUpdate,
    ) -> PaymentResult<()> {
        let user_id = check_user_id(user_id)?;
        if update.is_empty() {
            return Ok(());
        }

        let plain = match serde_json::to_value(update)? {
            Value::Object(map) => map,
            _ => return Err(PaymentError::Internal("Update is not an object".to_string())),
        };
        let body = json!({ "fields": to_firestore_fields(&plain) });

        let mask: Vec<(&str, &str)> = update
            .field_names()
            .into_iter()
            .map(|name| ("updateMask.fieldPaths", name))
            .collect();

        let response = self
            .authorize(
                self.client
                    .patch(self.config.document_url(user_id)?)
                    .query(&mask)
                    .json(&body),
            )
            .send()
            .await
            .map_err(|e| PaymentError::store(BACKEND, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!("Firestore write failed: status={}, body={}", status, text);
            return Err(PaymentError::store(BACKEND, format!("HTTP {}: {}", status, text)));
        }

        debug!("Merged subscription for {}", user_id);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_subscription(&self, user_id: &str) -> PaymentResult<Option<Subscription>> {
        let user_id = check_user_id(user_id)?;

        let response = self
            .authorize(self.client.get(self.config.document_url(user_id)?))
            .send()
            .await
            .map_err(|e| PaymentError::store(BACKEND, e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!("Firestore read failed: status={}, body={}", status, text);
            return Err(PaymentError::store(BACKEND, format!("HTTP {}: {}", status, text)));
        }

        let document: Value = response
            .json()
            .await
            .map_err(|e| PaymentError::store(BACKEND, format!("Invalid document: {}", e)))?;

        let fields = document
            .get("fields")
            .and_then(|f| f.as_object())
            .map(from_firestore_fields)
            .unwrap_or_default();

        let subscription: Subscription = serde_json::from_value(Value::Object(fields))
            .map_err(|e| PaymentError::store(BACKEND, format!("Unreadable subscription: {}", e)))?;
        Ok(Some(subscription))
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildfy_core::{Expiry, SubscriptionStatus, Tier};
    use chrono::{TimeZone, Utc};
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DOC_PATH: &str = "/v1/projects/buildfy-test/databases/(default)/documents/users/uid_1";

    fn store(server: &MockServer, token: Option<&str>) -> FirestoreStore {
        let config = FirestoreConfig::new("buildfy-test", server.uri(), token.map(String::from));
        FirestoreStore::new(config).unwrap()
    }

    #[test]
    fn test_document_url() {
        let config = FirestoreConfig::new("buildfy-prod", "https://firestore.googleapis.com/", None);
        assert_eq!(
            config.document_url("abc").unwrap().as_str(),
            "https://firestore.googleapis.com/v1/projects/buildfy-prod/databases/(default)/documents/users/abc"
        );
    }

    #[test]
    fn test_document_url_encodes_the_id() {
        let config = FirestoreConfig::new("buildfy-prod", "https://firestore.googleapis.com", None);

        let url = config.document_url("uid?updateMask.fieldPaths=email#x").unwrap();
        assert_eq!(
            url.path(),
            "/v1/projects/buildfy-prod/databases/(default)/documents/users/uid%3FupdateMask.fieldPaths=email%23x"
        );
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);

        let url = config.document_url("a b%2F").unwrap();
        assert!(url.path().ends_with("/users/a%20b%252F"));
    }

    #[test]
    fn test_typed_values() {
        assert_eq!(to_firestore_value(&json!("pro")), json!({ "stringValue": "pro" }));
        assert_eq!(to_firestore_value(&json!(true)), json!({ "booleanValue": true }));
        assert_eq!(to_firestore_value(&json!(299.0)), json!({ "doubleValue": 299.0 }));
        assert_eq!(to_firestore_value(&Value::Null), json!({ "nullValue": null }));

        assert_eq!(from_firestore_value(&json!({ "integerValue": "42" })), json!(42));
        assert_eq!(
            from_firestore_value(&json!({ "timestampValue": "2025-01-10T08:00:00Z" })),
            json!("2025-01-10T08:00:00Z")
        );
        assert_eq!(
            from_firestore_value(&json!({ "mapValue": { "fields": { "a": { "booleanValue": false } } } })),
            json!({ "a": false })
        );
    }

    #[test]
    fn test_rejects_path_like_user_ids() {
        assert!(check_user_id("users/other").is_err());
        assert!(check_user_id("  ").is_err());
        assert!(check_user_id("..").is_err());
        assert!(check_user_id("__name__").is_err());
        assert!(check_user_id("uid\n1").is_err());
        assert!(check_user_id(&"x".repeat(1501)).is_err());
        assert_eq!(check_user_id("__").unwrap(), "__");
        assert_eq!(check_user_id(" uid_1 ").unwrap(), "uid_1");
    }

    #[tokio::test]
    async fn test_merge_sends_update_mask() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path(DOC_PATH))
            .and(query_param("updateMask.fieldPaths", "status"))
            .and(header("authorization", "Bearer ya29.token"))
            .and(body_partial_json(json!({
                "fields": {
                    "status": { "stringValue": "cancelled" },
                    "updated_at": { "stringValue": "2025-02-01T00:00:00.000Z" }
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": "doc" })))
            .expect(1)
            .mount(&server)
            .await;

        let update = SubscriptionUpdate::cancelled(Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap());
        store(&server, Some("ya29.token"))
            .merge_subscription("uid_1", &update)
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let query = requests[0].url.query().unwrap_or_default().to_string();
        assert!(query.contains("updateMask.fieldPaths=status"));
        assert!(query.contains("updateMask.fieldPaths=updated_at"));
        assert!(!query.contains("tier"));
    }

    #[tokio::test]
    async fn test_merge_keeps_query_like_ids_in_the_path() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let update = SubscriptionUpdate::cancelled(Utc::now());
        store(&server, None)
            .merge_subscription("victim?updateMask.fieldPaths=email", &update)
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let url = &requests[0].url;
        assert_eq!(
            url.path(),
            "/v1/projects/buildfy-test/databases/(default)/documents/users/victim%3FupdateMask.fieldPaths=email"
        );
        let masked: Vec<String> = url
            .query_pairs()
            .filter(|(k, _)| k == "updateMask.fieldPaths")
            .map(|(_, v)| v.into_owned())
            .collect();
        assert_eq!(masked, vec!["status", "updated_at"]);
    }

    #[tokio::test]
    async fn test_merge_writes_null_expiry() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path(DOC_PATH))
            .and(body_partial_json(json!({
                "fields": {
                    "tier": { "stringValue": "free" },
                    "subscriptionExpiry": { "nullValue": null }
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let update = SubscriptionUpdate::refunded("pay_1", "dodo", Utc::now());
        store(&server, None)
            .merge_subscription("uid_1", &update)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_merge_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(403).set_body_string("PERMISSION_DENIED"))
            .mount(&server)
            .await;

        let result = store(&server, None)
            .merge_subscription("uid_1", &SubscriptionUpdate::cancelled(Utc::now()))
            .await;
        assert!(matches!(result, Err(PaymentError::Store { .. })));
    }

    #[tokio::test]
    async fn test_get_subscription() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(DOC_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "projects/buildfy-test/databases/(default)/documents/users/uid_1",
                "fields": {
                    "email": { "stringValue": "ada@example.com" },
                    "tier": { "stringValue": "pro" },
                    "status": { "stringValue": "active" },
                    "paid": { "booleanValue": true },
                    "amount": { "integerValue": "2499" },
                    "subscriptionExpiry": { "stringValue": "2026-05-01T12:00:00.000Z" }
                }
            })))
            .mount(&server)
            .await;

        let subscription = store(&server, None)
            .get_subscription("uid_1")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(subscription.tier, Tier::Pro);
        assert_eq!(subscription.status, Some(SubscriptionStatus::Active));
        assert!(subscription.paid);
        assert_eq!(subscription.amount, Some(2499.0));
        assert_eq!(
            subscription.subscription_expiry,
            Expiry::At(Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap())
        );
    }

    #[tokio::test]
    async fn test_get_missing_document() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": { "code": 404, "status": "NOT_FOUND" }
            })))
            .mount(&server)
            .await;

        assert!(store(&server, None)
            .get_subscription("uid_1")
            .await
            .unwrap()
            .is_none());
    }
}
