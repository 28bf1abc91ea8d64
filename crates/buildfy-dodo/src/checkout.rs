//! # Dodo Payment Links
//!
//! Hosted payment links via the DodoPayments API.
//! Recurring plans go through `/subscriptions`, one-off plans through `/payments`.

use crate::config::DodoConfig;
use crate::webhook::{self, HEADER_ID, HEADER_SIGNATURE, HEADER_TIMESTAMP};
use async_trait::async_trait;
use buildfy_core::{
    PaymentError, PaymentEvent, PaymentLink, PaymentRequest, PaymentResult, PaymentStatus,
    PaymentStrategy, Plan, ReturnUrls, WebhookHeaders,
};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

const PROVIDER: &str = "dodo";

/// DodoPayments payment-link strategy
pub struct DodoStrategy {
    config: DodoConfig,
    client: Client,
}

impl DodoStrategy {
    /// Create a new Dodo strategy
    pub fn new(config: DodoConfig) -> PaymentResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| PaymentError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Create from environment variables
    pub fn from_env() -> PaymentResult<Self> {
        Self::new(DodoConfig::from_env()?)
    }

    pub fn config(&self) -> &DodoConfig {
        &self.config
    }

    /// Dodo product backing `plan`; config overrides the catalog
    fn product_id<'a>(&'a self, plan: &'a Plan) -> PaymentResult<&'a str> {
        self.config
            .products
            .get(&plan.id)
            .map(String::as_str)
            .or(plan.dodo_product_id.as_deref())
            .ok_or_else(|| {
                PaymentError::Configuration(format!(
                    "No Dodo product configured for plan {}",
                    plan.id
                ))
            })
    }

    fn checkout_body(
        &self,
        request: &PaymentRequest,
        plan: &Plan,
        product_id: &str,
        urls: &ReturnUrls,
    ) -> CheckoutRequest {
        CheckoutRequest {
            payment_link: true,
            billing: Billing {
                city: String::new(),
                country: self.config.billing_country.clone(),
                state: String::new(),
                street: String::new(),
                zipcode: String::new(),
            },
            customer: Customer {
                email: request.user_email.trim().to_string(),
                name: request.user_name.trim().to_string(),
            },
            product_cart: (!plan.is_recurring()).then(|| {
                vec![CartItem {
                    product_id: product_id.to_string(),
                    quantity: 1,
                }]
            }),
            product_id: plan.is_recurring().then(|| product_id.to_string()),
            quantity: plan.is_recurring().then_some(1),
            return_url: urls.success_url(),
            metadata: Metadata {
                user_id: request.user_id.clone(),
                plan_id: plan.id.clone(),
            },
        }
    }

    /// Send an API request and parse the JSON response
    async fn send<T: for<'de> Deserialize<'de>>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> PaymentResult<T> {
        let response = builder
            .header("Authorization", self.config.auth_header())
            .send()
            .await
            .map_err(|e| PaymentError::NetworkError(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PaymentError::NetworkError(e.to_string()))?;

        if !status.is_success() {
            error!("Dodo API error: status={}, body={}", status, body);
            return Err(PaymentError::provider(
                PROVIDER,
                format!("HTTP {}: {}", status, body),
            ));
        }

        serde_json::from_str(&body).map_err(|e| {
            PaymentError::Serialization(format!("Failed to parse Dodo response: {}", e))
        })
    }
}

/// Map Dodo's payment status strings
pub fn status_from_dodo(status: Option<&str>) -> PaymentStatus {
    let Some(status) = status else {
        return PaymentStatus::Pending;
    };
    match status.trim().to_ascii_lowercase().as_str() {
        "succeeded" => PaymentStatus::Succeeded,
        "failed" => PaymentStatus::Failed,
        "cancelled" => PaymentStatus::Cancelled,
        "processing" | "requires_customer_action" | "requires_merchant_action"
        | "requires_payment_method" | "requires_confirmation" | "requires_capture" => {
            PaymentStatus::Pending
        }
        _ => PaymentStatus::Unknown,
    }
}

/// Dodo ids (`pay_...`, `sub_...`) are a single URL path segment
fn is_dodo_id(id: &str) -> bool {
    id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[async_trait]
impl PaymentStrategy for DodoStrategy {
    #[instrument(skip(self, request, urls), fields(plan = %plan.id, user_id = %request.user_id))]
    async fn create_payment(
        &self,
        request: &PaymentRequest,
        plan: &Plan,
        urls: &ReturnUrls,
    ) -> PaymentResult<PaymentLink> {
        request.validate()?;

        let product_id = self.product_id(plan)?;
        let body = self.checkout_body(request, plan, product_id, urls);
        let endpoint = if plan.is_recurring() {
            "subscriptions"
        } else {
            "payments"
        };
        let url = format!("{}/{}", self.config.api_base_url, endpoint);

        let created: CheckoutResponse = self.send(self.client.post(&url).json(&body)).await?;

        let payment_url = created.payment_link.ok_or_else(|| {
            PaymentError::provider(PROVIDER, "Response carried no payment_link")
        })?;
        let payment_id = created
            .payment_id
            .or(created.subscription_id)
            .ok_or_else(|| PaymentError::provider(PROVIDER, "Response carried no payment id"))?;

        info!(
            "Created Dodo payment link: id={}, product={}, amount={}",
            payment_id,
            product_id,
            plan.price.display()
        );

        Ok(PaymentLink::redirect(PROVIDER, payment_id, payment_url))
    }

    #[instrument(skip(self, payload, headers))]
    async fn verify_webhook(
        &self,
        payload: &[u8],
        headers: &WebhookHeaders,
    ) -> PaymentResult<PaymentEvent> {
        let msg_id = headers.require(HEADER_ID)?;
        let timestamp = headers.require(HEADER_TIMESTAMP)?;
        let signature = headers.require(HEADER_SIGNATURE)?;

        if let Err(e) = webhook::verify_signature(
            &self.config.webhook_secret,
            msg_id,
            timestamp,
            payload,
            signature,
            Utc::now(),
        ) {
            warn!("Dodo signature verification failed: id={}, error={}", msg_id, e);
            return Err(e);
        }

        let sent_at = timestamp
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or_else(Utc::now);

        let event = webhook::parse_event(msg_id, payload, sent_at)?;
        debug!(
            "Verified Dodo webhook: id={}, kind={:?}, payment={}",
            msg_id, event.kind, event.payment_id
        );
        Ok(event)
    }

    #[instrument(skip(self))]
    async fn payment_status(&self, payment_id: &str) -> PaymentResult<PaymentStatus> {
        let payment_id = payment_id.trim();
        if payment_id.is_empty() {
            return Err(PaymentError::InvalidRequest(
                "payment_id is required".to_string(),
            ));
        }
        if !is_dodo_id(payment_id) {
            return Err(PaymentError::InvalidRequest(format!(
                "Invalid payment_id: {:?}",
                payment_id
            )));
        }

        let url = format!("{}/payments/{}", self.config.api_base_url, payment_id);
        let payment: PaymentResponse = self.send(self.client.get(&url)).await?;

        let mapped = status_from_dodo(payment.status.as_deref());
        debug!("Dodo status for {}: {:?} -> {}", payment_id, payment.status, mapped);
        Ok(mapped)
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

// =============================================================================
// Dodo API Types
// =============================================================================

#[derive(Debug, Serialize)]
struct CheckoutRequest {
    payment_link: bool,
    billing: Billing,
    customer: Customer,
    #[serde(skip_serializing_if = "Option::is_none")]
    product_cart: Option<Vec<CartItem>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    product_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    quantity: Option<u32>,
    return_url: String,
    metadata: Metadata,
}

#[derive(Debug, Serialize)]
struct Billing {
    city: String,
    country: String,
    state: String,
    street: String,
    zipcode: String,
}

#[derive(Debug, Serialize)]
struct Customer {
    email: String,
    name: String,
}

#[derive(Debug, Serialize)]
struct CartItem {
    product_id: String,
    quantity: u32,
}

#[derive(Debug, Serialize)]
struct Metadata {
    #[serde(rename = "userId")]
    user_id: String,
    #[serde(rename = "planId")]
    plan_id: String,
}

#[derive(Debug, Deserialize)]
struct CheckoutResponse {
    payment_id: Option<String>,
    subscription_id: Option<String>,
    payment_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentResponse {
    status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DodoEnvironment;
    use buildfy_core::{Currency, PaymentEventKind, Price, Tier};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // base64("buildfy-test-signing-key")
    const SECRET: &str = "whsec_YnVpbGRmeS10ZXN0LXNpZ25pbmcta2V5";

    fn config(base_url: &str) -> DodoConfig {
        DodoConfig::new("sk_test", SECRET, DodoEnvironment::TestMode)
            .with_api_base_url(base_url)
            .with_product("pro", "pdt_pro")
            .with_product("lifetime", "pdt_life")
    }

    fn request(plan_id: &str) -> PaymentRequest {
        PaymentRequest {
            plan_id: plan_id.to_string(),
            user_id: "uid_7".to_string(),
            user_email: "linus@example.com".to_string(),
            user_name: "Linus".to_string(),
            phone: None,
        }
    }

    fn lifetime() -> Plan {
        Plan::new("lifetime", "Lifetime", Tier::Lifetime, Price::new(4999.0, Currency::INR))
    }

    fn pro() -> Plan {
        Plan::new("pro", "Pro", Tier::Pro, Price::new(2499.0, Currency::INR))
    }

    fn urls() -> ReturnUrls {
        ReturnUrls::new("https://buildfy.app", "https://api.buildfy.app")
    }

    #[tokio::test]
    async fn test_create_one_off_payment() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/payments"))
            .and(header("Authorization", "Bearer sk_test"))
            .and(body_partial_json(json!({
                "payment_link": true,
                "product_cart": [ { "product_id": "pdt_life", "quantity": 1 } ],
                "return_url": "https://buildfy.app/payment/success",
                "metadata": { "userId": "uid_7", "planId": "lifetime" },
                "billing": { "country": "IN" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "payment_id": "pay_123",
                "payment_link": "https://test.checkout.dodopayments.com/buy/pay_123",
                "total_amount": 499900
            })))
            .mount(&server)
            .await;

        let strategy = DodoStrategy::new(config(&server.uri())).unwrap();
        let link = strategy
            .create_payment(&request("lifetime"), &lifetime(), &urls())
            .await
            .unwrap();

        assert_eq!(link.provider, "dodo");
        assert_eq!(link.payment_id, "pay_123");
        assert_eq!(link.url, "https://test.checkout.dodopayments.com/buy/pay_123");
        assert!(link.form_fields.is_empty());
    }

    #[tokio::test]
    async fn test_create_recurring_uses_subscriptions() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/subscriptions"))
            .and(body_partial_json(json!({
                "product_id": "pdt_pro",
                "quantity": 1,
                "metadata": { "userId": "uid_7", "planId": "pro" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "subscription_id": "sub_9",
                "payment_id": "pay_9",
                "payment_link": "https://test.checkout.dodopayments.com/buy/sub_9"
            })))
            .mount(&server)
            .await;

        let strategy = DodoStrategy::new(config(&server.uri())).unwrap();
        let link = strategy
            .create_payment(&request("pro"), &pro(), &urls())
            .await
            .unwrap();

        assert_eq!(link.payment_id, "pay_9");
    }

    #[tokio::test]
    async fn test_create_without_product_mapping() {
        let strategy =
            DodoStrategy::new(DodoConfig::new("sk", SECRET, DodoEnvironment::TestMode)).unwrap();
        let result = strategy
            .create_payment(&request("lifetime"), &lifetime(), &urls())
            .await;

        assert!(matches!(result, Err(PaymentError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_create_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422).set_body_string("invalid product"))
            .mount(&server)
            .await;

        let strategy = DodoStrategy::new(config(&server.uri())).unwrap();
        let result = strategy
            .create_payment(&request("lifetime"), &lifetime(), &urls())
            .await;

        assert!(matches!(result, Err(PaymentError::ProviderError { .. })));
    }

    #[tokio::test]
    async fn test_verify_webhook() {
        let strategy = DodoStrategy::new(config("http://unused")).unwrap();
        let body = json!({
            "type": "payment.succeeded",
            "data": {
                "payment_id": "pay_123",
                "total_amount": 499900,
                "currency": "INR",
                "metadata": { "userId": "uid_7", "planId": "lifetime" }
            }
        })
        .to_string();
        let ts = Utc::now().timestamp();
        let sig = webhook::sign(SECRET, "msg_1", ts, body.as_bytes()).unwrap();
        let headers = WebhookHeaders::new()
            .with("Webhook-Id", "msg_1")
            .with("Webhook-Timestamp", ts.to_string())
            .with("Webhook-Signature", sig);

        let event = strategy
            .verify_webhook(body.as_bytes(), &headers)
            .await
            .unwrap();

        assert_eq!(event.kind, PaymentEventKind::PaymentSucceeded);
        assert_eq!(event.user_id.as_deref(), Some("uid_7"));
        assert_eq!(event.occurred_at.timestamp(), ts);
    }

    #[tokio::test]
    async fn test_verify_webhook_missing_headers() {
        let strategy = DodoStrategy::new(config("http://unused")).unwrap();
        let result = strategy
            .verify_webhook(b"{}", &WebhookHeaders::new().with("webhook-id", "msg_1"))
            .await;

        assert!(matches!(result, Err(PaymentError::WebhookVerificationFailed(_))));
    }

    #[tokio::test]
    async fn test_verify_webhook_bad_signature() {
        let strategy = DodoStrategy::new(config("http://unused")).unwrap();
        let headers = WebhookHeaders::new()
            .with("webhook-id", "msg_1")
            .with("webhook-timestamp", Utc::now().timestamp().to_string())
            .with("webhook-signature", "v1,AAAA");

        let result = strategy.verify_webhook(b"{}", &headers).await;
        assert!(matches!(result, Err(PaymentError::WebhookVerificationFailed(_))));
    }

    #[tokio::test]
    async fn test_payment_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/payments/pay_123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "payment_id": "pay_123",
                "status": "succeeded"
            })))
            .mount(&server)
            .await;

        let strategy = DodoStrategy::new(config(&server.uri())).unwrap();
        assert_eq!(
            strategy.payment_status("pay_123").await.unwrap(),
            PaymentStatus::Succeeded
        );
        assert!(matches!(
            strategy.payment_status(" ").await,
            Err(PaymentError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_payment_status_rejects_path_like_ids() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "succeeded" })))
            .mount(&server)
            .await;

        let strategy = DodoStrategy::new(config(&server.uri())).unwrap();
        for id in ["../customers", "pay_1/../../customers", "pay_1?limit=100", "pay_1#x", "pay 1", "%2e%2e"] {
            assert!(
                matches!(strategy.payment_status(id).await, Err(PaymentError::InvalidRequest(_))),
                "{} accepted",
                id
            );
        }
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_from_dodo(Some("succeeded")), PaymentStatus::Succeeded);
        assert_eq!(status_from_dodo(Some("failed")), PaymentStatus::Failed);
        assert_eq!(status_from_dodo(Some("requires_customer_action")), PaymentStatus::Pending);
        assert_eq!(status_from_dodo(None), PaymentStatus::Pending);
        assert_eq!(status_from_dodo(Some("weird")), PaymentStatus::Unknown);
    }
}
