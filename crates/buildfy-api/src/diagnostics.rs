//! # Diagnostics
//!
//! `/api/debug/env` reports which configuration variables are present and
//! well-formed (never their values). `/api/debug/connectivity` probes the
//! provider and store endpoints.

use crate::state::AppState;
use axum::{extract::State, Json};
use buildfy_dodo::{DodoEnvironment, REQUIRED_WEBHOOK_EVENTS};
use buildfy_payu::PayuMode;
use serde::Serialize;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{info, instrument};

/// Per-probe timeout
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// How a variable's value is checked
#[derive(Debug, Clone, Copy)]
pub enum Check {
    NonEmpty,
    Url,
    WebhookSecret,
    Port,
    OneOf(&'static [&'static str]),
}

impl Check {
    /// `None` when the value passes, else what is wrong with it
    pub fn problem(&self, value: &str) -> Option<String> {
        let value = value.trim();
        if value.is_empty() {
            return Some("empty".to_string());
        }
        match self {
            Check::NonEmpty => None,
            Check::Url => {
                let rest = value
                    .strip_prefix("https://")
                    .or_else(|| value.strip_prefix("http://"));
                match rest {
                    Some(host) if !host.is_empty() && !host.contains(char::is_whitespace) => None,
                    _ => Some("not an http(s) URL".to_string()),
                }
            }
            Check::WebhookSecret => {
                (!value.starts_with("whsec_")).then(|| "must start with whsec_".to_string())
            }
            Check::Port => value
                .parse::<u16>()
                .is_err()
                .then(|| "not a port number".to_string()),
            Check::OneOf(allowed) => (!allowed
                .iter()
                .any(|a| a.eq_ignore_ascii_case(value)))
            .then(|| format!("must be one of {}", allowed.join(", "))),
        }
    }
}

/// A configuration variable the service reads
#[derive(Debug, Clone, Copy)]
pub struct EnvVarSpec {
    pub name: &'static str,
    pub group: &'static str,
    pub required: bool,
    pub check: Check,
}

const fn var(name: &'static str, group: &'static str, required: bool, check: Check) -> EnvVarSpec {
    EnvVarSpec {
        name,
        group,
        required,
        check,
    }
}

/// Every variable the service reads
pub const ENV_VARS: &[EnvVarSpec] = &[
    var("PAYU_MERCHANT_KEY", "payu", true, Check::NonEmpty),
    var("PAYU_MERCHANT_SALT", "payu", true, Check::NonEmpty),
    var("PAYU_MODE", "payu", false, Check::OneOf(&["test", "sandbox", "live", "production"])),
    var("DODO_PAYMENTS_API_KEY", "dodo", true, Check::NonEmpty),
    var("DODO_PAYMENTS_WEBHOOK_SECRET", "dodo", true, Check::WebhookSecret),
    var("DODO_PAYMENTS_ENVIRONMENT", "dodo", false, Check::OneOf(&["test_mode", "live_mode", "test", "live"])),
    var("DODO_PAYMENTS_BASE_URL", "dodo", false, Check::Url),
    var("DODO_BILLING_COUNTRY", "dodo", false, Check::NonEmpty),
    var("DODO_PRODUCT_STANDARD", "dodo", true, Check::NonEmpty),
    var("DODO_PRODUCT_PRO", "dodo", true, Check::NonEmpty),
    var("DODO_PRODUCT_LIFETIME", "dodo", true, Check::NonEmpty),
    var("FIREBASE_PROJECT_ID", "firestore", false, Check::NonEmpty),
    var("FIRESTORE_ACCESS_TOKEN", "firestore", false, Check::NonEmpty),
    var("FIRESTORE_EMULATOR_HOST", "firestore", false, Check::NonEmpty),
    var("STORE_BACKEND", "app", false, Check::OneOf(&["memory", "firestore"])),
    var("HOST", "app", false, Check::NonEmpty),
    var("PORT", "app", false, Check::Port),
    var("API_BASE_URL", "app", true, Check::Url),
    var("FRONTEND_URL", "app", true, Check::Url),
    var("SITE_URL", "app", false, Check::Url),
    var("ENVIRONMENT", "app", false, Check::OneOf(&["development", "staging", "production"])),
    var("ADMIN_API_KEY", "app", false, Check::NonEmpty),
];

#[derive(Debug, Clone, Serialize)]
pub struct EnvVarStatus {
    pub name: &'static str,
    pub group: &'static str,
    pub required: bool,
    pub present: bool,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub problem: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnvSummary {
    pub ok: bool,
    pub missing_required: Vec<&'static str>,
    pub invalid: Vec<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnvReport {
    pub summary: EnvSummary,
    pub variables: Vec<EnvVarStatus>,
    /// Event types to enable on the Dodo webhook endpoint
    pub dodo_webhook_events: &'static [&'static str],
}

/// Check every variable in `ENV_VARS` against `lookup`
pub fn env_report(lookup: impl Fn(&str) -> Option<String>) -> EnvReport {
    let mut variables = Vec::with_capacity(ENV_VARS.len());
    let mut missing_required = Vec::new();
    let mut invalid = Vec::new();

    for spec in ENV_VARS {
        let status = match lookup(spec.name) {
            None => {
                if spec.required {
                    missing_required.push(spec.name);
                }
                EnvVarStatus {
                    name: spec.name,
                    group: spec.group,
                    required: spec.required,
                    present: false,
                    valid: !spec.required,
                    problem: spec.required.then(|| "missing".to_string()),
                }
            }
            Some(value) => {
                let problem = spec.check.problem(&value);
                if problem.is_some() {
                    invalid.push(spec.name);
                }
                EnvVarStatus {
                    name: spec.name,
                    group: spec.group,
                    required: spec.required,
                    present: true,
                    valid: problem.is_none(),
                    problem,
                }
            }
        };
        variables.push(status);
    }

    EnvReport {
        summary: EnvSummary {
            ok: missing_required.is_empty() && invalid.is_empty(),
            missing_required,
            invalid,
        },
        variables,
        dodo_webhook_events: REQUIRED_WEBHOOK_EVENTS,
    }
}

/// An endpoint to probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    pub name: String,
    pub url: String,
}

impl ProbeTarget {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeResult {
    pub name: String,
    pub url: String,
    pub reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectivityReport {
    pub ok: bool,
    pub targets: Vec<ProbeResult>,
}

/// Endpoints the configured providers and store talk to
pub fn default_targets(lookup: impl Fn(&str) -> Option<String>) -> Vec<ProbeTarget> {
    let payu_mode = lookup("PAYU_MODE")
        .and_then(|m| PayuMode::parse(&m))
        .unwrap_or(PayuMode::Test);
    let dodo_base = lookup("DODO_PAYMENTS_BASE_URL").unwrap_or_else(|| {
        lookup("DODO_PAYMENTS_ENVIRONMENT")
            .and_then(|e| DodoEnvironment::parse(&e))
            .unwrap_or(DodoEnvironment::TestMode)
            .base_url()
            .to_string()
    });
    let firestore = lookup("FIRESTORE_EMULATOR_HOST")
        .map(|host| format!("http://{}", host.trim()))
        .unwrap_or_else(|| "https://firestore.googleapis.com".to_string());

    vec![
        ProbeTarget::new("payu_checkout", payu_mode.payment_url()),
        ProbeTarget::new("payu_postservice", payu_mode.postservice_url()),
        ProbeTarget::new("dodo_api", dodo_base),
        ProbeTarget::new("firestore", firestore),
    ]
}

async fn probe(client: reqwest::Client, target: ProbeTarget) -> ProbeResult {
    let started = Instant::now();
    let outcome = client.get(&target.url).timeout(PROBE_TIMEOUT).send().await;
    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    match outcome {
        // any HTTP answer means the host is reachable
        Ok(response) => ProbeResult {
            name: target.name,
            url: target.url,
            reachable: true,
            status: Some(response.status().as_u16()),
            latency_ms,
            error: None,
        },
        Err(e) => ProbeResult {
            name: target.name,
            url: target.url,
            reachable: false,
            status: None,
            latency_ms,
            error: Some(if e.is_timeout() {
                format!("timed out after {}s", PROBE_TIMEOUT.as_secs())
            } else {
                e.to_string()
            }),
        },
    }
}

/// Probe all targets concurrently; results keep the input order
pub async fn connectivity_report(
    client: &reqwest::Client,
    targets: Vec<ProbeTarget>,
) -> ConnectivityReport {
    let mut probes = JoinSet::new();
    for (index, target) in targets.into_iter().enumerate() {
        let client = client.clone();
        probes.spawn(async move { (index, probe(client, target).await) });
    }

    let mut results = Vec::new();
    while let Some(joined) = probes.join_next().await {
        if let Ok(result) = joined {
            results.push(result);
        }
    }
    results.sort_by_key(|(index, _)| *index);

    let targets: Vec<ProbeResult> = results.into_iter().map(|(_, r)| r).collect();
    ConnectivityReport {
        ok: targets.iter().all(|t| t.reachable),
        targets,
    }
}

/// GET /api/debug/env
#[instrument]
pub async fn debug_env() -> Json<EnvReport> {
    let report = env_report(|name| std::env::var(name).ok());
    info!(
        "Env report: ok={}, missing={:?}, invalid={:?}",
        report.summary.ok, report.summary.missing_required, report.summary.invalid
    );
    Json(report)
}

/// GET /api/debug/connectivity
#[instrument(skip(state))]
pub async fn debug_connectivity(State(state): State<AppState>) -> Json<ConnectivityReport> {
    let targets = default_targets(|name| std::env::var(name).ok());
    Json(connectivity_report(&state.http_client, targets).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_checks() {
        assert!(Check::Url.problem("https://api.buildfy.app").is_none());
        assert!(Check::Url.problem("api.buildfy.app").is_some());
        assert!(Check::WebhookSecret.problem("whsec_abc").is_none());
        assert!(Check::WebhookSecret.problem("abc").is_some());
        assert!(Check::Port.problem("8080").is_none());
        assert!(Check::Port.problem("80a").is_some());
        assert!(Check::OneOf(&["test", "live"]).problem("LIVE").is_none());
        assert_eq!(
            Check::OneOf(&["test", "live"]).problem("prod").as_deref(),
            Some("must be one of test, live")
        );
        assert_eq!(Check::NonEmpty.problem("  ").as_deref(), Some("empty"));
    }

    #[test]
    fn test_env_report_all_required_present() {
        let required: Vec<(&str, &str)> = ENV_VARS
            .iter()
            .filter(|spec| spec.required)
            .map(|spec| {
                let value = match spec.check {
                    Check::Url => "https://buildfy.app",
                    Check::WebhookSecret => "whsec_abc",
                    _ => "value",
                };
                (spec.name, value)
            })
            .collect();

        let report = env_report(lookup(&required));
        assert!(report.summary.ok);
        assert_eq!(report.variables.len(), ENV_VARS.len());
    }

    #[test]
    fn test_env_report_problems() {
        let report = env_report(lookup(&[
            ("DODO_PAYMENTS_WEBHOOK_SECRET", "plain-secret"),
            ("PORT", "eighty"),
        ]));

        assert!(!report.summary.ok);
        assert!(report.summary.missing_required.contains(&"PAYU_MERCHANT_KEY"));
        assert_eq!(
            report.summary.invalid,
            vec!["DODO_PAYMENTS_WEBHOOK_SECRET", "PORT"]
        );

        let secret = report
            .variables
            .iter()
            .find(|v| v.name == "DODO_PAYMENTS_WEBHOOK_SECRET")
            .unwrap();
        assert!(secret.present);
        assert!(!secret.valid);

        let optional = report.variables.iter().find(|v| v.name == "HOST").unwrap();
        assert!(!optional.present);
        assert!(optional.valid);
    }

    #[test]
    fn test_report_never_contains_values() {
        let report = env_report(lookup(&[("PAYU_MERCHANT_SALT", "very-secret-salt")]));
        let json = serde_json::to_string(&report).unwrap();
        assert!(!json.contains("very-secret-salt"));
    }

    #[test]
    fn test_env_report_lists_dodo_webhook_events() {
        let report = env_report(lookup(&[]));
        let json = serde_json::to_value(&report).unwrap();
        let events: Vec<&str> = json["dodo_webhook_events"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|v| v.as_str())
            .collect();
        assert!(events.contains(&"payment.succeeded"));
        assert!(events.contains(&"subscription.renewed"));
        assert!(events.contains(&"refund.succeeded"));
        assert_eq!(events.len(), REQUIRED_WEBHOOK_EVENTS.len());
    }

    #[test]
    fn test_default_targets() {
        let targets = default_targets(lookup(&[
            ("PAYU_MODE", "live"),
            ("FIRESTORE_EMULATOR_HOST", "127.0.0.1:8085"),
        ]));
        assert_eq!(targets[0].url, "https://secure.payu.in/_payment");
        assert_eq!(targets[2].url, "https://test.dodopayments.com");
        assert_eq!(targets[3].url, "http://127.0.0.1:8085");
    }

    #[tokio::test]
    async fn test_connectivity_report() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let targets = vec![
            ProbeTarget::new("mock", server.uri()),
            // nothing listens on port 9 locally
            ProbeTarget::new("closed", "http://127.0.0.1:9"),
        ];
        let report = connectivity_report(&reqwest::Client::new(), targets).await;

        assert!(!report.ok);
        assert_eq!(report.targets[0].name, "mock");
        assert!(report.targets[0].reachable);
        assert_eq!(report.targets[0].status, Some(404));
        assert_eq!(report.targets[1].name, "closed");
        assert!(!report.targets[1].reachable);
        assert!(report.targets[1].error.is_some());
    }
}
