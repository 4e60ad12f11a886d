//! Single-request transport: header assembly, retries with backoff,
//! response capture, and redaction.

use std::collections::BTreeMap;
use std::time::Duration;

use log::{debug, warn};
use rand::Rng;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::time::Instant;

use crate::config::{PrivacyLevel, ScopeConfig, Timeouts};
use crate::error::{Error, Result};
use crate::models::{
    Method, ProbeErrorKind, RequestSnapshot, SnapshotBody, SnapshotError, SnapshotRequest,
    SnapshotResponse, Timings,
};

use super::gate::{ConcurrencyGate, RequestBudget};
use super::rate_limit::RateLimiter;
use super::redact::{redact_headers, sanitize_snippet};

/// Statuses worth retrying with backoff.
const RETRYABLE_STATUS: [u16; 5] = [429, 500, 502, 503, 504];

/// Response headers captured into snapshots.
const HEADER_WHITELIST: [&str; 6] = [
    "content-type",
    "content-length",
    "server",
    "date",
    "cache-control",
    "location",
];

/// Snippet length cap before redaction.
const SNIPPET_CAP: usize = 4096;

/// Effective credential attached to a single request.
#[derive(Debug, Clone)]
pub enum Credential {
    Bearer { header: String, token: String },
    Header { header: String, value: String },
    Basic { username: String, password: String },
    Cookie { cookie: String },
}

/// Transport configuration, usually derived from the scope's request
/// policy.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub timeouts: Timeouts,
    pub max_rps: u32,
    pub concurrency: usize,
    pub per_host_concurrency: usize,
    pub global_jitter_ms: u64,
    pub user_agent: String,
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    pub allow_redirects: bool,
    pub verify_tls: bool,
    pub hard_request_budget: u64,
    pub privacy_level: PrivacyLevel,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeouts: Timeouts::default(),
            max_rps: 2,
            concurrency: 4,
            per_host_concurrency: 2,
            global_jitter_ms: 60,
            user_agent: format!("amac/{}", env!("CARGO_PKG_VERSION")),
            max_attempts: 3,
            backoff_base: Duration::from_millis(500),
            backoff_cap: Duration::from_secs(4),
            allow_redirects: false,
            verify_tls: true,
            hard_request_budget: 0,
            privacy_level: PrivacyLevel::Minimal,
        }
    }
}

impl ClientOptions {
    pub fn from_scope(scope: &ScopeConfig) -> Self {
        let policy = &scope.request_policy;
        Self {
            timeouts: scope.timeouts.clone(),
            max_rps: policy.max_rps,
            concurrency: policy.concurrency,
            per_host_concurrency: policy.per_host_concurrency,
            global_jitter_ms: policy.global_jitter_ms,
            backoff_cap: Duration::from_secs_f64(policy.backoff_cap_s.max(0.1)),
            allow_redirects: policy.allow_redirects,
            verify_tls: policy.verify_tls,
            hard_request_budget: policy.hard_request_budget,
            privacy_level: scope.evidence.privacy_level,
            ..Default::default()
        }
    }
}

/// Rate-limited, budgeted, retrying HTTP client used for every probe
/// request.
pub struct HttpClient {
    http: reqwest::Client,
    limiter: RateLimiter,
    gate: ConcurrencyGate,
    budget: RequestBudget,
    options: ClientOptions,
}

impl HttpClient {
    pub fn new(options: ClientOptions) -> Result<Self> {
        let redirect = if options.allow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        };
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(options.timeouts.connect))
            .timeout(Duration::from_secs(options.timeouts.read))
            .user_agent(options.user_agent.clone())
            .redirect(redirect)
            .danger_accept_invalid_certs(!options.verify_tls)
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;

        Ok(Self {
            http,
            limiter: RateLimiter::new(options.max_rps),
            gate: ConcurrencyGate::new(options.concurrency, options.per_host_concurrency),
            budget: RequestBudget::new(options.hard_request_budget),
            options,
        })
    }

    /// Perform one request attempt sequence and capture it as a snapshot.
    ///
    /// Never returns an `Err`: every failure mode is recorded inside the
    /// snapshot so the orchestrator can keep going.
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        credential: Option<&Credential>,
        body: Option<&Value>,
        content_type: Option<&str>,
    ) -> RequestSnapshot {
        if !self.budget.try_consume() {
            return self.error_snapshot(
                method,
                url,
                ProbeErrorKind::BudgetExceeded,
                "Hard request budget exhausted.".to_string(),
                0.0,
                0,
            );
        }

        let headers = assemble_headers(credential);

        let host = match reqwest::Url::parse(url) {
            Ok(u) => u.host_str().unwrap_or_default().to_lowercase(),
            Err(e) => {
                return self.error_snapshot(
                    method,
                    url,
                    ProbeErrorKind::TransportError,
                    format!("invalid URL: {}", e),
                    0.0,
                    0,
                );
            }
        };

        // both gates are held across all attempts
        let _permit = self.gate.admit(&host).await;

        let start = Instant::now();
        let mut attempts: u32 = 0;
        let mut last_error: Option<String> = None;
        let mut response: Option<reqwest::Response> = None;

        while attempts < self.options.max_attempts {
            attempts += 1;

            if self.options.global_jitter_ms > 0 {
                let jitter = rand::thread_rng().gen_range(0..=self.options.global_jitter_ms);
                tokio::time::sleep(Duration::from_millis(jitter)).await;
            }

            self.limiter.acquire().await;

            let request = self.build_request(method, url, &headers, credential, body, content_type);
            match request.send().await {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if RETRYABLE_STATUS.contains(&status) && attempts < self.options.max_attempts {
                        debug!("{} {} returned {}, retrying", method, url, status);
                        self.sleep_backoff(attempts).await;
                        continue;
                    }
                    response = Some(resp);
                    break;
                }
                Err(e) => {
                    warn!("{} {} attempt {} failed: {}", method, url, attempts, e);
                    last_error = Some(e.to_string());
                    if attempts < self.options.max_attempts {
                        self.sleep_backoff(attempts).await;
                        continue;
                    }
                    break;
                }
            }
        }

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        match response {
            Some(resp) => {
                self.snapshot_response(method, url, headers, body, resp, elapsed_ms, attempts)
                    .await
            }
            None => self.error_snapshot(
                method,
                url,
                ProbeErrorKind::TransportError,
                last_error.unwrap_or_else(|| "request failed without response".to_string()),
                elapsed_ms,
                attempts,
            ),
        }
    }

    fn build_request(
        &self,
        method: Method,
        url: &str,
        headers: &BTreeMap<String, String>,
        credential: Option<&Credential>,
        body: Option<&Value>,
        content_type: Option<&str>,
    ) -> reqwest::RequestBuilder {
        let mut request = self.http.request(method.into(), url);
        for (k, v) in headers {
            request = request.header(k, v);
        }
        // basic auth rides the native mechanism instead of a hand-built header
        if let Some(Credential::Basic { username, password }) = credential {
            request = request.basic_auth(username, Some(password));
        }
        if let Some(body) = body {
            request = match content_type {
                Some("application/x-www-form-urlencoded") => request.form(&form_pairs(body)),
                Some(ct) if ct != "application/json" => request
                    .header("Content-Type", ct)
                    .body(body.to_string()),
                _ => request.json(body),
            };
        }
        request
    }

    /// Exponential backoff with a cap plus up to 20% extra jitter.
    async fn sleep_backoff(&self, attempt: u32) {
        let base = self
            .options
            .backoff_base
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
            .min(self.options.backoff_cap);
        let jitter = base.mul_f64(rand::thread_rng().gen_range(0.0..0.2));
        tokio::time::sleep(base + jitter).await;
    }

    async fn snapshot_response(
        &self,
        method: Method,
        url: &str,
        req_headers: BTreeMap<String, String>,
        req_body: Option<&Value>,
        resp: reqwest::Response,
        elapsed_ms: f64,
        attempts: u32,
    ) -> RequestSnapshot {
        let status = resp.status().as_u16();

        let mut resp_headers = BTreeMap::new();
        for key in HEADER_WHITELIST {
            if let Some(value) = resp.headers().get(key).and_then(|v| v.to_str().ok()) {
                resp_headers.insert(key.to_string(), value.to_string());
            }
        }
        let is_json = resp_headers
            .get("content-type")
            .map(|ct| ct.contains("json"))
            .unwrap_or(false);

        // HEAD responses legitimately have no body
        let bytes = resp.bytes().await.unwrap_or_default();
        let size = bytes.len();
        let sha256 = if size > 0 {
            let mut hasher = Sha256::new();
            hasher.update(&bytes);
            Some(format!("{:x}", hasher.finalize()))
        } else {
            None
        };

        let mut snippet = String::new();
        let mut json_keys = None;
        if size > 0 {
            let text: String = String::from_utf8_lossy(&bytes)
                .chars()
                .take(SNIPPET_CAP)
                .collect();
            snippet = sanitize_snippet(&text, self.options.privacy_level);

            if is_json {
                json_keys = top_level_keys(&bytes);
            }
        }

        RequestSnapshot {
            request: SnapshotRequest {
                method,
                url: url.to_string(),
                headers: redact_headers(&req_headers),
                body: req_body.cloned(),
            },
            response: Some(SnapshotResponse {
                status,
                headers: resp_headers,
                body: SnapshotBody {
                    size,
                    sha256,
                    snippet,
                    json_keys,
                },
            }),
            error: None,
            timings: Timings {
                elapsed_ms,
                attempts,
            },
        }
    }

    fn error_snapshot(
        &self,
        method: Method,
        url: &str,
        kind: ProbeErrorKind,
        message: String,
        elapsed_ms: f64,
        attempts: u32,
    ) -> RequestSnapshot {
        RequestSnapshot {
            request: SnapshotRequest {
                method,
                url: url.to_string(),
                headers: BTreeMap::new(),
                body: None,
            },
            response: None,
            error: Some(SnapshotError { kind, message }),
            timings: Timings {
                elapsed_ms,
                attempts,
            },
        }
    }
}

/// Identity-derived request headers. Basic auth is attached natively at
/// send time; cookies merge with any existing `Cookie` value.
fn assemble_headers(credential: Option<&Credential>) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    match credential {
        Some(Credential::Bearer { header, token }) => {
            headers.insert(header.clone(), format!("Bearer {}", token));
        }
        Some(Credential::Header { header, value }) => {
            headers.insert(header.clone(), value.clone());
        }
        Some(Credential::Cookie { cookie }) => {
            let merged = match headers.remove("Cookie") {
                Some(existing) => format!("{}; {}", existing, cookie),
                None => cookie.clone(),
            };
            headers.insert("Cookie".to_string(), merged);
        }
        Some(Credential::Basic { .. }) | None => {}
    }
    headers
}

/// Flatten a JSON object into form fields; scalars are stringified.
fn form_pairs(body: &Value) -> Vec<(String, String)> {
    match body.as_object() {
        Some(map) => map
            .iter()
            .map(|(k, v)| {
                let value = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), value)
            })
            .collect(),
        None => Vec::new(),
    }
}

/// Sorted top-level keys of a JSON object (or of the first element of a
/// JSON array), for downstream diffing.
fn top_level_keys(bytes: &[u8]) -> Option<Vec<String>> {
    let parsed: Value = serde_json::from_slice(bytes).ok()?;
    let obj = match &parsed {
        Value::Object(map) => Some(map),
        Value::Array(items) => items.first().and_then(Value::as_object),
        _ => None,
    }?;
    let mut keys: Vec<String> = obj.keys().cloned().collect();
    keys.sort();
    Some(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_options() -> ClientOptions {
        ClientOptions {
            max_rps: 0,
            global_jitter_ms: 0,
            backoff_base: Duration::from_millis(5),
            backoff_cap: Duration::from_millis(20),
            ..Default::default()
        }
    }

    #[test]
    fn test_assemble_bearer_headers() {
        let cred = Credential::Bearer {
            header: "Authorization".to_string(),
            token: "tok".to_string(),
        };
        let headers = assemble_headers(Some(&cred));
        assert_eq!(headers["Authorization"], "Bearer tok");
    }

    #[test]
    fn test_assemble_custom_header() {
        let cred = Credential::Header {
            header: "X-Api-Key".to_string(),
            value: "k".to_string(),
        };
        let headers = assemble_headers(Some(&cred));
        assert_eq!(headers["X-Api-Key"], "k");
    }

    #[test]
    fn test_assemble_cookie_header() {
        let cred = Credential::Cookie {
            cookie: "sid=abc".to_string(),
        };
        let headers = assemble_headers(Some(&cred));
        assert_eq!(headers["Cookie"], "sid=abc");
    }

    #[test]
    fn test_basic_has_no_handmade_header() {
        let cred = Credential::Basic {
            username: "u".to_string(),
            password: "p".to_string(),
        };
        assert!(assemble_headers(Some(&cred)).is_empty());
    }

    #[test]
    fn test_form_pairs_stringify() {
        let body = json!({"name": "alice", "count": 3, "flag": true});
        let mut pairs = form_pairs(&body);
        pairs.sort();
        assert_eq!(
            pairs,
            vec![
                ("count".to_string(), "3".to_string()),
                ("flag".to_string(), "true".to_string()),
                ("name".to_string(), "alice".to_string()),
            ]
        );
    }

    #[test]
    fn test_top_level_keys() {
        assert_eq!(
            top_level_keys(br#"{"b": 1, "a": 2}"#),
            Some(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(
            top_level_keys(br#"[{"z": 1, "y": 2}]"#),
            Some(vec!["y".to_string(), "z".to_string()])
        );
        assert_eq!(top_level_keys(b"[1, 2]"), None);
        assert_eq!(top_level_keys(b"not json"), None);
    }

    #[tokio::test]
    async fn test_successful_request_snapshot() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/ok")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_header("x-internal", "hidden")
            .with_body(r#"{"hello": "world", "aardvark": 1}"#)
            .create_async()
            .await;

        let client = HttpClient::new(test_options()).unwrap();
        let url = format!("{}/ok", server.url());
        let snap = client.request(Method::Get, &url, None, None, None).await;

        let resp = snap.response.as_ref().unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(snap.timings.attempts, 1);
        assert!(resp.body.size > 0);
        assert!(resp.body.sha256.is_some());
        assert_eq!(
            resp.body.json_keys,
            Some(vec!["aardvark".to_string(), "hello".to_string()])
        );
        // whitelist only
        assert!(resp.headers.contains_key("content-type"));
        assert!(!resp.headers.contains_key("x-internal"));
    }

    #[tokio::test]
    async fn test_persistent_503_exhausts_attempts() {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("GET", "/down")
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let client = HttpClient::new(test_options()).unwrap();
        let url = format!("{}/down", server.url());
        let snap = client.request(Method::Get, &url, None, None, None).await;

        m.assert_async().await;
        assert_eq!(snap.timings.attempts, 3);
        assert_eq!(snap.status(), Some(503));
    }

    #[tokio::test]
    async fn test_non_retryable_status_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("GET", "/missing")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let client = HttpClient::new(test_options()).unwrap();
        let url = format!("{}/missing", server.url());
        let snap = client.request(Method::Get, &url, None, None, None).await;

        m.assert_async().await;
        assert_eq!(snap.status(), Some(404));
        assert_eq!(snap.timings.attempts, 1);
    }

    #[tokio::test]
    async fn test_budget_short_circuits() {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("GET", "/once")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let options = ClientOptions {
            hard_request_budget: 1,
            ..test_options()
        };
        let client = HttpClient::new(options).unwrap();
        let url = format!("{}/once", server.url());

        let first = client.request(Method::Get, &url, None, None, None).await;
        assert_eq!(first.status(), Some(200));

        let second = client.request(Method::Get, &url, None, None, None).await;
        assert!(first.error.is_none());
        let err = second.error.as_ref().unwrap();
        assert_eq!(err.kind, ProbeErrorKind::BudgetExceeded);
        assert_eq!(second.timings.attempts, 0);

        m.assert_async().await;
    }

    #[tokio::test]
    async fn test_transport_error_recorded() {
        // nothing listens on port 1
        let client = HttpClient::new(ClientOptions {
            timeouts: Timeouts { connect: 1, read: 1 },
            ..test_options()
        })
        .unwrap();
        let snap = client
            .request(Method::Get, "http://127.0.0.1:1/unreachable", None, None, None)
            .await;

        let err = snap.error.as_ref().unwrap();
        assert_eq!(err.kind, ProbeErrorKind::TransportError);
        assert_eq!(snap.timings.attempts, 3);
    }

    #[tokio::test]
    async fn test_request_headers_redacted_in_snapshot() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/auth")
            .with_status(200)
            .create_async()
            .await;

        let client = HttpClient::new(test_options()).unwrap();
        let cred = Credential::Bearer {
            header: "Authorization".to_string(),
            token: "super-secret".to_string(),
        };
        let url = format!("{}/auth", server.url());
        let snap = client
            .request(Method::Get, &url, Some(&cred), None, None)
            .await;

        assert_eq!(snap.request.headers["Authorization"], "<redacted>");
    }

    #[tokio::test]
    async fn test_json_body_sent() {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("POST", "/items")
            .match_header("content-type", "application/json")
            .match_body(mockito::Matcher::Json(json!({"name": "alice"})))
            .with_status(201)
            .create_async()
            .await;

        let client = HttpClient::new(test_options()).unwrap();
        let url = format!("{}/items", server.url());
        let body = json!({"name": "alice"});
        let snap = client
            .request(
                Method::Post,
                &url,
                None,
                Some(&body),
                Some("application/json"),
            )
            .await;

        m.assert_async().await;
        assert_eq!(snap.status(), Some(201));
        assert_eq!(snap.request.body, Some(body));
    }

    #[tokio::test]
    async fn test_form_body_sent() {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("POST", "/form")
            .match_header("content-type", "application/x-www-form-urlencoded")
            .with_status(200)
            .create_async()
            .await;

        let client = HttpClient::new(test_options()).unwrap();
        let url = format!("{}/form", server.url());
        let body = json!({"user": "alice"});
        let snap = client
            .request(
                Method::Post,
                &url,
                None,
                Some(&body),
                Some("application/x-www-form-urlencoded"),
            )
            .await;

        m.assert_async().await;
        assert_eq!(snap.status(), Some(200));
    }

    #[tokio::test]
    async fn test_snippet_redaction_applied() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/pii")
            .with_status(200)
            .with_body("contact: alice@example.com")
            .create_async()
            .await;

        let client = HttpClient::new(ClientOptions {
            privacy_level: PrivacyLevel::Minimal,
            ..test_options()
        })
        .unwrap();
        let url = format!("{}/pii", server.url());
        let snap = client.request(Method::Get, &url, None, None, None).await;

        let snippet = &snap.response.unwrap().body.snippet;
        assert!(snippet.contains("<email>"));
        assert!(!snippet.contains("alice@example.com"));
    }
}
