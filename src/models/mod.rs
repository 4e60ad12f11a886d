//! Core data model: endpoints, snapshots, and summary rows

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// HTTP methods the mapper can emit.
///
/// GET and HEAD are always mapped; the rest only when the request policy
/// permits non-safe methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
        }
    }

    /// Parse an OpenAPI path-item key (`get`, `post`, ...) or an uppercase
    /// method name.
    pub fn parse(s: &str) -> Option<Method> {
        match s.to_ascii_lowercase().as_str() {
            "get" => Some(Method::Get),
            "head" => Some(Method::Head),
            "post" => Some(Method::Post),
            "put" => Some(Method::Put),
            "patch" => Some(Method::Patch),
            "delete" => Some(Method::Delete),
            "options" => Some(Method::Options),
            _ => None,
        }
    }

    pub fn is_safe(&self) -> bool {
        matches!(self, Method::Get | Method::Head)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(m: Method) -> Self {
        match m {
            Method::Get => reqwest::Method::GET,
            Method::Head => reqwest::Method::HEAD,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
            Method::Options => reqwest::Method::OPTIONS,
        }
    }
}

/// Synthesized request body attached to an endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointExtra {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl EndpointExtra {
    pub fn is_empty(&self) -> bool {
        self.body.is_none() && self.content_type.is_none()
    }
}

/// One concrete, in-scope request plan derived from an OpenAPI operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    pub method: Method,

    /// Fully resolved absolute URL including sampled path/query parameters.
    pub url: String,

    /// Whether the spec declares auth for this operation. `None` = the
    /// document is silent at every level.
    #[serde(default)]
    pub requires_auth: Option<bool>,

    /// Original templated path like `/users/{id}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,

    #[serde(default, skip_serializing_if = "EndpointExtra::is_empty")]
    pub extra: EndpointExtra,
}

/// Ordered, deduplicated set of endpoints produced by the mapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointSet {
    pub generated_by: String,
    pub version: String,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

impl EndpointSet {
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        Self {
            generated_by: "amac".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            endpoints,
        }
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Request snapshots
// ---------------------------------------------------------------------------

/// Classification of a failed request attempt sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeErrorKind {
    /// Timeout or connection failure after exhausting retries.
    TransportError,
    /// The hard request budget was already consumed; no I/O attempted.
    BudgetExceeded,
    /// Credential resolution or refresh failed for this identity.
    AuthFlow,
}

impl ProbeErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeErrorKind::TransportError => "transport_error",
            ProbeErrorKind::BudgetExceeded => "budget_exceeded",
            ProbeErrorKind::AuthFlow => "auth_flow",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRequest {
    pub method: Method,
    pub url: String,
    /// Request headers with credential-bearing values replaced by
    /// `<redacted>`.
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotBody {
    pub size: usize,
    pub sha256: Option<String>,
    pub snippet: String,
    /// Sorted top-level keys when the response was a JSON object (or the
    /// keys of the first element of a JSON array), for downstream diffing.
    pub json_keys: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotResponse {
    pub status: u16,
    /// Whitelisted subset of response headers.
    pub headers: BTreeMap<String, String>,
    pub body: SnapshotBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotError {
    pub kind: ProbeErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timings {
    pub elapsed_ms: f64,
    pub attempts: u32,
}

/// Immutable record of one HTTP exchange attempt sequence.
///
/// Exactly one of `response` / `error` is present. Written once per
/// (endpoint, variant) pair and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestSnapshot {
    pub request: SnapshotRequest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<SnapshotResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<SnapshotError>,
    pub timings: Timings,
}

impl RequestSnapshot {
    pub fn status(&self) -> Option<u16> {
        self.response.as_ref().map(|r| r.status)
    }

    pub fn body_size(&self) -> Option<usize> {
        self.response.as_ref().map(|r| r.body.size)
    }

    pub fn error_text(&self) -> Option<String> {
        self.error
            .as_ref()
            .map(|e| format!("{}: {}", e.kind.as_str(), e.message))
    }
}

// ---------------------------------------------------------------------------
// Summary rows
// ---------------------------------------------------------------------------

/// Outcome of one identity (or no-auth) against one endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantResult {
    pub status: Option<u16>,
    pub size: Option<usize>,
    pub error: Option<String>,
}

impl VariantResult {
    pub fn from_snapshot(snap: &RequestSnapshot) -> Self {
        Self {
            status: snap.status(),
            size: snap.body_size(),
            error: snap.error_text(),
        }
    }
}

/// Legacy per-endpoint row: no-auth plus the first identity only, kept for
/// backward-compatible consumers of summary.json.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryRow {
    pub index: usize,
    pub method: Method,
    pub url: String,
    pub requires_auth: Option<bool>,
    pub noauth_status: Option<u16>,
    pub auth_name: Option<String>,
    pub auth_status: Option<u16>,
    pub noauth_size: Option<usize>,
    pub auth_size: Option<usize>,
    pub notes: Option<String>,
}

/// Full RBAC-matrix row: every identity's outcome, keyed by identity name
/// with `"noauth"` reserved for the unauthenticated variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixRow {
    pub index: usize,
    pub method: Method,
    pub url: String,
    pub requires_auth: Option<bool>,
    pub variants: BTreeMap<String, VariantResult>,
}

/// Top-level summary.json payload for one probe run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub version: String,
    pub endpoints: usize,
    pub auth_used: Vec<String>,
    pub rows: Vec<SummaryRow>,
    pub matrix: Vec<MatrixRow>,
    pub dry_run: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planned_requests: Option<usize>,
}
