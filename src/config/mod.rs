//! Configuration management: scope.yml and auth.yml

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

pub mod scopes;

pub use scopes::{assert_urls_in_scope, choose_base_urls, url_in_scope, url_path_allowed};

/// How much PII redaction is applied to captured response snippets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyLevel {
    None,
    Minimal,
    Strict,
}

impl Default for PrivacyLevel {
    fn default() -> Self {
        PrivacyLevel::Minimal
    }
}

/// Evidence capture policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvidencePolicy {
    #[serde(default)]
    pub privacy_level: PrivacyLevel,
}

/// Rate, concurrency, and method policy for a probe run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestPolicy {
    /// If true, only GET/HEAD are mapped and probed.
    #[serde(default = "default_true")]
    pub safe_methods_only: bool,

    /// Additional methods (POST, PUT, ...) mapped when
    /// `safe_methods_only` is false.
    #[serde(default)]
    pub non_safe_methods: Vec<String>,

    /// Maximum requests per second across all hosts. 0 = unlimited.
    #[serde(default = "default_max_rps")]
    pub max_rps: u32,

    /// Maximum in-flight requests (global).
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Maximum in-flight requests per host.
    #[serde(default = "default_per_host_concurrency")]
    pub per_host_concurrency: usize,

    /// Extra random sleep [0..jitter] ms before each send.
    #[serde(default = "default_jitter_ms")]
    pub global_jitter_ms: u64,

    /// Upper cap in seconds for exponential backoff sleeps.
    #[serde(default = "default_backoff_cap")]
    pub backoff_cap_s: f64,

    #[serde(default)]
    pub allow_redirects: bool,

    #[serde(default = "default_true")]
    pub verify_tls: bool,

    /// Hard cap on total requests this run (0 = unlimited).
    #[serde(default)]
    pub hard_request_budget: u64,
}

fn default_true() -> bool {
    true
}

fn default_max_rps() -> u32 {
    2
}

fn default_concurrency() -> usize {
    4
}

fn default_per_host_concurrency() -> usize {
    2
}

fn default_jitter_ms() -> u64 {
    60
}

fn default_backoff_cap() -> f64 {
    4.0
}

impl Default for RequestPolicy {
    fn default() -> Self {
        Self {
            safe_methods_only: true,
            non_safe_methods: Vec::new(),
            max_rps: default_max_rps(),
            concurrency: default_concurrency(),
            per_host_concurrency: default_per_host_concurrency(),
            global_jitter_ms: default_jitter_ms(),
            backoff_cap_s: default_backoff_cap(),
            allow_redirects: false,
            verify_tls: true,
            hard_request_budget: 0,
        }
    }
}

/// Connect/read timeouts in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timeouts {
    #[serde(default = "default_connect_timeout")]
    pub connect: u64,
    #[serde(default = "default_read_timeout")]
    pub read: u64,
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_read_timeout() -> u64 {
    15
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: default_connect_timeout(),
            read: default_read_timeout(),
        }
    }
}

/// Path allow/deny patterns. Each entry is a glob, or a regex when
/// prefixed with `re:`. Deny is evaluated before allow; an empty allow
/// list allows everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathPolicy {
    #[serde(default)]
    pub allow_paths: Vec<String>,
    #[serde(default)]
    pub deny_paths: Vec<String>,
}

/// Validated scope policy: which hosts and paths may be probed, and how
/// aggressively.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScopeConfig {
    /// Host patterns allowed for probing. `*.domain` matches subdomains
    /// but not the bare domain.
    #[serde(default)]
    pub allowed: Vec<String>,

    /// Base URLs used when the OpenAPI document declares no servers.
    #[serde(default)]
    pub base_urls: Vec<String>,

    /// Host patterns denied regardless of `allowed`.
    #[serde(default)]
    pub denied: Vec<String>,

    #[serde(default)]
    pub path_policy: PathPolicy,

    #[serde(default)]
    pub request_policy: RequestPolicy,

    #[serde(default)]
    pub timeouts: Timeouts,

    #[serde(default)]
    pub evidence: EvidencePolicy,
}

impl ScopeConfig {
    /// Host entries are matched lowercased; normalize once at load.
    fn normalize(&mut self) {
        for h in self.allowed.iter_mut().chain(self.denied.iter_mut()) {
            *h = h.trim().to_lowercase();
        }
    }

    fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.allowed.is_empty() && self.base_urls.is_empty() {
            return Err(ConfigError::Invalid(
                "scope.yml must specify at least one of `allowed` hosts or `base_urls`"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Auth configuration
// ---------------------------------------------------------------------------

/// Credential flavor of a declared identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    Bearer,
    Header,
    Basic,
    Cookie,
    Oauth2,
    FormLogin,
}

/// Supported OAuth2 grant types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    ClientCredentials,
    Password,
}

/// One declarative identity from auth.yml. Immutable configuration; at
/// run start each is resolved into an effective bearer/cookie credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthScheme {
    pub name: String,
    #[serde(rename = "type")]
    pub auth_type: AuthType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    // oauth2
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant_type: Option<GrantType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    // form_login
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_field: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_fields: BTreeMap<String, serde_json::Value>,
}

impl AuthScheme {
    /// Per-type required-field validation, applied at load time.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let missing = |what: &str| {
            ConfigError::Invalid(format!(
                "auth scheme '{}' ({:?}): {}",
                self.name, self.auth_type, what
            ))
        };

        match self.auth_type {
            AuthType::Bearer => {
                if self.token.is_none() {
                    return Err(missing("bearer auth requires `token`"));
                }
            }
            AuthType::Cookie => {
                if self.cookie.is_none() {
                    return Err(missing("cookie auth requires `cookie`"));
                }
            }
            AuthType::Basic => {
                if self.username.is_none() || self.password.is_none() {
                    return Err(missing("basic auth requires `username` and `password`"));
                }
            }
            AuthType::Header => {
                if self.header.is_none() || self.token.is_none() {
                    return Err(missing("header auth requires `header` and `token`"));
                }
            }
            AuthType::Oauth2 => {
                if self.token_url.is_none() {
                    return Err(missing("oauth2 requires `token_url`"));
                }
                let Some(grant) = self.grant_type else {
                    return Err(missing(
                        "oauth2 grant_type must be client_credentials or password",
                    ));
                };
                if self.client_id.is_none() || self.client_secret.is_none() {
                    return Err(missing("oauth2 requires client_id and client_secret"));
                }
                if grant == GrantType::Password
                    && (self.username.is_none() || self.password.is_none())
                {
                    return Err(missing(
                        "oauth2 password grant requires username and password",
                    ));
                }
            }
            AuthType::FormLogin => {
                if self.login_url.is_none()
                    || self.username_field.is_none()
                    || self.password_field.is_none()
                    || self.username.is_none()
                    || self.password.is_none()
                {
                    return Err(missing(
                        "form_login requires login_url, username_field, password_field, username, password",
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Ordered identity list from auth.yml.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub auth_schemes: Vec<AuthScheme>,
}

// ---------------------------------------------------------------------------
// Loaders
// ---------------------------------------------------------------------------

fn read_yaml(path: &Path) -> std::result::Result<String, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.display().to_string()));
    }
    std::fs::read_to_string(path).map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Load and validate scope.yml into a [`ScopeConfig`].
pub fn load_scope_config(path: &Path) -> Result<ScopeConfig> {
    let contents = read_yaml(path)?;
    let mut cfg: ScopeConfig = serde_yaml::from_str(&contents).map_err(ConfigError::from)?;
    cfg.normalize();
    cfg.validate()?;
    Ok(cfg)
}

/// Load and validate auth.yml into an [`AuthConfig`].
pub fn load_auth_config(path: &Path) -> Result<AuthConfig> {
    let contents = read_yaml(path)?;
    let cfg: AuthConfig = serde_yaml::from_str(&contents).map_err(ConfigError::from)?;
    if cfg.auth_schemes.is_empty() {
        return Err(ConfigError::Invalid(
            "auth.yml must contain at least one auth scheme in `auth_schemes`".to_string(),
        )
        .into());
    }
    for scheme in &cfg.auth_schemes {
        scheme.validate()?;
    }
    Ok(cfg)
}
