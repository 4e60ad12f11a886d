//! OAuth2 and form-login credential flows

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use serde::Deserialize;
use serde_json::Value;

use crate::config::{AuthScheme, AuthType, GrantType};
use crate::error::AuthFlowError;

/// Timeout for credential-flow requests.
const FLOW_TIMEOUT: Duration = Duration::from_secs(15);

/// Token endpoint response for a successful grant.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
}

fn flow_client() -> Result<reqwest::Client, AuthFlowError> {
    reqwest::Client::builder()
        .timeout(FLOW_TIMEOUT)
        .build()
        .map_err(|e| AuthFlowError(format!("failed to build client: {}", e)))
}

/// Exchange OAuth2 credentials for an access token using the scheme's
/// grant type (`client_credentials` or `password`).
pub async fn fetch_oauth2_token(scheme: &AuthScheme) -> Result<TokenGrant, AuthFlowError> {
    debug_assert_eq!(scheme.auth_type, AuthType::Oauth2);
    let token_url = scheme
        .token_url
        .as_deref()
        .ok_or_else(|| AuthFlowError("oauth2 token_url is required".to_string()))?;

    let grant = scheme.grant_type.unwrap_or(GrantType::ClientCredentials);
    let mut form: Vec<(&str, String)> = vec![(
        "grant_type",
        match grant {
            GrantType::ClientCredentials => "client_credentials".to_string(),
            GrantType::Password => "password".to_string(),
        },
    )];
    if let Some(audience) = &scheme.audience {
        form.push(("audience", audience.clone()));
    }
    if let Some(scope_param) = &scheme.scope {
        form.push(("scope", scope_param.clone()));
    }
    if grant == GrantType::Password {
        form.push(("username", scheme.username.clone().unwrap_or_default()));
        form.push(("password", scheme.password.clone().unwrap_or_default()));
    }

    let response = flow_client()?
        .post(token_url)
        .basic_auth(
            scheme.client_id.as_deref().unwrap_or(""),
            scheme.client_secret.as_deref(),
        )
        .form(&form)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(AuthFlowError(format!(
            "OAuth2 token request failed with status {}",
            status
        )));
    }

    let parsed: TokenResponse = response
        .json()
        .await
        .map_err(|e| AuthFlowError(format!("OAuth2 token response not JSON: {}", e)))?;
    let access_token = parsed
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthFlowError("OAuth2 response missing access_token".to_string()))?;

    Ok(TokenGrant {
        access_token,
        refresh_token: parsed.refresh_token,
    })
}

/// Try a `refresh_token` grant. Returns `None` when the refresh fails for
/// any reason; callers fall back to re-authenticating from scratch.
pub async fn refresh_oauth2_token(scheme: &AuthScheme, refresh_token: &str) -> Option<String> {
    let token_url = scheme.token_url.as_deref()?;
    let client = flow_client().ok()?;

    let form = [
        ("grant_type", "refresh_token"),
        ("refresh_token", refresh_token),
    ];
    let response = client
        .post(token_url)
        .basic_auth(
            scheme.client_id.as_deref().unwrap_or(""),
            scheme.client_secret.as_deref(),
        )
        .form(&form)
        .send()
        .await
        .ok()?;

    if !response.status().is_success() {
        debug!(
            "refresh_token grant for '{}' returned {}",
            scheme.name,
            response.status()
        );
        return None;
    }
    let parsed: TokenResponse = response.json().await.ok()?;
    parsed.access_token.filter(|t| !t.is_empty())
}

/// Perform a form-based login and return a `name=value; name2=value2`
/// cookie string captured from the client jar, falling back to parsing
/// the raw `Set-Cookie` headers.
pub async fn perform_form_login(scheme: &AuthScheme) -> Result<String, AuthFlowError> {
    debug_assert_eq!(scheme.auth_type, AuthType::FormLogin);
    let login_url = scheme
        .login_url
        .as_deref()
        .ok_or_else(|| AuthFlowError("form_login login_url is required".to_string()))?;
    let (Some(username_field), Some(password_field)) =
        (scheme.username_field.as_deref(), scheme.password_field.as_deref())
    else {
        return Err(AuthFlowError(
            "form_login requires username_field and password_field".to_string(),
        ));
    };

    let mut payload: Vec<(String, String)> = vec![
        (
            username_field.to_string(),
            scheme.username.clone().unwrap_or_default(),
        ),
        (
            password_field.to_string(),
            scheme.password.clone().unwrap_or_default(),
        ),
    ];
    for (key, value) in &scheme.extra_fields {
        let value = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        payload.push((key.clone(), value));
    }

    let jar = Arc::new(reqwest::cookie::Jar::default());
    let client = reqwest::Client::builder()
        .timeout(FLOW_TIMEOUT)
        .cookie_provider(jar.clone())
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| AuthFlowError(format!("failed to build client: {}", e)))?;

    let method = scheme
        .login_method
        .as_deref()
        .map(|m| m.to_uppercase())
        .unwrap_or_else(|| "POST".to_string());
    let method = reqwest::Method::from_bytes(method.as_bytes())
        .map_err(|_| AuthFlowError(format!("invalid login_method for '{}'", scheme.name)))?;

    let url = reqwest::Url::parse(login_url)
        .map_err(|e| AuthFlowError(format!("invalid login_url: {}", e)))?;
    let response = client
        .request(method, url.clone())
        .form(&payload)
        .send()
        .await?;

    let mut cookie = cookie_header_from_jar(&jar, &url);
    if cookie.is_empty() {
        // some servers require manual propagation of Set-Cookie
        cookie = cookie_header_from_set_cookie(response.headers());
        if !cookie.is_empty() {
            warn!(
                "form_login '{}': cookie jar empty, parsed Set-Cookie headers instead",
                scheme.name
            );
        }
    }
    if cookie.is_empty() {
        return Err(AuthFlowError(
            "form_login: no cookies captured after login".to_string(),
        ));
    }
    Ok(cookie)
}

fn cookie_header_from_jar(jar: &reqwest::cookie::Jar, url: &reqwest::Url) -> String {
    use reqwest::cookie::CookieStore;
    jar.cookies(url)
        .and_then(|hv| hv.to_str().map(str::to_string).ok())
        .unwrap_or_default()
}

/// First `name=value` token of each cookie, comma-separated cookies
/// handled within a single header value as well.
fn cookie_header_from_set_cookie(headers: &reqwest::header::HeaderMap) -> String {
    let mut pairs: Vec<String> = Vec::new();
    for value in headers.get_all(reqwest::header::SET_COOKIE) {
        let Ok(text) = value.to_str() else { continue };
        for part in text.split(',') {
            let kv = part.split(';').next().unwrap_or("").trim();
            if kv.contains('=') {
                pairs.push(kv.to_string());
            }
        }
    }
    pairs.join("; ")
}
