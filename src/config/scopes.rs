//! Host and path scope matching

use regex::Regex;

use crate::error::{Error, Result};

use super::ScopeConfig;

fn url_host(url: &str) -> Option<String> {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
}

fn url_path(url: &str) -> String {
    reqwest::Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| "/".to_string())
}

/// Wildcard host match. `*.example.com` matches `a.example.com` and
/// `a.b.example.com` but not the bare `example.com`.
pub fn host_matches(pattern: &str, host: &str) -> bool {
    let pattern = pattern.to_lowercase();
    let host = host.to_lowercase();

    if let Some(bare) = pattern.strip_prefix("*.") {
        // suffix keeps the dot, so the naked domain never matches
        host.ends_with(&pattern[1..]) && host != bare
    } else {
        host == pattern
    }
}

fn any_host_match(patterns: &[String], host: &str) -> bool {
    patterns.iter().any(|p| host_matches(p, host))
}

/// Check the URL's host against allowed/denied lists. Deny wins; with no
/// `allowed` entries, hosts taken from `base_urls` are permitted.
pub fn url_in_scope(url: &str, scope: &ScopeConfig) -> bool {
    let Some(host) = url_host(url) else {
        return false;
    };
    if any_host_match(&scope.denied, &host) {
        return false;
    }
    if !scope.allowed.is_empty() {
        return any_host_match(&scope.allowed, &host);
    }
    scope
        .base_urls
        .iter()
        .filter_map(|u| url_host(u))
        .any(|h| h == host)
}

fn path_pattern_match(path: &str, pattern: &str) -> bool {
    if let Some(expr) = pattern.strip_prefix("re:") {
        return Regex::new(expr).map(|re| re.is_match(path)).unwrap_or(false);
    }
    // glob match, normalized so both sides start with '/'
    let norm = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };
    let pat = if pattern.starts_with('/') {
        pattern.to_string()
    } else {
        format!("/{}", pattern)
    };
    match Regex::new(&glob_to_regex(&pat)) {
        Ok(re) => re.is_match(&norm),
        Err(_) => false,
    }
}

/// Translate a glob pattern (`*`, `?`, `[seq]`) into an anchored regex.
fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push('^');
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => {
                out.push('[');
                if chars.peek() == Some(&'!') {
                    chars.next();
                    out.push('^');
                }
                for inner in chars.by_ref() {
                    if inner == ']' {
                        break;
                    }
                    out.push(inner);
                }
                out.push(']');
            }
            c => out.push_str(&regex::escape(&c.to_string())),
        }
    }
    out.push('$');
    out
}

/// Check the URL path against the path policy: deny before allow, empty
/// allow list means allow-all.
pub fn url_path_allowed(url: &str, scope: &ScopeConfig) -> bool {
    let path = url_path(url);
    let policy = &scope.path_policy;

    if policy.deny_paths.iter().any(|p| path_pattern_match(&path, p)) {
        return false;
    }
    if policy.allow_paths.is_empty() {
        return true;
    }
    policy.allow_paths.iter().any(|p| path_pattern_match(&path, p))
}

fn offending_list(urls: &[&str]) -> String {
    let shown: Vec<&str> = urls.iter().take(20).copied().collect();
    let more = if urls.len() > 20 {
        format!("\n  (+{} more)", urls.len() - 20)
    } else {
        String::new()
    };
    format!("\n  - {}{}", shown.join("\n  - "), more)
}

/// Fatal scope gate applied before any traffic: every URL must pass both
/// the host and path predicates.
pub fn assert_urls_in_scope<S: AsRef<str>>(urls: &[S], scope: &ScopeConfig) -> Result<()> {
    let out_of_scope: Vec<&str> = urls
        .iter()
        .map(|u| u.as_ref())
        .filter(|u| !url_in_scope(u, scope))
        .collect();
    if !out_of_scope.is_empty() {
        return Err(Error::ScopeViolation(format!(
            "Some endpoints are outside of HOST scope. Update scope.yml (allowed/denied/base_urls).{}",
            offending_list(&out_of_scope)
        )));
    }

    let path_blocked: Vec<&str> = urls
        .iter()
        .map(|u| u.as_ref())
        .filter(|u| !url_path_allowed(u, scope))
        .collect();
    if !path_blocked.is_empty() {
        return Err(Error::ScopeViolation(format!(
            "Some endpoints are blocked by PATH policy (deny_paths/allow_paths). Adjust scope.yml:path_policy.{}",
            offending_list(&path_blocked)
        )));
    }
    Ok(())
}

/// Effective base URLs for OpenAPI expansion: prefer the spec's servers,
/// else fall back to scope.base_urls.
pub fn choose_base_urls(scope: &ScopeConfig, openapi_servers: &[String]) -> Result<Vec<String>> {
    if !openapi_servers.is_empty() {
        return Ok(openapi_servers.to_vec());
    }
    if !scope.base_urls.is_empty() {
        return Ok(scope.base_urls.clone());
    }
    Err(Error::InvalidSpec(
        "No servers[] found in OpenAPI and no `base_urls` in scope.yml; specify at least one base URL"
            .to_string(),
    ))
}
