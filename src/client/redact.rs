//! Privacy redaction of captured evidence

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::config::PrivacyLevel;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}").unwrap());
static SSN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap());
static CREDITCARD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:\d[ -]*?){13,19}\b").unwrap());
// crude: long opaque strings
static TOKENISH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Za-z0-9_\-]{24,})\b").unwrap());

/// Keywords that blank an entire snippet line under `strict`.
const SECRET_HINTS: [&str; 6] = [
    "secret",
    "token",
    "bearer ",
    "apikey",
    "api-key",
    "authorization",
];

/// Maximum snippet length kept under `strict`.
const STRICT_SNIPPET_CAP: usize = 512;

/// Apply the configured privacy level to a response snippet.
pub fn sanitize_snippet(text: &str, level: PrivacyLevel) -> String {
    if level == PrivacyLevel::None {
        return text.to_string();
    }

    let masked = EMAIL_RE.replace_all(text, "<email>");
    let masked = SSN_RE.replace_all(&masked, "<ssn>");
    let masked = CREDITCARD_RE.replace_all(&masked, "<cc>");
    let mut masked = TOKENISH_RE.replace_all(&masked, "<secret>").into_owned();

    if level == PrivacyLevel::Strict {
        masked = masked.chars().take(STRICT_SNIPPET_CAP).collect();
        masked = masked
            .lines()
            .map(|line| {
                let lower = line.to_lowercase();
                if SECRET_HINTS.iter().any(|hint| lower.contains(hint)) {
                    "<redacted>"
                } else {
                    line
                }
            })
            .collect::<Vec<&str>>()
            .join("\n");
    }
    masked
}

/// Replace credential-bearing request header values with `<redacted>`.
pub fn redact_headers(headers: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(k, v)| {
            let lk = k.to_lowercase();
            let sensitive = matches!(lk.as_str(), "authorization" | "proxy-authorization" | "cookie")
                || matches!(lk.as_str(), "x-api-key" | "api-key")
                || lk.starts_with("x-auth");
            let value = if sensitive {
                "<redacted>".to_string()
            } else {
                v.clone()
            };
            (k.clone(), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_level_unchanged() {
        let text = "contact admin@example.com token abcdefghijklmnopqrstuvwxyz123";
        assert_eq!(sanitize_snippet(text, PrivacyLevel::None), text);
    }

    #[test]
    fn test_minimal_masks_pii() {
        let text = "email: alice@example.com ssn: 123-45-6789";
        let out = sanitize_snippet(text, PrivacyLevel::Minimal);
        assert!(out.contains("<email>"));
        assert!(out.contains("<ssn>"));
        assert!(!out.contains("alice@example.com"));
    }

    #[test]
    fn test_minimal_masks_card_and_tokens() {
        let text = "card 4111 1111 1111 1111 key sk_live_abcdefghijklmnopqrstuv";
        let out = sanitize_snippet(text, PrivacyLevel::Minimal);
        assert!(out.contains("<cc>"));
        assert!(out.contains("<secret>"));
    }

    #[test]
    fn test_strict_truncates() {
        let text = "x".repeat(2000);
        let out = sanitize_snippet(&text, PrivacyLevel::Strict);
        assert_eq!(out.chars().count(), STRICT_SNIPPET_CAP);
    }

    #[test]
    fn test_strict_blanks_secret_lines() {
        let text = "plain line\nAuthorization: Bearer xyz\nanother line";
        let out = sanitize_snippet(text, PrivacyLevel::Strict);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "plain line");
        assert_eq!(lines[1], "<redacted>");
        assert_eq!(lines[2], "another line");
    }

    #[test]
    fn test_redact_headers() {
        let mut headers = BTreeMap::new();
        headers.insert("Authorization".to_string(), "Bearer abc".to_string());
        headers.insert("Cookie".to_string(), "sid=1".to_string());
        headers.insert("X-Api-Key".to_string(), "k".to_string());
        headers.insert("X-Auth-Token".to_string(), "t".to_string());
        headers.insert("Accept".to_string(), "application/json".to_string());

        let out = redact_headers(&headers);
        assert_eq!(out["Authorization"], "<redacted>");
        assert_eq!(out["Cookie"], "<redacted>");
        assert_eq!(out["X-Api-Key"], "<redacted>");
        assert_eq!(out["X-Auth-Token"], "<redacted>");
        assert_eq!(out["Accept"], "application/json");
    }
}
