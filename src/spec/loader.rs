//! OpenAPI document loading

use std::path::Path;
use std::time::Duration;

use log::debug;
use serde_json::Value;

use crate::error::{Error, Result};

/// Timeout for fetching a remote OpenAPI document.
const FETCH_TIMEOUT: Duration = Duration::from_secs(20);

/// Load an OpenAPI document from a local path or an `http(s)://` URL.
pub async fn load_spec(src: &str) -> Result<Value> {
    let lower = src.to_lowercase();
    let text = if lower.starts_with("http://") || lower.starts_with("https://") {
        debug!("Fetching OpenAPI document from {}", src);
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;
        let response = client.get(src).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Network(format!(
                "fetching OpenAPI document failed with status {}",
                status
            )));
        }
        response.text().await?
    } else {
        debug!("Reading OpenAPI document from {}", src);
        std::fs::read_to_string(Path::new(src))?
    };

    parse_spec_text(&text)
}

/// Parse a document as JSON, falling back to YAML; the result must be a
/// mapping.
pub fn parse_spec_text(text: &str) -> Result<Value> {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) => serde_yaml::from_str(text)
            .map_err(|e| Error::InvalidSpec(format!("not valid JSON or YAML: {}", e)))?,
    };

    if !value.is_object() {
        return Err(Error::InvalidSpec(
            "document must be a JSON/YAML object".to_string(),
        ));
    }
    Ok(value)
}
