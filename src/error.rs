//! Error types for the AMAC CLI

use thiserror::Error;

/// Result type alias for AMAC operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for the application
#[derive(Debug, Error)]
pub enum Error {
    /// OpenAPI document could not be parsed or is not a mapping. Fatal;
    /// nothing is probed.
    #[error("Invalid OpenAPI document: {0}")]
    InvalidSpec(String),

    /// One or more planned URLs fall outside the host or path scope.
    /// Fatal; raised before any network traffic.
    #[error("{0}")]
    ScopeViolation(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Operation failed: {0}")]
    Other(String),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Network("Request timed out".to_string())
        } else if err.is_connect() {
            Error::Network("Failed to connect".to_string())
        } else {
            Error::Network(err.to_string())
        }
    }
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

/// Credential-flow failures (OAuth2 token exchange, form login).
///
/// Never fatal to a run: the affected identity's variants record the
/// message and probing continues.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct AuthFlowError(pub String);

impl From<reqwest::Error> for AuthFlowError {
    fn from(err: reqwest::Error) -> Self {
        AuthFlowError(format!("request failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_spec_message() {
        let err = Error::InvalidSpec("not an object".to_string());
        assert!(err.to_string().contains("not an object"));
    }

    #[test]
    fn test_scope_violation_passthrough() {
        let err = Error::ScopeViolation("2 endpoints out of scope".to_string());
        assert_eq!(err.to_string(), "2 endpoints out of scope");
    }

    #[test]
    fn test_config_error_parse() {
        let err = ConfigError::ParseError("unexpected key".to_string());
        assert!(err.to_string().contains("unexpected key"));
    }

    #[test]
    fn test_error_from_config_error() {
        let cfg_err = ConfigError::NotFound("scope.yml".to_string());
        let err: Error = cfg_err.into();

        match err {
            Error::Config(ConfigError::NotFound(_)) => (),
            _ => panic!("Expected Error::Config(ConfigError::NotFound)"),
        }
    }

    #[test]
    fn test_config_error_from_yaml_error() {
        let yaml_str = "invalid: [yaml: content";
        let yaml_err = serde_yaml::from_str::<serde_yaml::Value>(yaml_str).unwrap_err();
        let config_err: ConfigError = yaml_err.into();

        match config_err {
            ConfigError::ParseError(_) => (),
            _ => panic!("Expected ConfigError::ParseError"),
        }
    }

    #[test]
    fn test_auth_flow_error_message() {
        let err = AuthFlowError("OAuth2 response missing access_token".to_string());
        assert!(err.to_string().contains("access_token"));
    }
}
