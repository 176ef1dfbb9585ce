//! Error types shared across the server, agent client, and login utility.

use thiserror::Error;

/// Startup configuration failure. Always fatal: the binary prints the error
/// and exits non-zero.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required option was absent from every source (flag, environment,
    /// .env file).
    #[error("{option} must be set via {flag} or the {env} environment variable (or a .env file)")]
    Missing {
        option: &'static str,
        flag: &'static str,
        env: &'static str,
    },

    #[error("invalid value {value:?} for {option}: {reason}")]
    Invalid {
        option: &'static str,
        value: String,
        reason: String,
    },
}

/// Failure from the Kite API layer.
///
/// `Api` carries the brokerage's own error message so tool results can
/// surface it verbatim. `Http` covers transport-level failures including
/// timeouts - at the tool boundary both are translated into an error
/// payload, never an unhandled fault.
#[derive(Debug, Error)]
pub enum KiteError {
    /// The brokerage rejected the call (insufficient margin, unknown order
    /// id, expired token, ...).
    #[error("{error_type}: {message}")]
    Api { message: String, error_type: String },

    /// The request-token -> access-token exchange failed.
    #[error("token exchange failed: {0}")]
    AuthExchange(String),

    /// An authenticated call was attempted before any token exchange.
    #[error("not authenticated - call get_access_token with a request token first")]
    NotAuthenticated,

    /// Transport failure (connection refused, timeout, TLS, ...).
    #[error("kite api request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response from kite api: {0}")]
    UnexpectedResponse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_keeps_brokerage_message() {
        let err = KiteError::Api {
            message: "Insufficient funds".to_string(),
            error_type: "InputException".to_string(),
        };
        assert_eq!(err.to_string(), "InputException: Insufficient funds");
    }

    #[test]
    fn missing_config_names_both_sources() {
        let err = ConfigError::Missing {
            option: "api_key",
            flag: "--api-key",
            env: "ZERODHA_API_KEY",
        };
        let msg = err.to_string();
        assert!(msg.contains("--api-key"));
        assert!(msg.contains("ZERODHA_API_KEY"));
    }
}
