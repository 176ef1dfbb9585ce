//! Layered configuration resolution.
//!
//! Every option is resolved through the same ordered provider chain:
//! command-line flag > process environment > `.env` file > built-in
//! default. The first source that supplies a non-empty value wins; there is
//! no merging within an option.
//!
//! The `.env` file is read with [`dotenvy::dotenv_iter`] instead of being
//! loaded into the process environment, so a variable present in both the
//! real environment and the file resolves to the process value.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

pub const DEFAULT_PORT: u16 = 8001;
pub const DEFAULT_HOST: &str = "localhost";

/// Server transport / client transport selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// HTTP + Server-Sent Events, for networked deployment.
    Sse,
    /// Newline-delimited JSON-RPC on stdin/stdout, for same-host pairing.
    Stdio,
}

impl Default for Mode {
    fn default() -> Self {
        Self::Sse
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sse" => Ok(Self::Sse),
            "stdio" => Ok(Self::Stdio),
            other => Err(format!("expected 'sse' or 'stdio', got {other:?}")),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sse => write!(f, "sse"),
            Self::Stdio => write!(f, "stdio"),
        }
    }
}

/// Snapshot of the environment-backed sources.
///
/// Holding snapshots (rather than reading `std::env` at each lookup) keeps
/// resolution deterministic and lets tests supply both layers directly.
pub struct Resolver {
    env: HashMap<String, String>,
    dotenv: HashMap<String, String>,
}

impl Resolver {
    /// Capture the process environment and the `.env` file in the working
    /// directory, if one exists.
    pub fn from_process() -> Self {
        let dotenv = match dotenvy::dotenv_iter() {
            Ok(iter) => iter.flatten().collect(),
            Err(_) => HashMap::new(),
        };
        Self {
            env: std::env::vars().collect(),
            dotenv,
        }
    }

    pub fn new(env: HashMap<String, String>, dotenv: HashMap<String, String>) -> Self {
        Self { env, dotenv }
    }

    /// Walk the provider chain for one option. Empty values are treated as
    /// absent so e.g. `ZERODHA_API_KEY=` in a shell profile does not mask a
    /// `.env` entry.
    pub fn resolve(&self, flag: Option<&str>, var: &str) -> Option<String> {
        [
            flag.map(str::to_string),
            self.env.get(var).cloned(),
            self.dotenv.get(var).cloned(),
        ]
        .into_iter()
        .flatten()
        .find(|v| !v.is_empty())
    }

    fn resolve_port(&self, flag: Option<&str>, var: &str) -> Result<u16, ConfigError> {
        match self.resolve(flag, var) {
            None => Ok(DEFAULT_PORT),
            Some(raw) => raw.parse().map_err(|e| ConfigError::Invalid {
                option: "port",
                value: raw,
                reason: format!("{e}"),
            }),
        }
    }

    fn resolve_mode(&self, flag: Option<&str>, var: &str) -> Result<Mode, ConfigError> {
        match self.resolve(flag, var) {
            None => Ok(Mode::default()),
            Some(raw) => raw.parse().map_err(|reason| ConfigError::Invalid {
                option: "mode",
                value: raw,
                reason,
            }),
        }
    }
}

/// Resolved server configuration. Immutable after startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub api_key: String,
    pub api_secret: String,
    pub port: u16,
    pub mode: Mode,
}

impl ServerConfig {
    /// Fails with [`ConfigError::Missing`] when api_key or api_secret is
    /// absent from every source - the server must not start without them.
    pub fn resolve(
        resolver: &Resolver,
        api_key: Option<&str>,
        api_secret: Option<&str>,
        port: Option<&str>,
        mode: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let api_key = resolver
            .resolve(api_key, "ZERODHA_API_KEY")
            .ok_or(ConfigError::Missing {
                option: "api_key",
                flag: "--api-key",
                env: "ZERODHA_API_KEY",
            })?;
        let api_secret = resolver
            .resolve(api_secret, "ZERODHA_API_SECRET")
            .ok_or(ConfigError::Missing {
                option: "api_secret",
                flag: "--api-secret",
                env: "ZERODHA_API_SECRET",
            })?;
        Ok(Self {
            api_key,
            api_secret,
            port: resolver.resolve_port(port, "PORT")?,
            mode: resolver.resolve_mode(mode, "SERVER_MODE")?,
        })
    }
}

/// Resolved agent-client configuration. Immutable after startup.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub transport: Mode,
}

impl ClientConfig {
    pub fn resolve(
        resolver: &Resolver,
        host: Option<&str>,
        port: Option<&str>,
        transport: Option<&str>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            host: resolver
                .resolve(host, "MCP_HOST")
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: resolver.resolve_port(port, "MCP_PORT")?,
            transport: resolver.resolve_mode(transport, "MCP_TRANSPORT")?,
        })
    }

    /// HTTP origin of the server in SSE mode.
    pub fn origin(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn sse_url(&self) -> String {
        format!("{}/sse", self.origin())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(env: &[(&str, &str)], dotenv: &[(&str, &str)]) -> Resolver {
        let to_map = |pairs: &[(&str, &str)]| {
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        };
        Resolver::new(to_map(env), to_map(dotenv))
    }

    #[test]
    fn flag_beats_environment() {
        let r = resolver(&[("ZERODHA_API_KEY", "from_env")], &[]);
        assert_eq!(
            r.resolve(Some("from_flag"), "ZERODHA_API_KEY").as_deref(),
            Some("from_flag")
        );
    }

    #[test]
    fn environment_beats_dotenv() {
        let r = resolver(
            &[("ZERODHA_API_KEY", "from_env")],
            &[("ZERODHA_API_KEY", "from_file")],
        );
        assert_eq!(
            r.resolve(None, "ZERODHA_API_KEY").as_deref(),
            Some("from_env")
        );
    }

    #[test]
    fn dotenv_used_when_environment_empty() {
        // An empty value counts as absent, not as a real setting.
        let r = resolver(
            &[("ZERODHA_API_KEY", "")],
            &[("ZERODHA_API_KEY", "from_file")],
        );
        assert_eq!(
            r.resolve(None, "ZERODHA_API_KEY").as_deref(),
            Some("from_file")
        );
    }

    #[test]
    fn server_defaults_apply() {
        let r = resolver(&[("ZERODHA_API_KEY", "k"), ("ZERODHA_API_SECRET", "s")], &[]);
        let config = ServerConfig::resolve(&r, None, None, None, None).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.mode, Mode::Sse);
    }

    #[test]
    fn missing_credentials_is_fatal() {
        let r = resolver(&[], &[]);
        let err = ServerConfig::resolve(&r, None, None, None, None).unwrap_err();
        assert!(matches!(err, ConfigError::Missing { option: "api_key", .. }));
    }

    #[test]
    fn bad_port_is_rejected() {
        let r = resolver(&[("ZERODHA_API_KEY", "k"), ("ZERODHA_API_SECRET", "s")], &[]);
        let err = ServerConfig::resolve(&r, None, None, Some("eight"), None).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { option: "port", .. }));
    }

    #[test]
    fn mode_parses_case_insensitively() {
        assert_eq!("STDIO".parse::<Mode>().unwrap(), Mode::Stdio);
        assert_eq!("sse".parse::<Mode>().unwrap(), Mode::Sse);
        assert!("websocket".parse::<Mode>().is_err());
    }

    #[test]
    fn client_defaults_apply() {
        let r = resolver(&[], &[]);
        let config = ClientConfig::resolve(&r, None, None, None).unwrap();
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.sse_url(), "http://localhost:8001/sse");
    }

    #[test]
    fn client_env_overrides() {
        let r = resolver(&[("MCP_HOST", "trading.internal"), ("MCP_PORT", "9100")], &[]);
        let config = ClientConfig::resolve(&r, None, None, None).unwrap();
        assert_eq!(config.host, "trading.internal");
        assert_eq!(config.port, 9100);
    }
}
