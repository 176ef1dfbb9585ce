// Library crate - shared config, Kite API client, MCP protocol and agent logic

pub mod agent;
pub mod config;
pub mod error;
pub mod kite;
pub mod mcp;
pub mod tools;

// Re-export commonly used types
pub use config::{ClientConfig, Mode, ServerConfig};
pub use error::{ConfigError, KiteError};
pub use kite::KiteClient;
