//! Model Context Protocol plumbing
//!
//! This module carries both ends of the MCP session:
//!
//! - [`protocol`] - JSON-RPC 2.0 framing and the MCP subset in use
//! - [`server`] - tool server core plus stdio and HTTP+SSE transports
//! - [`client`] - agent-side session over stdio or SSE
//!
//! The transport is a startup-time choice on both sides, never negotiated
//! per call.

pub mod client;
pub mod protocol;
pub mod server;

// Re-export commonly used types
pub use client::McpClient;
pub use protocol::{CallToolResult, Tool};
pub use server::{run_sse, run_stdio, McpServer};
