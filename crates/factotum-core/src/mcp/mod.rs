//! MCP host - external tool-server processes
//!
//! Child processes speaking newline-delimited JSON-RPC over stdio. Their
//! tools are exposed through the dispatcher as `<server>__<tool>`.

pub mod config;
pub mod connection;
pub mod host;
pub mod protocol;
pub mod proxy;

pub use config::{McpConfig, ServerConfig};
pub use connection::ServerConnection;
pub use host::{namespaced, split_namespaced, McpHost};
pub use proxy::{register_mcp_tools, McpProxyTool};
