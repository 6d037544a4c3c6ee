//! MCP host
//!
//! Manages the configured tool-server connections, namespaces their tools
//! as `<server>__<tool>`, and proxies dispatch. A server that fails to
//! connect is skipped with a warning; the host never aborts the agent.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::config::McpConfig;
use super::connection::ServerConnection;
use super::protocol::ServerToolDef;

/// Separator between server name and tool name in namespaced ids.
pub const NAMESPACE_SEPARATOR: &str = "__";

pub fn namespaced(server: &str, tool: &str) -> String {
    format!("{server}{NAMESPACE_SEPARATOR}{tool}")
}

/// Split a namespaced id into (server, tool).
pub fn split_namespaced(name: &str) -> Option<(&str, &str)> {
    name.split_once(NAMESPACE_SEPARATOR)
}

pub struct McpHost {
    config: McpConfig,
    working_dir: PathBuf,
    connections: RwLock<HashMap<String, Arc<ServerConnection>>>,
}

impl McpHost {
    pub fn new(config: McpConfig, working_dir: PathBuf) -> Self {
        Self {
            config,
            working_dir,
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Connect every enabled server. Failures log a warning and skip.
    pub async fn connect_all(&self) {
        let targets: Vec<_> = self
            .config
            .enabled_servers()
            .map(|(name, cfg)| (name.clone(), cfg.clone()))
            .collect();

        if targets.is_empty() {
            return;
        }
        info!("Connecting {} tool server(s)", targets.len());

        let connections = targets.into_iter().map(|(name, cfg)| {
            let working_dir = self.working_dir.clone();
            async move {
                let result = ServerConnection::open(&name, &cfg, &working_dir).await;
                (name, result)
            }
        });

        for (name, result) in futures::future::join_all(connections).await {
            match result {
                Ok(connection) => {
                    self.connections
                        .write()
                        .await
                        .insert(name, Arc::new(connection));
                }
                Err(e) => warn!("Skipping tool server {name}: {e:?}"),
            }
        }
    }

    /// All connected tools as (namespaced id, definition).
    pub async fn tools(&self) -> Vec<(String, ServerToolDef)> {
        let connections = self.connections.read().await;
        let mut out = Vec::new();
        for (server, connection) in connections.iter() {
            for tool in connection.tools() {
                out.push((namespaced(server, &tool.name), tool.clone()));
            }
        }
        out
    }

    /// True when a namespaced id maps to a connected server's tool.
    pub async fn recognizes(&self, name: &str) -> bool {
        let Some((server, tool)) = split_namespaced(name) else {
            return false;
        };
        let connections = self.connections.read().await;
        match connections.get(server) {
            Some(connection) => connection.tools().iter().any(|t| t.name == tool),
            None => false,
        }
    }

    /// Proxy a call to the owning server.
    pub async fn call(&self, server: &str, tool: &str, arguments: Value) -> Result<(String, bool)> {
        let connection = {
            let connections = self.connections.read().await;
            connections
                .get(server)
                .cloned()
                .ok_or_else(|| anyhow!("tool server not connected: {server}"))?
        };
        let result = connection.call_tool(tool, arguments).await?;
        Ok((result.rendered(), result.is_error))
    }

    /// Call through a namespaced id, used by the dispatcher's fallthrough.
    pub async fn call_namespaced(
        &self,
        ctx: &crate::tools::registry::ToolContext,
        name: &str,
        arguments: Value,
    ) -> crate::tools::registry::ToolOutcome {
        use crate::tools::registry::ToolOutcome;

        let Some((server, tool)) = split_namespaced(name) else {
            return ToolOutcome::fail(format!("not a namespaced tool id: {name}"));
        };
        if let Err(e) = super::proxy::sandbox_gate(ctx, &arguments) {
            return ToolOutcome::fail(e.to_string());
        }
        match self.call(server, tool, arguments).await {
            Ok((text, false)) => ToolOutcome::ok(serde_json::json!({ "output": text })),
            Ok((text, true)) => ToolOutcome::fail(text),
            Err(e) => ToolOutcome::fail(format!("tool server call failed: {e}")),
        }
    }

    /// Close all connections, killing the server processes.
    pub async fn shutdown(&self) {
        let mut connections = self.connections.write().await;
        for (name, connection) in connections.drain() {
            info!("Shutting down tool server {name}");
            connection.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespacing_round_trips() {
        let id = namespaced("files", "read_file");
        assert_eq!(id, "files__read_file");
        assert_eq!(split_namespaced(&id), Some(("files", "read_file")));
        assert_eq!(split_namespaced("plain"), None);
    }

    #[tokio::test]
    async fn empty_config_connects_nothing() {
        let host = McpHost::new(McpConfig::default(), PathBuf::from("."));
        host.connect_all().await;
        assert!(host.tools().await.is_empty());
        assert!(!host.recognizes("files__read_file").await);
    }
}
