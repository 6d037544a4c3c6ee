//! Proxy tools for server-exposed tools
//!
//! Each connected server tool is registered in the dispatcher under its
//! namespaced id with the schema the server declared. External tools pass
//! the same sandbox policy as the built-ins: any conventional path argument
//! is checked before the call is forwarded.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::host::{namespaced, McpHost};
use super::protocol::ServerToolDef;
use crate::error::CoreError;
use crate::sandbox::Effect;
use crate::tools::registry::{Tool, ToolContext, ToolOutcome, ToolRegistry};

/// Argument keys that conventionally carry filesystem paths.
const PATH_KEYS: [&str; 4] = ["path", "file_path", "directory", "dest"];

/// Deny the call when a path-like argument falls outside the sandbox.
pub(crate) fn sandbox_gate(ctx: &ToolContext, arguments: &Value) -> Result<(), CoreError> {
    let Some(obj) = arguments.as_object() else {
        return Ok(());
    };
    for key in PATH_KEYS {
        if let Some(path) = obj.get(key).and_then(|v| v.as_str()) {
            let resolved = ctx.resolve_path(path);
            ctx.services
                .sandbox
                .check(&Effect::Filesystem { path: &resolved })?;
        }
    }
    Ok(())
}

/// One server tool exposed through the registry.
pub struct McpProxyTool {
    host: Arc<McpHost>,
    server: String,
    id: String,
    description: String,
    schema: Value,
}

impl McpProxyTool {
    pub fn new(host: Arc<McpHost>, server: &str, def: &ServerToolDef) -> Self {
        Self {
            host,
            server: server.to_string(),
            id: namespaced(server, &def.name),
            description: def
                .description
                .clone()
                .unwrap_or_else(|| format!("Tool '{}' from server '{server}'", def.name)),
            schema: def.input_schema.clone(),
        }
    }

    fn tool_name(&self) -> &str {
        self.id
            .split_once("__")
            .map(|(_, tool)| tool)
            .unwrap_or(&self.id)
    }
}

#[async_trait]
impl Tool for McpProxyTool {
    fn name(&self) -> &str {
        &self.id
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.schema.clone()
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutcome {
        if let Err(e) = sandbox_gate(ctx, &args) {
            return ToolOutcome::fail(e.to_string());
        }
        match self.host.call(&self.server, self.tool_name(), args).await {
            Ok((text, false)) => ToolOutcome::ok(json!({ "output": text })),
            Ok((text, true)) => ToolOutcome::fail(text),
            Err(e) => ToolOutcome::fail(format!("tool server call failed: {e}")),
        }
    }
}

/// Register every connected server tool under its namespaced id.
pub async fn register_mcp_tools(registry: &ToolRegistry, host: Arc<McpHost>) {
    for (id, def) in host.tools().await {
        let server = id.split_once("__").map(|(s, _)| s).unwrap_or_default();
        registry
            .register(Arc::new(McpProxyTool::new(host.clone(), server, &def)))
            .await;
        tracing::debug!("registered external tool {id}");
    }
    registry.attach_mcp(host).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::context::RunContext;
    use crate::sandbox::SandboxPolicy;
    use crate::services::RuntimeServices;
    use tempfile::TempDir;

    #[test]
    fn sandbox_gate_denies_outside_paths() {
        let tmp = TempDir::new().unwrap();
        let services =
            RuntimeServices::open_at(tmp.path(), SandboxPolicy::new(tmp.path())).unwrap();
        let ctx = ToolContext::new(
            RunContext::new("gate").with_working_dir(tmp.path()),
            services,
        );

        assert!(sandbox_gate(&ctx, &json!({"path": "inside.txt"})).is_ok());
        assert!(sandbox_gate(&ctx, &json!({"query": "no paths here"})).is_ok());

        let err = sandbox_gate(&ctx, &json!({"file_path": "/etc/passwd"})).unwrap_err();
        assert_eq!(err.to_string(), "Denied: path_outside_sandbox");
    }
}
