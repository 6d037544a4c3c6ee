//! Tool registry and dispatcher
//!
//! Tools are registered at startup with a declared argument schema. The
//! dispatcher validates arguments at this boundary, audits every execution,
//! and converts handler failures into structured outcomes instead of
//! letting them escape. Unknown names fall through to the MCP host before
//! failing.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::RwLock;

use crate::agent::context::RunContext;
use crate::audit::{event_types, Severity};
use crate::mcp::McpHost;
use crate::services::RuntimeServices;
use crate::tools::validate::validate_args;

/// Default tool execution timeout (2 minutes)
const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(120);

/// Result of one tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub success: bool,
    pub output: Option<Value>,
    pub error: Option<String>,
}

impl ToolOutcome {
    pub fn ok(output: Value) -> Self {
        Self {
            success: true,
            output: Some(output),
            error: None,
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
        }
    }

    /// Payload for the tool-role message fed back to the model.
    pub fn payload(&self) -> Value {
        if self.success {
            self.output.clone().unwrap_or(json!({}))
        } else {
            json!({ "error": self.error.clone().unwrap_or_default() })
        }
    }
}

/// Per-call execution context handed to tool handlers.
#[derive(Clone)]
pub struct ToolContext {
    pub run: RunContext,
    pub services: Arc<RuntimeServices>,
}

impl ToolContext {
    pub fn new(run: RunContext, services: Arc<RuntimeServices>) -> Self {
        Self { run, services }
    }

    pub fn run_id(&self) -> &str {
        &self.run.run_id
    }

    /// Resolve a path relative to the run's working directory; absolute
    /// paths pass through.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let p = PathBuf::from(path);
        if p.is_absolute() {
            p
        } else {
            self.run.working_dir.join(p)
        }
    }
}

/// Trait for tool implementations
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (id)
    fn name(&self) -> &str;

    /// Tool description for the model
    fn description(&self) -> &str;

    /// JSON schema for arguments
    fn parameters_schema(&self) -> Value;

    /// Execute the tool
    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutcome;
}

/// Registry mapping tool names to handlers.
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
    mcp: RwLock<Option<Arc<McpHost>>>,
    default_timeout: Duration,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
            mcp: RwLock::new(None),
            default_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    /// Register a tool. Later registrations with the same name win.
    pub async fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.write().await.insert(name, tool);
    }

    /// Attach the MCP host for unknown-name fallthrough.
    pub async fn attach_mcp(&self, host: Arc<McpHost>) {
        *self.mcp.write().await = Some(host);
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().await.get(name).cloned()
    }

    /// Declared tool specs for provider requests, sorted by name.
    pub async fn specs(&self) -> Vec<crate::ai::types::ToolSpec> {
        let tools = self.tools.read().await;
        let mut specs: Vec<_> = tools
            .values()
            .map(|t| crate::ai::types::ToolSpec {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.parameters_schema(),
            })
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    /// Dispatch one tool call.
    pub async fn execute(&self, ctx: &ToolContext, name: &str, args: Value) -> ToolOutcome {
        let audit = &ctx.services.audit;
        audit.info(
            ctx.run_id(),
            event_types::TOOL_EXEC_START,
            &format!("Executing tool '{name}'"),
            json!({ "tool": name, "args": args.clone() }),
        );

        if ctx.run.is_cancelled() {
            return self.failed(ctx, name, "run cancelled", "CANCELLED");
        }

        let Some(tool) = self.get(name).await else {
            // Unknown names fall through to the MCP host.
            if let Some(host) = self.mcp.read().await.clone() {
                if host.recognizes(name).await {
                    let outcome = host.call_namespaced(ctx, name, args).await;
                    return self.finished(ctx, name, outcome);
                }
            }
            return self.failed(ctx, name, &format!("unknown tool: {name}"), "UNKNOWN_TOOL");
        };

        if let Err(violation) = validate_args(&tool.parameters_schema(), &args) {
            return self.failed(ctx, name, &violation, "VALIDATION_FAIL");
        }

        let result = tokio::select! {
            _ = ctx.run.cancel.cancelled() => ToolOutcome::fail("run cancelled"),
            r = tokio::time::timeout(self.default_timeout, tool.execute(args, ctx)) => {
                r.unwrap_or_else(|_| {
                    ToolOutcome::fail(format!(
                        "tool '{name}' timed out after {}s",
                        self.default_timeout.as_secs()
                    ))
                })
            }
        };

        self.finished(ctx, name, result)
    }

    fn failed(&self, ctx: &ToolContext, name: &str, error: &str, code: &str) -> ToolOutcome {
        ctx.services.audit.record(
            ctx.run_id(),
            event_types::TOOL_EXEC_ERROR,
            Severity::Error,
            &format!("Tool '{name}' failed: {error}"),
            json!({ "tool": name, "code": code, "error": error }),
        );
        ToolOutcome::fail(error)
    }

    fn finished(&self, ctx: &ToolContext, name: &str, outcome: ToolOutcome) -> ToolOutcome {
        if outcome.success {
            ctx.services.audit.info(
                ctx.run_id(),
                event_types::TOOL_EXEC_END,
                &format!("Tool '{name}' finished"),
                json!({ "tool": name }),
            );
        } else {
            ctx.services.audit.record(
                ctx.run_id(),
                event_types::TOOL_EXEC_ERROR,
                Severity::Error,
                &format!(
                    "Tool '{name}' failed: {}",
                    outcome.error.as_deref().unwrap_or("unknown error")
                ),
                json!({ "tool": name, "error": outcome.error.clone() }),
            );
        }
        outcome
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse tool arguments into a typed struct, mapping failure to an outcome.
pub fn parse_params<T: serde::de::DeserializeOwned>(args: Value) -> Result<T, ToolOutcome> {
    serde_json::from_value(args)
        .map_err(|e| ToolOutcome::fail(format!("invalid parameters: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::SandboxPolicy;
    use tempfile::TempDir;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echo back the given text"
        }
        fn parameters_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {"text": {"type": "string"}},
                "required": ["text"]
            })
        }
        async fn execute(&self, args: Value, _ctx: &ToolContext) -> ToolOutcome {
            ToolOutcome::ok(json!({"echo": args["text"]}))
        }
    }

    async fn context(tmp: &TempDir) -> ToolContext {
        let services = crate::services::RuntimeServices::open_at(
            tmp.path(),
            SandboxPolicy::new(tmp.path()),
        )
        .unwrap();
        ToolContext::new(
            RunContext::new("test").with_working_dir(tmp.path()),
            services,
        )
    }

    #[tokio::test]
    async fn execute_runs_registered_tool_and_audits() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp).await;
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool)).await;

        let outcome = registry
            .execute(&ctx, "echo", json!({"text": "hi"}))
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.payload(), json!({"echo": "hi"}));

        let audit = &ctx.services.audit;
        assert_eq!(
            audit
                .count_for_run(ctx.run_id(), event_types::TOOL_EXEC_START)
                .unwrap(),
            1
        );
        assert_eq!(
            audit
                .count_for_run(ctx.run_id(), event_types::TOOL_EXEC_END)
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn invalid_args_fail_validation_before_handler() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp).await;
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool)).await;

        let outcome = registry.execute(&ctx, "echo", json!({})).await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("missing required field"));

        let events = ctx.services.audit.events_for_run(ctx.run_id()).unwrap();
        let error_event = events
            .iter()
            .find(|e| e.event_type == event_types::TOOL_EXEC_ERROR)
            .unwrap();
        assert_eq!(error_event.data["code"], "VALIDATION_FAIL");
    }

    #[tokio::test]
    async fn unknown_tool_fails_with_error_payload() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp).await;
        let registry = ToolRegistry::new();

        let outcome = registry.execute(&ctx, "nope", json!({})).await;
        assert!(!outcome.success);
        assert_eq!(outcome.payload()["error"], "unknown tool: nope");
    }

    #[tokio::test]
    async fn specs_are_sorted_by_name() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool)).await;
        let specs = registry.specs().await;
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, "echo");
    }

    #[tokio::test]
    async fn sandbox_denial_surfaces_through_the_dispatcher() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp).await;
        let registry = ToolRegistry::new();
        registry
            .register(Arc::new(crate::tools::implementations::FilesystemTool))
            .await;

        let outcome = registry
            .execute(
                &ctx,
                "filesystem",
                json!({"operation": "write", "path": "/etc/passwd", "content": "x"}),
            )
            .await;

        assert!(!outcome.success);
        assert_eq!(
            outcome.error.as_deref(),
            Some("Denied: path_outside_sandbox")
        );
        assert_eq!(
            ctx.services
                .audit
                .count_for_run(ctx.run_id(), event_types::TOOL_EXEC_ERROR)
                .unwrap(),
            1
        );
        // No write attempted, nothing journaled.
        assert!(ctx.services.journal.entries(ctx.run_id()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancelled_run_blocks_dispatch() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp).await;
        ctx.run.cancel.cancel();
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool)).await;

        let outcome = registry
            .execute(&ctx, "echo", json!({"text": "hi"}))
            .await;
        assert!(!outcome.success);
    }
}
