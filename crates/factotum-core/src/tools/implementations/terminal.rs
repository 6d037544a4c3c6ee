//! Terminal tool
//!
//! Runs a whitelisted shell command, captures stdout/stderr/exit code, and
//! journals the invocation (non-reversible).

use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::process::Command;

use crate::sandbox::Effect;
use crate::tools::registry::{parse_params, Tool, ToolContext, ToolOutcome};

pub struct TerminalTool;

#[derive(Deserialize)]
struct Params {
    command: String,
    working_dir: Option<String>,
}

#[async_trait]
impl Tool for TerminalTool {
    fn name(&self) -> &str {
        "terminal"
    }

    fn description(&self) -> &str {
        "Run a shell command and capture stdout, stderr, and exit code. \
         Only whitelisted commands are allowed."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The command to run"
                },
                "working_dir": {
                    "type": "string",
                    "description": "Working directory, defaults to the run's working directory"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutcome {
        let params = match parse_params::<Params>(args) {
            Ok(p) => p,
            Err(e) => return e,
        };

        if let Err(e) = ctx.services.sandbox.check(&Effect::Terminal {
            command: &params.command,
        }) {
            return ToolOutcome::fail(e.to_string());
        }

        let cwd = params
            .working_dir
            .map(|d| ctx.resolve_path(&d))
            .unwrap_or_else(|| ctx.run.working_dir.clone());

        let output = match Command::new("sh")
            .arg("-c")
            .arg(&params.command)
            .current_dir(&cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
        {
            Ok(o) => o,
            Err(e) => return ToolOutcome::fail(format!("failed to run command: {e}")),
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let exit_code = output.status.code().unwrap_or(-1);

        if let Err(e) =
            ctx.services
                .journal
                .record_terminal_command(ctx.run_id(), &params.command, &stdout)
        {
            tracing::warn!("journal write failed: {e}");
        }

        if output.status.success() {
            ToolOutcome::ok(json!({
                "command": params.command,
                "stdout": stdout,
                "stderr": stderr,
                "exit_code": exit_code,
            }))
        } else {
            ToolOutcome::fail(format!(
                "command exited with {exit_code}: {}",
                if stderr.is_empty() { &stdout } else { &stderr }
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::context::RunContext;
    use crate::sandbox::SandboxPolicy;
    use crate::services::RuntimeServices;
    use tempfile::TempDir;

    fn context(tmp: &TempDir) -> ToolContext {
        let services =
            RuntimeServices::open_at(tmp.path(), SandboxPolicy::new(tmp.path())).unwrap();
        ToolContext::new(
            RunContext::new("term test").with_working_dir(tmp.path()),
            services,
        )
    }

    #[tokio::test]
    async fn whitelisted_command_captures_output() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        let outcome = TerminalTool
            .execute(json!({"command": "echo agent"}), &ctx)
            .await;
        assert!(outcome.success);
        let payload = outcome.payload();
        assert_eq!(payload["exit_code"], 0);
        assert!(payload["stdout"].as_str().unwrap().contains("agent"));

        let entries = ctx.services.journal.entries(ctx.run_id()).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].reversible);
    }

    #[tokio::test]
    async fn non_whitelisted_command_is_denied_before_execution() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        let outcome = TerminalTool
            .execute(json!({"command": "curl http://example.com"}), &ctx)
            .await;
        assert!(!outcome.success);
        assert_eq!(
            outcome.error.as_deref(),
            Some("Denied: terminal_cmd_not_whitelisted")
        );
        // Nothing journaled: the command never ran.
        assert!(ctx.services.journal.entries(ctx.run_id()).unwrap().is_empty());
    }
}
