//! Filesystem tool
//!
//! Read, write, mkdir, chmod, list, delete, move, copy. Every path passes
//! the sandbox check on its resolved form; writes, deletions, and moves go
//! through the journal so they can be rolled back.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::fs;

use crate::sandbox::Effect;
use crate::tools::registry::{parse_params, Tool, ToolContext, ToolOutcome};

pub struct FilesystemTool;

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum Operation {
    Read,
    Write,
    Mkdir,
    Chmod,
    List,
    Delete,
    #[serde(rename = "move")]
    Move,
    Copy,
}

#[derive(Deserialize)]
struct Params {
    operation: Operation,
    path: String,
    content: Option<String>,
    /// Octal mode string for chmod, e.g. "755".
    mode: Option<String>,
    destination: Option<String>,
}

#[async_trait]
impl Tool for FilesystemTool {
    fn name(&self) -> &str {
        "filesystem"
    }

    fn description(&self) -> &str {
        "File operations: read, write, mkdir, chmod, list, delete, move, copy. \
         Paths resolve against the working directory and must stay inside the sandbox."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": ["read", "write", "mkdir", "chmod", "list", "delete", "move", "copy"],
                    "description": "The file operation to perform"
                },
                "path": {
                    "type": "string",
                    "description": "Target path"
                },
                "content": {
                    "type": "string",
                    "description": "Content for write operations"
                },
                "mode": {
                    "type": "string",
                    "description": "Octal permission string for chmod, e.g. 755"
                },
                "destination": {
                    "type": "string",
                    "description": "Destination path for move/copy"
                }
            },
            "required": ["operation", "path"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutcome {
        let params = match parse_params::<Params>(args) {
            Ok(p) => p,
            Err(e) => return e,
        };

        let path = ctx.resolve_path(&params.path);
        if let Err(e) = ctx.services.sandbox.check(&Effect::Filesystem { path: &path }) {
            return ToolOutcome::fail(e.to_string());
        }

        let run_id = ctx.run_id().to_string();
        let journal = &ctx.services.journal;

        match params.operation {
            Operation::Read => match fs::read_to_string(&path).await {
                Ok(content) => ToolOutcome::ok(json!({
                    "path": path.display().to_string(),
                    "content": content,
                })),
                Err(e) => ToolOutcome::fail(format!("failed to read {}: {e}", path.display())),
            },

            Operation::Write => {
                let content = params.content.unwrap_or_default();
                let previous = fs::read_to_string(&path).await.ok();

                if let Some(parent) = path.parent().filter(|p| !p.exists()) {
                    if let Err(e) = fs::create_dir_all(parent).await {
                        return ToolOutcome::fail(format!("failed to create parent: {e}"));
                    }
                }
                if let Err(e) = fs::write(&path, &content).await {
                    return ToolOutcome::fail(format!("failed to write {}: {e}", path.display()));
                }

                let journaled = match previous {
                    Some(before) => journal.record_file_modify(
                        &run_id,
                        &path,
                        &before,
                        &content,
                        &format!("Overwrote {}", path.display()),
                    ),
                    None => journal.record_file_create(&run_id, &path, &content),
                };
                if let Err(e) = journaled {
                    tracing::warn!("journal write failed: {e}");
                }

                ToolOutcome::ok(json!({
                    "path": path.display().to_string(),
                    "bytes_written": content.len(),
                }))
            }

            Operation::Mkdir => {
                let existed = path.exists();
                if let Err(e) = fs::create_dir_all(&path).await {
                    return ToolOutcome::fail(format!("failed to mkdir {}: {e}", path.display()));
                }
                if !existed {
                    if let Err(e) = journal.record_directory_create(&run_id, &path) {
                        tracing::warn!("journal write failed: {e}");
                    }
                }
                ToolOutcome::ok(json!({ "path": path.display().to_string(), "created": !existed }))
            }

            Operation::Chmod => {
                let Some(mode) = params.mode else {
                    return ToolOutcome::fail("chmod requires 'mode'");
                };
                let Ok(bits) = u32::from_str_radix(&mode, 8) else {
                    return ToolOutcome::fail(format!("invalid octal mode: {mode}"));
                };
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    if let Err(e) =
                        fs::set_permissions(&path, std::fs::Permissions::from_mode(bits)).await
                    {
                        return ToolOutcome::fail(format!("chmod failed: {e}"));
                    }
                }
                #[cfg(not(unix))]
                {
                    let _ = bits;
                    return ToolOutcome::fail("chmod is only supported on unix");
                }
                ToolOutcome::ok(json!({ "path": path.display().to_string(), "mode": mode }))
            }

            Operation::List => {
                let mut entries = Vec::new();
                let mut dir = match fs::read_dir(&path).await {
                    Ok(d) => d,
                    Err(e) => {
                        return ToolOutcome::fail(format!("failed to list {}: {e}", path.display()))
                    }
                };
                while let Ok(Some(entry)) = dir.next_entry().await {
                    let kind = entry
                        .file_type()
                        .await
                        .map(|t| if t.is_dir() { "dir" } else { "file" })
                        .unwrap_or("unknown");
                    entries.push(json!({
                        "name": entry.file_name().to_string_lossy(),
                        "kind": kind,
                    }));
                }
                ToolOutcome::ok(json!({ "path": path.display().to_string(), "entries": entries }))
            }

            Operation::Delete => {
                let Ok(before) = fs::read_to_string(&path).await else {
                    return ToolOutcome::fail(format!(
                        "cannot delete {}: not a readable file",
                        path.display()
                    ));
                };
                if let Err(e) = fs::remove_file(&path).await {
                    return ToolOutcome::fail(format!("failed to delete {}: {e}", path.display()));
                }
                if let Err(e) = journal.record_file_delete(&run_id, &path, &before) {
                    tracing::warn!("journal write failed: {e}");
                }
                ToolOutcome::ok(json!({ "path": path.display().to_string(), "deleted": true }))
            }

            Operation::Move => {
                let Some(dest) = params.destination else {
                    return ToolOutcome::fail("move requires 'destination'");
                };
                let dest = ctx.resolve_path(&dest);
                if let Err(e) = ctx.services.sandbox.check(&Effect::Filesystem { path: &dest }) {
                    return ToolOutcome::fail(e.to_string());
                }
                let Ok(content) = fs::read_to_string(&path).await else {
                    return ToolOutcome::fail(format!(
                        "cannot move {}: not a readable file",
                        path.display()
                    ));
                };
                if let Err(e) = fs::rename(&path, &dest).await {
                    return ToolOutcome::fail(format!("move failed: {e}"));
                }
                // Journaled as delete + create so each side rolls back.
                if let Err(e) = journal.record_file_delete(&run_id, &path, &content) {
                    tracing::warn!("journal write failed: {e}");
                }
                if let Err(e) = journal.record_file_create(&run_id, &dest, &content) {
                    tracing::warn!("journal write failed: {e}");
                }
                ToolOutcome::ok(json!({
                    "from": path.display().to_string(),
                    "to": dest.display().to_string(),
                }))
            }

            Operation::Copy => {
                let Some(dest) = params.destination else {
                    return ToolOutcome::fail("copy requires 'destination'");
                };
                let dest = ctx.resolve_path(&dest);
                if let Err(e) = ctx.services.sandbox.check(&Effect::Filesystem { path: &dest }) {
                    return ToolOutcome::fail(e.to_string());
                }
                let Ok(content) = fs::read_to_string(&path).await else {
                    return ToolOutcome::fail(format!(
                        "cannot copy {}: not a readable file",
                        path.display()
                    ));
                };
                if let Err(e) = fs::copy(&path, &dest).await {
                    return ToolOutcome::fail(format!("copy failed: {e}"));
                }
                if let Err(e) = journal.record_file_create(&run_id, &dest, &content) {
                    tracing::warn!("journal write failed: {e}");
                }
                ToolOutcome::ok(json!({
                    "from": path.display().to_string(),
                    "to": dest.display().to_string(),
                }))
            }
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
            RuntimeServices::open_at(tmp.path(), SandboxPolicy::new(tmp.path().join("ws")))
                .unwrap();
        ToolContext::new(
            RunContext::new("fs test").with_working_dir(tmp.path().join("ws")),
            services,
        )
    }

    #[tokio::test]
    async fn write_then_read_round_trips_and_journals() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        let tool = FilesystemTool;

        let write = tool
            .execute(
                json!({"operation": "write", "path": "notes.txt", "content": "hello"}),
                &ctx,
            )
            .await;
        assert!(write.success, "{:?}", write.error);

        let read = tool
            .execute(json!({"operation": "read", "path": "notes.txt"}), &ctx)
            .await;
        assert_eq!(read.payload()["content"], "hello");

        let entries = ctx.services.journal.entries(ctx.run_id()).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].reversible);
    }

    #[tokio::test]
    async fn second_write_is_journaled_as_modify_with_backup() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        let tool = FilesystemTool;

        for content in ["v1", "v2"] {
            let outcome = tool
                .execute(
                    json!({"operation": "write", "path": "a.txt", "content": content}),
                    &ctx,
                )
                .await;
            assert!(outcome.success);
        }

        let entries = ctx.services.journal.entries(ctx.run_id()).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[1].backup_path().is_some());
        assert_eq!(entries[1].before.as_deref(), Some("v1"));
    }

    #[tokio::test]
    async fn paths_outside_sandbox_are_denied_without_effect() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        let tool = FilesystemTool;

        let outcome = tool
            .execute(
                json!({"operation": "write", "path": "/etc/passwd", "content": "x"}),
                &ctx,
            )
            .await;
        assert!(!outcome.success);
        assert_eq!(
            outcome.error.as_deref(),
            Some("Denied: path_outside_sandbox")
        );
        assert!(ctx.services.journal.entries(ctx.run_id()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn move_journals_both_sides() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        let tool = FilesystemTool;

        tool.execute(
            json!({"operation": "write", "path": "src.txt", "content": "payload"}),
            &ctx,
        )
        .await;
        let outcome = tool
            .execute(
                json!({"operation": "move", "path": "src.txt", "destination": "dst.txt"}),
                &ctx,
            )
            .await;
        assert!(outcome.success);
        assert!(!tmp.path().join("ws/src.txt").exists());
        assert!(tmp.path().join("ws/dst.txt").exists());

        let entries = ctx.services.journal.entries(ctx.run_id()).unwrap();
        // write + delete + create
        assert_eq!(entries.len(), 3);
    }
}
