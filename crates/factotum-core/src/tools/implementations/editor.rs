//! Editor tool
//!
//! In-place text edits: replace, insert, delete_lines, patch. Every
//! operation is journaled as a modify with full before/after content.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::fs;

use crate::sandbox::Effect;
use crate::tools::registry::{parse_params, Tool, ToolContext, ToolOutcome};

pub struct EditorTool;

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum Operation {
    Replace,
    Insert,
    DeleteLines,
    Patch,
}

#[derive(Deserialize)]
struct Edit {
    find: String,
    replace: String,
}

#[derive(Deserialize)]
struct Params {
    operation: Operation,
    path: String,
    find: Option<String>,
    replace: Option<String>,
    /// 1-based line number for insert.
    line: Option<usize>,
    text: Option<String>,
    start_line: Option<usize>,
    end_line: Option<usize>,
    /// Sequential find/replace pairs for patch.
    edits: Option<Vec<Edit>>,
}

#[async_trait]
impl Tool for EditorTool {
    fn name(&self) -> &str {
        "editor"
    }

    fn description(&self) -> &str {
        "Edit an existing file: replace text, insert at a line, delete a line \
         range, or apply a list of find/replace patches."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": ["replace", "insert", "delete_lines", "patch"]
                },
                "path": {"type": "string"},
                "find": {"type": "string", "description": "Text to find (replace)"},
                "replace": {"type": "string", "description": "Replacement text (replace)"},
                "line": {"type": "integer", "description": "1-based insertion line (insert)"},
                "text": {"type": "string", "description": "Text to insert (insert)"},
                "start_line": {"type": "integer", "description": "First line to delete, 1-based"},
                "end_line": {"type": "integer", "description": "Last line to delete, inclusive"},
                "edits": {
                    "type": "array",
                    "description": "Find/replace pairs applied in order (patch)",
                    "items": {
                        "type": "object",
                        "properties": {
                            "find": {"type": "string"},
                            "replace": {"type": "string"}
                        },
                        "required": ["find", "replace"]
                    }
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

        let before = match fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) => return ToolOutcome::fail(format!("cannot read {}: {e}", path.display())),
        };

        let (after, description) = match apply(&params, &before) {
            Ok(result) => result,
            Err(e) => return ToolOutcome::fail(e),
        };

        if let Err(e) = fs::write(&path, &after).await {
            return ToolOutcome::fail(format!("failed to write {}: {e}", path.display()));
        }
        if let Err(e) = ctx.services.journal.record_file_modify(
            ctx.run_id(),
            &path,
            &before,
            &after,
            &description,
        ) {
            tracing::warn!("journal write failed: {e}");
        }

        ToolOutcome::ok(json!({
            "path": path.display().to_string(),
            "description": description,
            "bytes": after.len(),
        }))
    }
}

fn apply(params: &Params, before: &str) -> Result<(String, String), String> {
    match params.operation {
        Operation::Replace => {
            let find = params.find.as_deref().ok_or("replace requires 'find'")?;
            let replace = params.replace.as_deref().ok_or("replace requires 'replace'")?;
            if !before.contains(find) {
                return Err(format!("text not found: {find}"));
            }
            let count = before.matches(find).count();
            Ok((
                before.replace(find, replace),
                format!("Replaced {count} occurrence(s)"),
            ))
        }
        Operation::Insert => {
            let line = params.line.ok_or("insert requires 'line'")?;
            let text = params.text.as_deref().ok_or("insert requires 'text'")?;
            let mut lines: Vec<&str> = before.lines().collect();
            let at = line.saturating_sub(1).min(lines.len());
            lines.insert(at, text);
            let mut joined = lines.join("\n");
            if before.ends_with('\n') {
                joined.push('\n');
            }
            Ok((joined, format!("Inserted 1 line at {line}")))
        }
        Operation::DeleteLines => {
            let start = params.start_line.ok_or("delete_lines requires 'start_line'")?;
            let end = params.end_line.ok_or("delete_lines requires 'end_line'")?;
            if start == 0 || end < start {
                return Err("invalid line range".to_string());
            }
            let lines: Vec<&str> = before.lines().collect();
            if start > lines.len() {
                return Err(format!("start_line {start} is past end of file"));
            }
            let kept: Vec<&str> = lines
                .iter()
                .enumerate()
                .filter(|(idx, _)| {
                    let n = idx + 1;
                    n < start || n > end
                })
                .map(|(_, l)| *l)
                .collect();
            let mut joined = kept.join("\n");
            if before.ends_with('\n') && !joined.is_empty() {
                joined.push('\n');
            }
            Ok((joined, format!("Deleted lines {start}-{end}")))
        }
        Operation::Patch => {
            let edits = params.edits.as_ref().ok_or("patch requires 'edits'")?;
            let mut current = before.to_string();
            for (idx, edit) in edits.iter().enumerate() {
                if !current.contains(&edit.find) {
                    return Err(format!("patch hunk {idx} not found: {}", edit.find));
                }
                current = current.replacen(&edit.find, &edit.replace, 1);
            }
            Ok((current, format!("Applied {} patch hunk(s)", edits.len())))
        }
    }
}
