//! Journal tool
//!
//! Lets the model inspect and undo its own recorded effects: list runs,
//! view entries, summarize, roll back a single entry or a whole run.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::tools::registry::{parse_params, Tool, ToolContext, ToolOutcome};

pub struct JournalTool;

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum Operation {
    ListRuns,
    View,
    Summary,
    RollbackEntry,
    RollbackRun,
}

#[derive(Deserialize)]
struct Params {
    operation: Operation,
    /// Defaults to the current run.
    run_id: Option<String>,
    entry_id: Option<String>,
}

#[async_trait]
impl Tool for JournalTool {
    fn name(&self) -> &str {
        "journal"
    }

    fn description(&self) -> &str {
        "Inspect the action journal and roll back reversible effects: \
         list_runs, view, summary, rollback_entry, rollback_run."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": ["list_runs", "view", "summary", "rollback_entry", "rollback_run"]
                },
                "run_id": {"type": "string", "description": "Defaults to the current run"},
                "entry_id": {"type": "string", "description": "Required for rollback_entry"}
            },
            "required": ["operation"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutcome {
        let params = match parse_params::<Params>(args) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let journal = &ctx.services.journal;
        let run_id = params.run_id.unwrap_or_else(|| ctx.run_id().to_string());

        match params.operation {
            Operation::ListRuns => match journal.list_runs() {
                Ok(runs) => ToolOutcome::ok(json!({ "runs": runs })),
                Err(e) => ToolOutcome::fail(format!("list_runs failed: {e}")),
            },
            Operation::View => match journal.entries(&run_id) {
                Ok(entries) => ToolOutcome::ok(json!({ "run_id": run_id, "entries": entries })),
                Err(e) => ToolOutcome::fail(format!("view failed: {e}")),
            },
            Operation::Summary => match journal.summary(&run_id) {
                Ok(summary) => ToolOutcome::ok(serde_json::to_value(summary).unwrap_or_default()),
                Err(e) => ToolOutcome::fail(format!("summary failed: {e}")),
            },
            Operation::RollbackEntry => {
                let Some(entry_id) = params.entry_id else {
                    return ToolOutcome::fail("rollback_entry requires 'entry_id'");
                };
                match journal.rollback_entry(&run_id, &entry_id) {
                    Ok(outcome) => {
                        ToolOutcome::ok(serde_json::to_value(outcome).unwrap_or_default())
                    }
                    Err(e) => ToolOutcome::fail(format!("rollback failed: {e}")),
                }
            }
            Operation::RollbackRun => match journal.rollback_run(&run_id) {
                Ok(report) => ToolOutcome::ok(serde_json::to_value(report).unwrap_or_default()),
                Err(e) => ToolOutcome::fail(format!("rollback_run failed: {e}")),
            },
        }
    }
}
