//! Think tool - record a reasoning note. Pure; no side effect.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::tools::registry::{parse_params, Tool, ToolContext, ToolOutcome};

pub struct ThinkTool;

#[derive(Deserialize)]
struct Params {
    thought: String,
}

#[async_trait]
impl Tool for ThinkTool {
    fn name(&self) -> &str {
        "think"
    }

    fn description(&self) -> &str {
        "Record a reasoning note before acting. Has no side effects."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "thought": {"type": "string", "description": "The reasoning note"}
            },
            "required": ["thought"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutcome {
        let params = match parse_params::<Params>(args) {
            Ok(p) => p,
            Err(e) => return e,
        };
        tracing::debug!(run_id = %ctx.run_id(), "thought: {}", params.thought);
        ToolOutcome::ok(json!({ "recorded": true }))
    }
}
