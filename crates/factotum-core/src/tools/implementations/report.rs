//! Report tool - structured user-visible status updates.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::audit::Severity;
use crate::tools::registry::{parse_params, Tool, ToolContext, ToolOutcome};

pub struct ReportTool;

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Kind {
    Progress,
    Complete,
    Error,
    Info,
    Question,
}

#[derive(Deserialize)]
struct Params {
    kind: Kind,
    message: String,
    data: Option<Value>,
}

#[async_trait]
impl Tool for ReportTool {
    fn name(&self) -> &str {
        "report"
    }

    fn description(&self) -> &str {
        "Report progress, completion, errors, info, or questions to the user."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "kind": {
                    "type": "string",
                    "enum": ["progress", "complete", "error", "info", "question"]
                },
                "message": {"type": "string"},
                "data": {"type": "object", "description": "Optional structured payload"}
            },
            "required": ["kind", "message"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutcome {
        let params = match parse_params::<Params>(args) {
            Ok(p) => p,
            Err(e) => return e,
        };

        let severity = match params.kind {
            Kind::Error => Severity::Error,
            _ => Severity::Info,
        };
        ctx.services.audit.record(
            ctx.run_id(),
            "REPORT",
            severity,
            &params.message,
            json!({
                "kind": format!("{:?}", params.kind).to_lowercase(),
                "data": params.data,
            }),
        );

        ToolOutcome::ok(json!({ "reported": true }))
    }
}
