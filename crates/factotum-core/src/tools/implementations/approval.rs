//! Approval tool
//!
//! Low-impact actions auto-approve; anything higher is parked as pending,
//! audited, and surfaced through the notification adapter. The durable
//! approval queue belongs to the dashboard layer.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::audit::event_types;
use crate::tools::registry::{parse_params, Tool, ToolContext, ToolOutcome};

pub struct RequestApprovalTool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Impact {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Deserialize)]
struct Params {
    action: String,
    reason: String,
    impact: Impact,
}

#[async_trait]
impl Tool for RequestApprovalTool {
    fn name(&self) -> &str {
        "request_approval"
    }

    fn description(&self) -> &str {
        "Ask for approval before a consequential action. Low impact is \
         auto-approved; medium and above waits for a human."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {"type": "string", "description": "What you want to do"},
                "reason": {"type": "string", "description": "Why it is needed"},
                "impact": {
                    "type": "string",
                    "enum": ["low", "medium", "high", "critical"]
                }
            },
            "required": ["action", "reason", "impact"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutcome {
        let params = match parse_params::<Params>(args) {
            Ok(p) => p,
            Err(e) => return e,
        };

        if params.impact == Impact::Low {
            return ToolOutcome::ok(json!({
                "approved": true,
                "mode": "auto",
                "action": params.action,
            }));
        }

        ctx.services.audit.info(
            ctx.run_id(),
            event_types::APPROVAL_REQUESTED,
            &format!("Approval requested: {}", params.action),
            json!({
                "action": params.action,
                "reason": params.reason,
                "impact": format!("{:?}", params.impact).to_lowercase(),
            }),
        );

        if let Err(e) = ctx
            .services
            .outbound
            .notify(
                "Approval required",
                &format!("{} — {}", params.action, params.reason),
            )
            .await
        {
            tracing::warn!("approval notification failed: {e}");
        }

        ToolOutcome::ok(json!({
            "approved": false,
            "status": "pending",
            "action": params.action,
        }))
    }
}
