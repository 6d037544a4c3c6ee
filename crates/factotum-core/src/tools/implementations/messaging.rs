//! Outbound tools: email, calendar, chat, notify
//!
//! All four delegate to the injected `OutboundAdapter` and journal the send
//! as a non-reversible action. Delivery is fire-and-forget.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::audit::event_types;
use crate::tools::registry::{parse_params, Tool, ToolContext, ToolOutcome};

// ── email ──────────────────────────────────────────────────────────────

pub struct EmailTool;

#[derive(Deserialize)]
struct EmailParams {
    to: String,
    subject: String,
    body: String,
}

#[async_trait]
impl Tool for EmailTool {
    fn name(&self) -> &str {
        "email"
    }

    fn description(&self) -> &str {
        "Send an email through the configured mail adapter."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "to": {"type": "string"},
                "subject": {"type": "string"},
                "body": {"type": "string"}
            },
            "required": ["to", "subject", "body"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutcome {
        let params = match parse_params::<EmailParams>(args) {
            Ok(p) => p,
            Err(e) => return e,
        };
        match ctx
            .services
            .outbound
            .send_email(&params.to, &params.subject, &params.body)
            .await
        {
            Ok(reference) => {
                if let Err(e) = ctx.services.journal.record_email_send(
                    ctx.run_id(),
                    &params.to,
                    &params.subject,
                ) {
                    tracing::warn!("journal write failed: {e}");
                }
                ToolOutcome::ok(json!({ "sent": true, "reference": reference }))
            }
            Err(e) => ToolOutcome::fail(format!("email failed: {e}")),
        }
    }
}

// ── calendar ───────────────────────────────────────────────────────────

pub struct CalendarTool;

#[derive(Deserialize)]
struct CalendarParams {
    title: String,
    start: String,
    end: Option<String>,
}

#[async_trait]
impl Tool for CalendarTool {
    fn name(&self) -> &str {
        "calendar"
    }

    fn description(&self) -> &str {
        "Create a calendar event through the configured calendar adapter."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": {"type": "string"},
                "start": {"type": "string", "description": "ISO-8601 start time"},
                "end": {"type": "string", "description": "ISO-8601 end time"}
            },
            "required": ["title", "start"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutcome {
        let params = match parse_params::<CalendarParams>(args) {
            Ok(p) => p,
            Err(e) => return e,
        };
        match ctx
            .services
            .outbound
            .create_event(&params.title, &params.start, params.end.as_deref())
            .await
        {
            Ok(reference) => {
                if let Err(e) = ctx.services.journal.record_calendar_event(
                    ctx.run_id(),
                    &params.title,
                    &params.start,
                ) {
                    tracing::warn!("journal write failed: {e}");
                }
                ToolOutcome::ok(json!({ "created": true, "reference": reference }))
            }
            Err(e) => ToolOutcome::fail(format!("calendar failed: {e}")),
        }
    }
}

// ── chat ───────────────────────────────────────────────────────────────

pub struct ChatTool;

#[derive(Deserialize)]
struct ChatParams {
    channel: String,
    message: String,
}

#[async_trait]
impl Tool for ChatTool {
    fn name(&self) -> &str {
        "chat"
    }

    fn description(&self) -> &str {
        "Post a message to a chat channel through the configured adapter."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "channel": {"type": "string"},
                "message": {"type": "string"}
            },
            "required": ["channel", "message"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutcome {
        let params = match parse_params::<ChatParams>(args) {
            Ok(p) => p,
            Err(e) => return e,
        };
        match ctx
            .services
            .outbound
            .send_chat(&params.channel, &params.message)
            .await
        {
            Ok(reference) => {
                if let Err(e) = ctx.services.journal.record_chat_message(
                    ctx.run_id(),
                    &params.channel,
                    &params.message,
                ) {
                    tracing::warn!("journal write failed: {e}");
                }
                ToolOutcome::ok(json!({ "posted": true, "reference": reference }))
            }
            Err(e) => ToolOutcome::fail(format!("chat failed: {e}")),
        }
    }
}

// ── notify ─────────────────────────────────────────────────────────────

pub struct NotifyTool;

#[derive(Deserialize)]
struct NotifyParams {
    title: String,
    message: String,
}

#[async_trait]
impl Tool for NotifyTool {
    fn name(&self) -> &str {
        "notify"
    }

    fn description(&self) -> &str {
        "Raise a user-facing notification."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": {"type": "string"},
                "message": {"type": "string"}
            },
            "required": ["title", "message"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutcome {
        let params = match parse_params::<NotifyParams>(args) {
            Ok(p) => p,
            Err(e) => return e,
        };
        match ctx
            .services
            .outbound
            .notify(&params.title, &params.message)
            .await
        {
            Ok(reference) => {
                ctx.services.audit.info(
                    ctx.run_id(),
                    event_types::NOTIFICATION_SENT,
                    &params.title,
                    json!({ "reference": reference }),
                );
                ToolOutcome::ok(json!({ "notified": true, "reference": reference }))
            }
            Err(e) => ToolOutcome::fail(format!("notify failed: {e}")),
        }
    }
}
