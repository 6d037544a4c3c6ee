//! Outbound adapter seam
//!
//! Email, calendar, chat, and desktop notifications are delivered by
//! integration adapters that live outside this crate. The runtime talks to
//! them through this trait; the default implementation logs and accepts so
//! the rest of the pipeline (journal, audit) can be exercised end to end.
//! Delivery is fire-and-forget: no exactly-once guarantee.

use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait OutboundAdapter: Send + Sync {
    /// Send an email. Returns an adapter-specific delivery reference.
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<String>;

    /// Post a chat message to a channel.
    async fn send_chat(&self, channel: &str, message: &str) -> Result<String>;

    /// Create a calendar event. `start`/`end` are ISO-8601 strings.
    async fn create_event(&self, title: &str, start: &str, end: Option<&str>) -> Result<String>;

    /// Raise a user-facing notification.
    async fn notify(&self, title: &str, message: &str) -> Result<String>;
}

/// Default adapter: accepts everything and only logs.
pub struct LogOnlyOutbound;

#[async_trait]
impl OutboundAdapter for LogOnlyOutbound {
    async fn send_email(&self, to: &str, subject: &str, _body: &str) -> Result<String> {
        tracing::info!(to, subject, "outbound email accepted (log-only adapter)");
        Ok(format!("email-{}", uuid::Uuid::new_v4()))
    }

    async fn send_chat(&self, channel: &str, message: &str) -> Result<String> {
        tracing::info!(channel, len = message.len(), "outbound chat accepted (log-only adapter)");
        Ok(format!("chat-{}", uuid::Uuid::new_v4()))
    }

    async fn create_event(&self, title: &str, start: &str, _end: Option<&str>) -> Result<String> {
        tracing::info!(title, start, "calendar event accepted (log-only adapter)");
        Ok(format!("event-{}", uuid::Uuid::new_v4()))
    }

    async fn notify(&self, title: &str, _message: &str) -> Result<String> {
        tracing::info!(title, "notification accepted (log-only adapter)");
        Ok(format!("notice-{}", uuid::Uuid::new_v4()))
    }
}
