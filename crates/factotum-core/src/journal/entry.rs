//! Journal record types

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sentinel before-state for newly created files.
pub const BEFORE_NULL: &str = "null";

/// Prefix of synthetic records appended by a successful rollback.
pub const ROLLBACK_ID_PREFIX: &str = "rollback-";

/// What kind of effect an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    FileCreate,
    FileModify,
    FileDelete,
    DirectoryCreate,
    TerminalCommand,
    BrowserAction,
    EmailSend,
    CalendarEvent,
    ChatMessage,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::FileCreate => "file_create",
            ActionKind::FileModify => "file_modify",
            ActionKind::FileDelete => "file_delete",
            ActionKind::DirectoryCreate => "directory_create",
            ActionKind::TerminalCommand => "terminal_command",
            ActionKind::BrowserAction => "browser_action",
            ActionKind::EmailSend => "email_send",
            ActionKind::CalendarEvent => "calendar_event",
            ActionKind::ChatMessage => "chat_message",
        }
    }
}

/// One recorded action. Serialized as a single JSONL line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: String,
    pub timestamp: String,
    pub run_id: String,
    pub action: ActionKind,
    /// Target path, recipient, or command depending on the action kind.
    pub target: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    pub reversible: bool,
    #[serde(default)]
    pub rolled_back: bool,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub metadata: Value,
}

impl JournalEntry {
    /// Synthetic records (appended on rollback) are never themselves rolled back.
    pub fn is_synthetic(&self) -> bool {
        self.id.starts_with(ROLLBACK_ID_PREFIX)
    }

    /// Path of the backup artifact, when one was written.
    pub fn backup_path(&self) -> Option<&str> {
        self.metadata.get("backup_path").and_then(|v| v.as_str())
    }
}

/// Per-run aggregate for the journal tool's `summary` operation.
#[derive(Debug, Clone, Serialize)]
pub struct JournalSummary {
    pub run_id: String,
    pub total: usize,
    pub reversible: usize,
    pub rolled_back: usize,
    pub by_kind: std::collections::BTreeMap<String, usize>,
}

/// One row of the journal tool's `list_runs` operation.
#[derive(Debug, Clone, Serialize)]
pub struct RunListing {
    pub run_id: String,
    pub entries: usize,
}
