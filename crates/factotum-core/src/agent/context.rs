//! Run context and budgets

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

/// Identity and lifetime of one orchestration run.
///
/// Cheap to clone; the cancellation token is shared between clones, so
/// cancelling any clone cancels the run at its next suspension point.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub objective: String,
    pub working_dir: PathBuf,
    pub started_at: DateTime<Utc>,
    pub cancel: CancellationToken,
}

impl RunContext {
    pub fn new(objective: impl Into<String>) -> Self {
        Self {
            run_id: format!("run-{}", uuid::Uuid::new_v4()),
            objective: objective.into(),
            working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            started_at: Utc::now(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Strict upper bounds for one run.
#[derive(Debug, Clone, Copy)]
pub struct RunBudgets {
    pub max_iterations: usize,
    pub max_tool_calls: usize,
}

impl Default for RunBudgets {
    fn default() -> Self {
        Self {
            max_iterations: 25,
            max_tool_calls: 50,
        }
    }
}

/// Options accepted by `run_objective`.
#[derive(Debug, Clone, Default)]
pub struct AgentOptions {
    pub budgets: RunBudgets,
    /// Per-run model override passed through to the router.
    pub model: Option<String>,
    /// Skip routing rules and use this provider when available.
    pub force_provider: Option<String>,
    /// Replace the built-in system prompt.
    pub system_prompt: Option<String>,
    pub working_dir: Option<PathBuf>,
}

/// Outcome of one agent run.
#[derive(Debug, Clone)]
pub struct AgentResult {
    pub success: bool,
    pub final_response: String,
    pub iterations: usize,
    pub tool_calls: usize,
    pub errors: Vec<String>,
    pub context: RunContext,
    /// Full conversation history, usable to continue the exchange via `chat`.
    pub messages: Vec<crate::ai::types::ChatMessage>,
}
