//! Process-exec adapter for a locally installed LM command-line tool
//!
//! Concatenates the message list into one prompt and runs the tool as a
//! child process with a fixed timeout. Stdout becomes the assistant
//! message. No tool-call support; finish reason is always `stop`.

use std::process::Stdio;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::process::Command;

use super::{Provider, PROVIDER_TIMEOUT};
use crate::ai::types::{ChatMessage, Completion, CompletionRequest, FinishReason, Role};

const BINARY: &str = "claude";

pub struct ClaudeCliProvider {
    binary: String,
}

impl ClaudeCliProvider {
    pub fn new() -> Self {
        Self {
            binary: BINARY.to_string(),
        }
    }

    /// Flatten the conversation into a single prompt, preserving roles.
    pub(crate) fn flatten_prompt(request: &CompletionRequest) -> String {
        let mut prompt = String::new();
        for msg in &request.messages {
            let label = match msg.role {
                Role::System => "[system]",
                Role::User => "[user]",
                Role::Assistant => "[assistant]",
                Role::Tool => "[tool result]",
            };
            if msg.content.is_empty() {
                continue;
            }
            prompt.push_str(label);
            prompt.push('\n');
            prompt.push_str(&msg.content);
            prompt.push_str("\n\n");
        }
        prompt
    }
}

impl Default for ClaudeCliProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for ClaudeCliProvider {
    fn name(&self) -> &str {
        "claude-cli"
    }

    fn available(&self) -> bool {
        which::which(&self.binary).is_ok()
    }

    fn default_model(&self) -> &str {
        "cli-default"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let prompt = Self::flatten_prompt(request);

        let child = Command::new(&self.binary)
            .arg("-p")
            .arg(&prompt)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| anyhow!("failed to spawn {}: {e}", self.binary))?;

        let output = tokio::time::timeout(PROVIDER_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| {
                anyhow!(
                    "{} timed out after {}s",
                    self.binary,
                    PROVIDER_TIMEOUT.as_secs()
                )
            })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                stderr.trim()
            ));
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(Completion {
            provider: self.name().to_string(),
            model: self.default_model().to_string(),
            message: ChatMessage::assistant(text),
            usage: None,
            finish_reason: FinishReason::Stop,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_flattening_labels_roles_and_skips_empty() {
        let request = CompletionRequest::new(vec![
            ChatMessage::system("be terse"),
            ChatMessage::user("hello"),
            ChatMessage::assistant(""),
        ]);
        let prompt = ClaudeCliProvider::flatten_prompt(&request);
        assert!(prompt.starts_with("[system]\nbe terse"));
        assert!(prompt.contains("[user]\nhello"));
        assert!(!prompt.contains("[assistant]"));
    }
}
