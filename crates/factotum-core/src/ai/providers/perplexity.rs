//! Perplexity adapter
//!
//! Search-optimized, OpenAI-dialect endpoint without native tool calls.
//! When tools are requested, the adapter appends a strict-JSON envelope
//! instruction and parses the envelope back into neutral tool calls; a
//! response without an envelope falls through as a plain assistant turn.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use super::{handle_error_response, http_client, Provider};
use crate::ai::types::{
    ChatMessage, Completion, CompletionRequest, FinishReason, Role, ToolCall, Usage,
};
use crate::config::ProviderSettings;

const DEFAULT_MODEL: &str = "sonar-pro";
const API_URL: &str = "https://api.perplexity.ai/chat/completions";

pub struct PerplexityProvider {
    api_key: Option<String>,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl PerplexityProvider {
    pub fn from_settings(settings: &ProviderSettings) -> Self {
        Self {
            api_key: settings.api_key.clone(),
            model: settings
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: API_URL.to_string(),
            client: http_client(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub(crate) fn build_body(request: &CompletionRequest, model: &str) -> Value {
        let mut messages: Vec<Value> = Vec::new();
        for msg in &request.messages {
            let role = match msg.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
                // No tool role here; results are relayed as user turns.
                Role::Tool => "user",
            };
            let content = if msg.role == Role::Tool {
                format!(
                    "Result of tool call {}: {}",
                    msg.tool_call_id.as_deref().unwrap_or("unknown"),
                    msg.content
                )
            } else {
                msg.content.clone()
            };
            if content.is_empty() {
                continue;
            }
            messages.push(json!({"role": role, "content": content}));
        }

        if !request.tools.is_empty() {
            messages.push(json!({
                "role": "system",
                "content": envelope_instruction(request),
            }));
        }

        let mut body = json!({
            "model": model,
            "max_tokens": request.max_tokens,
            "messages": messages,
        });
        if let Some(temp) = request.temperature {
            body["temperature"] = json!(temp);
        }
        body
    }
}

fn envelope_instruction(request: &CompletionRequest) -> String {
    let catalog: Vec<Value> = request
        .tools
        .iter()
        .map(|t| json!({"name": t.name, "description": t.description, "schema": t.input_schema}))
        .collect();
    format!(
        "You can invoke tools. To do so, reply with ONLY a JSON object of the exact form \
         {{\"tool_calls\": [{{\"name\": \"<tool>\", \"arguments\": {{...}}}}]}} and nothing else. \
         If no tool is needed, reply in plain prose. Available tools: {}",
        Value::Array(catalog)
    )
}

/// Parse the strict JSON envelope out of assistant text.
///
/// Accepts the whole message being the envelope, or an envelope embedded in
/// surrounding prose (first `{` to last `}`). Returns None when no
/// well-formed envelope is present.
pub(crate) fn parse_tool_envelope(text: &str) -> Option<Vec<ToolCall>> {
    let candidate = serde_json::from_str::<Value>(text.trim()).ok().or_else(|| {
        let start = text.find('{')?;
        let end = text.rfind('}')?;
        serde_json::from_str(&text[start..=end]).ok()
    })?;

    let calls = candidate.get("tool_calls")?.as_array()?;
    let mut parsed = Vec::new();
    for (idx, call) in calls.iter().enumerate() {
        let name = call.get("name")?.as_str()?.to_string();
        let arguments = call.get("arguments").cloned().unwrap_or(json!({}));
        parsed.push(ToolCall {
            id: format!("pplx-{idx}"),
            name,
            arguments,
        });
    }
    if parsed.is_empty() {
        return None;
    }
    Some(parsed)
}

#[async_trait]
impl Provider for PerplexityProvider {
    fn name(&self) -> &str {
        "perplexity"
    }

    fn available(&self) -> bool {
        self.api_key.is_some()
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("perplexity: no API key configured"))?;
        let model = request.model.as_deref().unwrap_or(&self.model);
        let body = Self::build_body(request, model);

        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(key)
            .json(&body)
            .send()
            .await?;
        let response = handle_error_response(self.name(), response).await?;
        let json: Value = response.json().await?;

        let text = json
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|arr| arr.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .unwrap_or_default()
            .to_string();

        let usage = json.get("usage").map(|u| Usage {
            prompt_tokens: u
                .get("prompt_tokens")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as usize,
            completion_tokens: u
                .get("completion_tokens")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as usize,
            total_tokens: u.get("total_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as usize,
        });

        let synthesized = if request.tools.is_empty() {
            None
        } else {
            parse_tool_envelope(&text)
        };
        let (message, finish_reason) = match synthesized {
            Some(calls) => (
                ChatMessage::assistant_with_tools(String::new(), calls),
                FinishReason::ToolCalls,
            ),
            None => (ChatMessage::assistant(text), FinishReason::Stop),
        };

        Ok(Completion {
            provider: self.name().to_string(),
            model: model.to_string(),
            message,
            usage,
            finish_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::types::ToolSpec;

    #[test]
    fn envelope_instruction_is_appended_when_tools_present() {
        let request = CompletionRequest::new(vec![ChatMessage::user("search rust news")])
            .with_tools(vec![ToolSpec {
                name: "search".into(),
                description: "Web search".into(),
                input_schema: json!({"type": "object"}),
            }]);
        let body = PerplexityProvider::build_body(&request, "m");
        let messages = body["messages"].as_array().unwrap();
        let last = messages.last().unwrap();
        assert_eq!(last["role"], "system");
        assert!(last["content"].as_str().unwrap().contains("tool_calls"));
    }

    #[test]
    fn bare_envelope_is_parsed() {
        let text = r#"{"tool_calls": [{"name": "search", "arguments": {"query": "rust"}}]}"#;
        let calls = parse_tool_envelope(text).unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "pplx-0");
        assert_eq!(calls[0].arguments, json!({"query": "rust"}));
    }

    #[test]
    fn embedded_envelope_is_parsed() {
        let text = "Sure, invoking now:\n{\"tool_calls\": [{\"name\": \"think\", \"arguments\": {}}]}";
        let calls = parse_tool_envelope(text).unwrap();
        assert_eq!(calls[0].name, "think");
    }

    #[test]
    fn prose_without_envelope_falls_through() {
        assert!(parse_tool_envelope("The capital of France is Paris.").is_none());
        assert!(parse_tool_envelope("{\"other\": 1}").is_none());
    }
}
