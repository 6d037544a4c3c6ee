//! Anthropic messages API adapter
//!
//! Tool results have no dedicated role in this dialect; they are embedded
//! as structured user turns referencing the prior tool-use id.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use super::{handle_error_response, http_client, Provider};
use crate::ai::types::{
    ChatMessage, Completion, CompletionRequest, FinishReason, Role, ToolCall, ToolSpec, Usage,
};
use crate::config::ProviderSettings;

const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    api_key: Option<String>,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
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

    /// Point the adapter at a different endpoint (tests, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Build the request body for this dialect.
    pub(crate) fn build_body(request: &CompletionRequest, model: &str) -> Value {
        let system: String = request
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let mut messages: Vec<Value> = Vec::new();
        for msg in &request.messages {
            match msg.role {
                Role::System => {}
                Role::User => messages.push(json!({
                    "role": "user",
                    "content": msg.content,
                })),
                Role::Assistant => messages.push(convert_assistant(msg)),
                Role::Tool => {
                    // Tool results ride in a user turn referencing the call id.
                    let tool_use_id = msg.tool_call_id.clone().unwrap_or_default();
                    messages.push(json!({
                        "role": "user",
                        "content": [{
                            "type": "tool_result",
                            "tool_use_id": tool_use_id,
                            "content": msg.content,
                        }]
                    }));
                }
            }
        }

        let mut body = json!({
            "model": model,
            "max_tokens": request.max_tokens,
            "messages": messages,
        });
        if !system.is_empty() {
            body["system"] = json!(system);
        }
        if let Some(temp) = request.temperature {
            body["temperature"] = json!(temp);
        }
        if !request.tools.is_empty() {
            body["tools"] = json!(request
                .tools
                .iter()
                .map(convert_tool)
                .collect::<Vec<Value>>());
        }
        body
    }

    /// Walk the response content blocks into the neutral shape.
    pub(crate) fn parse_response(json: &Value) -> (String, Vec<ToolCall>, FinishReason, Option<Usage>) {
        let mut text = String::new();
        let mut tool_calls = Vec::new();

        if let Some(blocks) = json.get("content").and_then(|c| c.as_array()) {
            for block in blocks {
                match block.get("type").and_then(|t| t.as_str()) {
                    Some("text") => {
                        if let Some(chunk) = block.get("text").and_then(|t| t.as_str()) {
                            text.push_str(chunk);
                        }
                    }
                    Some("tool_use") => {
                        tool_calls.push(ToolCall {
                            id: block
                                .get("id")
                                .and_then(|i| i.as_str())
                                .unwrap_or_default()
                                .to_string(),
                            name: block
                                .get("name")
                                .and_then(|n| n.as_str())
                                .unwrap_or_default()
                                .to_string(),
                            arguments: block.get("input").cloned().unwrap_or(json!({})),
                        });
                    }
                    _ => {}
                }
            }
        }

        let finish = match json.get("stop_reason").and_then(|r| r.as_str()) {
            Some("end_turn") | Some("stop_sequence") => FinishReason::Stop,
            Some("tool_use") => FinishReason::ToolCalls,
            Some("max_tokens") => FinishReason::Length,
            _ => FinishReason::Error,
        };

        let usage = json.get("usage").map(|u| {
            let prompt = u.get("input_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
            let completion = u.get("output_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
            Usage {
                prompt_tokens: prompt,
                completion_tokens: completion,
                total_tokens: prompt + completion,
            }
        });

        (text, tool_calls, finish, usage)
    }
}

fn convert_assistant(msg: &ChatMessage) -> Value {
    if msg.tool_calls.is_empty() {
        return json!({ "role": "assistant", "content": msg.content });
    }
    let mut blocks: Vec<Value> = Vec::new();
    if !msg.content.is_empty() {
        blocks.push(json!({ "type": "text", "text": msg.content }));
    }
    for call in &msg.tool_calls {
        blocks.push(json!({
            "type": "tool_use",
            "id": call.id,
            "name": call.name,
            "input": call.arguments,
        }));
    }
    json!({ "role": "assistant", "content": blocks })
}

fn convert_tool(tool: &ToolSpec) -> Value {
    json!({
        "name": tool.name,
        "description": tool.description,
        "input_schema": tool.input_schema,
    })
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
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
            .ok_or_else(|| anyhow::anyhow!("anthropic: no API key configured"))?;
        let model = request.model.as_deref().unwrap_or(&self.model);
        let body = Self::build_body(request, model);

        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await?;
        let response = handle_error_response(self.name(), response).await?;
        let json: Value = response.json().await?;

        let (text, tool_calls, finish_reason, usage) = Self::parse_response(&json);
        let message = if tool_calls.is_empty() {
            ChatMessage::assistant(text)
        } else {
            ChatMessage::assistant_with_tools(text, tool_calls)
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

    fn request_with_history() -> CompletionRequest {
        CompletionRequest::new(vec![
            ChatMessage::system("be helpful"),
            ChatMessage::user("list the files"),
            ChatMessage::assistant_with_tools(
                "",
                vec![ToolCall {
                    id: "toolu_1".into(),
                    name: "filesystem".into(),
                    arguments: json!({"operation": "list", "path": "."}),
                }],
            ),
            ChatMessage::tool("toolu_1", "[\"a.txt\"]"),
        ])
    }

    #[test]
    fn tool_results_become_user_turns_with_tool_use_id() {
        let body = AnthropicProvider::build_body(&request_with_history(), "m");
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);

        let last = &messages[2];
        assert_eq!(last["role"], "user");
        assert_eq!(last["content"][0]["type"], "tool_result");
        assert_eq!(last["content"][0]["tool_use_id"], "toolu_1");
    }

    #[test]
    fn system_messages_fold_into_the_system_field() {
        let body = AnthropicProvider::build_body(&request_with_history(), "m");
        assert_eq!(body["system"], "be helpful");
        assert_eq!(body["model"], "m");
    }

    #[test]
    fn assistant_tool_calls_become_tool_use_blocks() {
        let body = AnthropicProvider::build_body(&request_with_history(), "m");
        let assistant = &body["messages"][1];
        assert_eq!(assistant["content"][0]["type"], "tool_use");
        assert_eq!(assistant["content"][0]["name"], "filesystem");
    }

    #[test]
    fn parse_response_extracts_text_and_calls() {
        let json = json!({
            "content": [
                {"type": "text", "text": "Working on it."},
                {"type": "tool_use", "id": "toolu_9", "name": "terminal",
                 "input": {"command": "ls"}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 10, "output_tokens": 5}
        });
        let (text, calls, finish, usage) = AnthropicProvider::parse_response(&json);
        assert_eq!(text, "Working on it.");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "terminal");
        assert_eq!(finish, FinishReason::ToolCalls);
        assert_eq!(usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn unknown_stop_reason_maps_to_error() {
        let json = json!({"content": [], "stop_reason": "refusal"});
        let (_, _, finish, _) = AnthropicProvider::parse_response(&json);
        assert_eq!(finish, FinishReason::Error);
    }
}
