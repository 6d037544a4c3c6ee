//! OpenAI chat-completions adapter
//!
//! Tool results use the dedicated `tool` role with `tool_call_id`; tool
//! arguments travel as JSON-encoded strings in both directions.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use super::{handle_error_response, http_client, Provider};
use crate::ai::types::{
    ChatMessage, Completion, CompletionRequest, FinishReason, Role, ToolCall, ToolSpec, Usage,
};
use crate::config::ProviderSettings;

const DEFAULT_MODEL: &str = "gpt-4o";
const API_URL: &str = "https://api.openai.com/v1/chat/completions";

pub struct OpenAiProvider {
    api_key: Option<String>,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
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
            match msg.role {
                Role::System => messages.push(json!({
                    "role": "system",
                    "content": msg.content,
                })),
                Role::User => messages.push(json!({
                    "role": "user",
                    "content": msg.content,
                })),
                Role::Assistant => messages.push(convert_assistant(msg)),
                Role::Tool => messages.push(json!({
                    "role": "tool",
                    "tool_call_id": msg.tool_call_id.clone().unwrap_or_default(),
                    "content": msg.content,
                })),
            }
        }

        let mut body = json!({
            "model": model,
            "max_tokens": request.max_tokens,
            "messages": messages,
        });
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

    pub(crate) fn parse_response(json: &Value) -> (String, Vec<ToolCall>, FinishReason, Option<Usage>) {
        let choice = json
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|arr| arr.first());

        let message = choice.and_then(|c| c.get("message"));
        let text = message
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .unwrap_or_default()
            .to_string();

        let mut tool_calls = Vec::new();
        if let Some(calls) = message
            .and_then(|m| m.get("tool_calls"))
            .and_then(|t| t.as_array())
        {
            for call in calls {
                let function = call.get("function");
                // Arguments arrive as a JSON string; a parse failure falls
                // back to an empty object rather than losing the call.
                let arguments = function
                    .and_then(|f| f.get("arguments"))
                    .and_then(|a| a.as_str())
                    .and_then(|raw| serde_json::from_str(raw).ok())
                    .unwrap_or(json!({}));
                tool_calls.push(ToolCall {
                    id: call
                        .get("id")
                        .and_then(|i| i.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    name: function
                        .and_then(|f| f.get("name"))
                        .and_then(|n| n.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    arguments,
                });
            }
        }

        let finish = match choice
            .and_then(|c| c.get("finish_reason"))
            .and_then(|r| r.as_str())
        {
            Some("stop") => FinishReason::Stop,
            Some("tool_calls") => FinishReason::ToolCalls,
            Some("length") => FinishReason::Length,
            _ => FinishReason::Error,
        };

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

        (text, tool_calls, finish, usage)
    }
}

fn convert_assistant(msg: &ChatMessage) -> Value {
    if msg.tool_calls.is_empty() {
        return json!({ "role": "assistant", "content": msg.content });
    }
    let calls: Vec<Value> = msg
        .tool_calls
        .iter()
        .map(|call| {
            json!({
                "id": call.id,
                "type": "function",
                "function": {
                    "name": call.name,
                    "arguments": call.arguments.to_string(),
                }
            })
        })
        .collect();
    let mut obj = json!({ "role": "assistant", "tool_calls": calls });
    if !msg.content.is_empty() {
        obj["content"] = json!(msg.content);
    }
    obj
}

fn convert_tool(tool: &ToolSpec) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.input_schema,
        }
    })
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
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
            .ok_or_else(|| anyhow::anyhow!("openai: no API key configured"))?;
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
