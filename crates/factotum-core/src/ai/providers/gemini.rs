//! Gemini generateContent adapter
//!
//! This dialect rejects several JSON-Schema keywords, so declared schemas
//! pass through hygiene before becoming functionDeclarations. It also has
//! no tool-call ids; the function name rides inside the synthesized id so
//! tool results can be converted back into functionResponse parts.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use super::{handle_error_response, http_client, Provider};
use crate::ai::schema::sanitize_schema;
use crate::ai::types::{
    ChatMessage, Completion, CompletionRequest, FinishReason, Role, ToolCall, Usage,
};
use crate::config::ProviderSettings;

const DEFAULT_MODEL: &str = "gemini-2.0-flash";
const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

const CALL_ID_PREFIX: &str = "gcall";

pub struct GeminiProvider {
    api_key: Option<String>,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn from_settings(settings: &ProviderSettings) -> Self {
        Self {
            api_key: settings.api_key.clone(),
            model: settings
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: API_BASE.to_string(),
            client: http_client(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub(crate) fn build_body(request: &CompletionRequest) -> Value {
        let system: String = request
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let mut contents: Vec<Value> = Vec::new();
        for msg in &request.messages {
            match msg.role {
                Role::System => {}
                Role::User => contents.push(json!({
                    "role": "user",
                    "parts": [{"text": msg.content}],
                })),
                Role::Assistant => {
                    let mut parts: Vec<Value> = Vec::new();
                    if !msg.content.is_empty() {
                        parts.push(json!({"text": msg.content}));
                    }
                    for call in &msg.tool_calls {
                        parts.push(json!({
                            "functionCall": {
                                "name": call.name,
                                "args": call.arguments,
                            }
                        }));
                    }
                    contents.push(json!({"role": "model", "parts": parts}));
                }
                Role::Tool => {
                    let name = msg
                        .tool_call_id
                        .as_deref()
                        .and_then(decode_call_name)
                        .unwrap_or("tool");
                    contents.push(json!({
                        "role": "user",
                        "parts": [{
                            "functionResponse": {
                                "name": name,
                                "response": {"content": msg.content},
                            }
                        }]
                    }));
                }
            }
        }

        let mut body = json!({
            "contents": contents,
            "generationConfig": {
                "maxOutputTokens": request.max_tokens,
            },
        });
        if !system.is_empty() {
            body["systemInstruction"] = json!({"parts": [{"text": system}]});
        }
        if let Some(temp) = request.temperature {
            body["generationConfig"]["temperature"] = json!(temp);
        }
        if !request.tools.is_empty() {
            let declarations: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "parameters": sanitize_schema(&t.input_schema),
                    })
                })
                .collect();
            body["tools"] = json!([{"functionDeclarations": declarations}]);
        }
        body
    }

    pub(crate) fn parse_response(json: &Value) -> (String, Vec<ToolCall>, FinishReason, Option<Usage>) {
        let candidate = json
            .get("candidates")
            .and_then(|c| c.as_array())
            .and_then(|arr| arr.first());

        let mut text = String::new();
        let mut tool_calls = Vec::new();

        if let Some(parts) = candidate
            .and_then(|c| c.get("content"))
            .and_then(|c| c.get("parts"))
            .and_then(|p| p.as_array())
        {
            for (idx, part) in parts.iter().enumerate() {
                if let Some(chunk) = part.get("text").and_then(|t| t.as_str()) {
                    text.push_str(chunk);
                }
                if let Some(call) = part.get("functionCall") {
                    let name = call
                        .get("name")
                        .and_then(|n| n.as_str())
                        .unwrap_or_default()
                        .to_string();
                    tool_calls.push(ToolCall {
                        id: encode_call_id(idx, &name),
                        arguments: call.get("args").cloned().unwrap_or(json!({})),
                        name,
                    });
                }
            }
        }

        let finish = match candidate
            .and_then(|c| c.get("finishReason"))
            .and_then(|r| r.as_str())
        {
            Some("STOP") => {
                if tool_calls.is_empty() {
                    FinishReason::Stop
                } else {
                    FinishReason::ToolCalls
                }
            }
            Some("MAX_TOKENS") => FinishReason::Length,
            None if !tool_calls.is_empty() => FinishReason::ToolCalls,
            None => FinishReason::Stop,
            _ => FinishReason::Error,
        };

        let usage = json.get("usageMetadata").map(|u| Usage {
            prompt_tokens: u
                .get("promptTokenCount")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as usize,
            completion_tokens: u
                .get("candidatesTokenCount")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as usize,
            total_tokens: u
                .get("totalTokenCount")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as usize,
        });

        (text, tool_calls, finish, usage)
    }
}

fn encode_call_id(idx: usize, name: &str) -> String {
    format!("{CALL_ID_PREFIX}-{idx}-{name}")
}

fn decode_call_name(id: &str) -> Option<&str> {
    let rest = id.strip_prefix(CALL_ID_PREFIX)?.strip_prefix('-')?;
    let (_, name) = rest.split_once('-')?;
    Some(name)
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
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
            .ok_or_else(|| anyhow::anyhow!("gemini: no API key configured"))?;
        let model = request.model.as_deref().unwrap_or(&self.model);
        let url = format!("{}/{}:generateContent?key={}", self.base_url, model, key);
        let body = Self::build_body(request);

        let response = self.client.post(&url).json(&body).send().await?;
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
