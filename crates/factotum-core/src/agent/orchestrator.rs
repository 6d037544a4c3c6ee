//! Agent loop — the canonical LM ↔ tool cycle
//!
//! Drives the conversation under iteration and tool-call budgets: ask the
//! router for a completion, append the assistant turn, dispatch any tool
//! calls through the registry, feed results back, repeat until the model
//! signals completion or a budget runs out. Tool failures are encoded into
//! tool results so the model can react; only router exhaustion and
//! cancellation terminate the run early.

use std::sync::Arc;

use serde_json::{json, Value};

use super::context::{AgentOptions, AgentResult, RunContext};
use crate::ai::router::Router;
use crate::ai::types::{ChatMessage, CompletionRequest, FinishReason};
use crate::audit::{event_types, Severity};
use crate::error::CoreError;
use crate::services::RuntimeServices;
use crate::tools::registry::{ToolContext, ToolRegistry};

/// Literal phrases that terminate the loop when present in a plain
/// assistant turn (case-insensitive).
const COMPLETION_PHRASES: [&str; 7] = [
    "task complete",
    "objective complete",
    "successfully completed",
    "all done",
    "finished",
    "completed successfully",
    "mission accomplished",
];

const SYSTEM_PROMPT: &str = "\
You are Factotum, an autonomous assistant that accomplishes objectives by \
calling tools. Work step by step: inspect before you modify, prefer small \
reversible actions, and request approval before anything consequential. \
When the objective is achieved, reply without tool calls and state \
'Task complete' with a short summary.";

const NUDGE: &str = "\
If the objective is complete, summarize the outcome and say 'Task complete'. \
Otherwise, continue working toward the objective.";

/// True when the assistant text contains a completion phrase.
pub fn detect_completion(text: &str) -> bool {
    let lower = text.to_lowercase();
    COMPLETION_PHRASES.iter().any(|p| lower.contains(p))
}

pub struct AgentLoop {
    router: Arc<Router>,
    registry: Arc<ToolRegistry>,
    services: Arc<RuntimeServices>,
}

impl AgentLoop {
    pub fn new(
        router: Arc<Router>,
        registry: Arc<ToolRegistry>,
        services: Arc<RuntimeServices>,
    ) -> Self {
        Self {
            router,
            registry,
            services,
        }
    }

    /// Run one objective to completion or budget exhaustion.
    pub async fn run_objective(&self, objective: &str, options: AgentOptions) -> AgentResult {
        let mut ctx = RunContext::new(objective);
        if let Some(dir) = &options.working_dir {
            ctx = ctx.with_working_dir(dir.clone());
        }
        self.run_with_context(ctx, objective, options).await
    }

    pub async fn run_with_context(
        &self,
        ctx: RunContext,
        objective: &str,
        options: AgentOptions,
    ) -> AgentResult {
        let audit = &self.services.audit;
        audit.info(
            &ctx.run_id,
            event_types::AGENT_START,
            &format!("Starting run: {objective}"),
            json!({
                "objective": objective,
                "max_iterations": options.budgets.max_iterations,
                "max_tool_calls": options.budgets.max_tool_calls,
            }),
        );

        let tools = self.registry.specs().await;
        let tool_ctx = ToolContext::new(ctx.clone(), self.services.clone());

        let system_prompt = options
            .system_prompt
            .clone()
            .unwrap_or_else(|| SYSTEM_PROMPT.to_string());
        let mut messages = vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user(objective.to_string()),
        ];

        let mut iterations = 0usize;
        let mut tool_calls_used = 0usize;
        let mut errors: Vec<String> = Vec::new();
        let mut final_response = String::new();
        let mut plain_stop_turns = 0usize;

        let success = loop {
            if iterations >= options.budgets.max_iterations {
                errors.push(format!(
                    "max iterations ({}) reached without completion",
                    options.budgets.max_iterations
                ));
                audit.record(
                    &ctx.run_id,
                    event_types::AGENT_ERROR,
                    Severity::Warn,
                    "Iteration budget exhausted",
                    json!({ "iterations": iterations }),
                );
                break false;
            }
            iterations += 1;

            let mut request = CompletionRequest::new(messages.clone()).with_tools(tools.clone());
            request.model = options.model.clone();

            let completion = match self
                .router
                .complete(&request, &ctx, options.force_provider.as_deref())
                .await
            {
                Ok(c) => c,
                Err(e @ (CoreError::Fatal(_) | CoreError::Cancelled)) => {
                    // Unrecoverable: the whole provider chain failed or the
                    // run was cancelled.
                    errors.push(e.to_string());
                    audit.record(
                        &ctx.run_id,
                        event_types::AGENT_ERROR,
                        Severity::Error,
                        &format!("Run aborted: {e}"),
                        json!({ "error": e.to_string() }),
                    );
                    break false;
                }
                Err(e) => {
                    errors.push(e.to_string());
                    messages.push(ChatMessage::user(format!(
                        "The previous step failed with: {e}. Adjust and continue."
                    )));
                    continue;
                }
            };

            if !completion.message.content.is_empty() {
                final_response = completion.message.content.clone();
            }
            messages.push(completion.message.clone());

            if !completion.has_tool_calls() {
                if completion.finish_reason == FinishReason::Stop {
                    if detect_completion(&completion.message.content) {
                        audit.info(
                            &ctx.run_id,
                            event_types::AGENT_COMPLETE,
                            "Objective reported complete",
                            json!({ "iterations": iterations, "tool_calls": tool_calls_used }),
                        );
                        break errors.is_empty();
                    }
                    plain_stop_turns += 1;
                    // One free pass; after that ask the model to wrap up
                    // or keep going.
                    if plain_stop_turns >= 2 {
                        messages.push(ChatMessage::user(NUDGE.to_string()));
                    }
                }
                continue;
            }

            for call in &completion.message.tool_calls {
                if tool_calls_used >= options.budgets.max_tool_calls {
                    messages.push(ChatMessage::tool(
                        call.id.clone(),
                        json!({ "error": "tool-call budget exhausted" }).to_string(),
                    ));
                    if !errors.iter().any(|e| e.contains("tool-call budget")) {
                        errors.push(format!(
                            "tool-call budget ({}) exhausted",
                            options.budgets.max_tool_calls
                        ));
                    }
                    continue;
                }
                tool_calls_used += 1;

                let args = normalize_args(&call.arguments);
                let outcome = self.registry.execute(&tool_ctx, &call.name, args).await;
                if !outcome.success {
                    errors.push(format!(
                        "{}: {}",
                        call.name,
                        outcome.error.as_deref().unwrap_or("failed")
                    ));
                }
                messages.push(ChatMessage::tool(
                    call.id.clone(),
                    outcome.payload().to_string(),
                ));
            }
        };

        AgentResult {
            success,
            final_response,
            iterations,
            tool_calls: tool_calls_used,
            errors,
            context: ctx,
            messages,
        }
    }

    /// One interactive turn over an existing conversation.
    pub async fn chat(
        &self,
        ctx: &RunContext,
        messages: Vec<ChatMessage>,
    ) -> Result<crate::ai::types::Completion, CoreError> {
        let tools = self.registry.specs().await;
        let request = CompletionRequest::new(messages).with_tools(tools);
        self.router.complete(&request, ctx, None).await
    }
}

/// Arguments arrive as opaque JSON. Objects pass through; a JSON-encoded
/// string is parsed; anything unusable becomes an empty object.
fn normalize_args(raw: &Value) -> Value {
    match raw {
        Value::Object(_) => raw.clone(),
        Value::String(s) => serde_json::from_str(s)
            .ok()
            .filter(Value::is_object)
            .unwrap_or_else(|| json!({})),
        _ => json!({}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::context::RunBudgets;
    use crate::ai::providers::Provider;
    use crate::ai::types::{Completion, Role, ToolCall};
    use crate::sandbox::SandboxPolicy;
    use crate::tools::implementations::ThinkTool;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Provider that keeps requesting `think` forever.
    struct LoopingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Provider for LoopingProvider {
        fn name(&self) -> &str {
            "anthropic"
        }
        fn available(&self) -> bool {
            true
        }
        fn default_model(&self) -> &str {
            "looping"
        }
        async fn complete(&self, _request: &CompletionRequest) -> anyhow::Result<Completion> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Completion {
                provider: "anthropic".into(),
                model: "looping".into(),
                message: ChatMessage::assistant_with_tools(
                    format!("still working ({n})"),
                    vec![
                        ToolCall {
                            id: format!("call-{n}-a"),
                            name: "think".into(),
                            arguments: json!({"thought": "step"}),
                        },
                        ToolCall {
                            id: format!("call-{n}-b"),
                            name: "think".into(),
                            arguments: json!({"thought": "again"}),
                        },
                    ],
                ),
                usage: None,
                finish_reason: FinishReason::ToolCalls,
            })
        }
    }

    /// Provider whose script is a fixed list of turns.
    struct ScriptedTurns {
        turns: Vec<Completion>,
        calls: AtomicUsize,
    }

    impl ScriptedTurns {
        fn text_turn(text: &str) -> Completion {
            Completion {
                provider: "anthropic".into(),
                model: "scripted".into(),
                message: ChatMessage::assistant(text),
                usage: None,
                finish_reason: FinishReason::Stop,
            }
        }
    }

    #[async_trait]
    impl Provider for ScriptedTurns {
        fn name(&self) -> &str {
            "anthropic"
        }
        fn available(&self) -> bool {
            true
        }
        fn default_model(&self) -> &str {
            "scripted"
        }
        async fn complete(&self, _request: &CompletionRequest) -> anyhow::Result<Completion> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            self.turns
                .get(n.min(self.turns.len().saturating_sub(1)))
                .cloned()
                .ok_or_else(|| anyhow!("script exhausted"))
        }
    }

    async fn agent_with(provider: Arc<dyn Provider>) -> (AgentLoop, TempDir) {
        let tmp = TempDir::new().unwrap();
        let services = crate::services::RuntimeServices::open_at(
            tmp.path(),
            SandboxPolicy::new(tmp.path()),
        )
        .unwrap();
        let router = Arc::new(Router::new(vec![provider], services.audit.clone()));
        let registry = Arc::new(ToolRegistry::new());
        registry.register(Arc::new(ThinkTool)).await;
        (AgentLoop::new(router, registry, services), tmp)
    }

    #[tokio::test]
    async fn budgets_are_strict_upper_bounds() {
        let (agent, _tmp) = agent_with(Arc::new(LoopingProvider {
            calls: AtomicUsize::new(0),
        }))
        .await;

        let result = agent
            .run_objective(
                "loop forever",
                AgentOptions {
                    budgets: RunBudgets {
                        max_iterations: 5,
                        max_tool_calls: 10,
                    },
                    ..Default::default()
                },
            )
            .await;

        assert!(!result.success);
        assert!(result.iterations <= 5);
        assert!(result.tool_calls <= 10);
        assert!(result.final_response.contains("still working"));
        assert!(result.errors.iter().any(|e| e.contains("max iterations")));
    }

    #[tokio::test]
    async fn tool_messages_reference_prior_assistant_calls() {
        let (agent, _tmp) = agent_with(Arc::new(LoopingProvider {
            calls: AtomicUsize::new(0),
        }))
        .await;

        let result = agent
            .run_objective(
                "loop forever",
                AgentOptions {
                    budgets: RunBudgets {
                        max_iterations: 3,
                        max_tool_calls: 50,
                    },
                    ..Default::default()
                },
            )
            .await;

        for (idx, msg) in result.messages.iter().enumerate() {
            if msg.role != Role::Tool {
                continue;
            }
            let id = msg.tool_call_id.as_deref().expect("tool turn needs an id");
            let referenced = result.messages[..idx].iter().any(|m| {
                m.role == Role::Assistant && m.tool_calls.iter().any(|c| c.id == id)
            });
            assert!(referenced, "tool message {id} has no matching assistant call");
        }
    }

    #[tokio::test]
    async fn completion_phrase_ends_the_run() {
        let (agent, tmp) = agent_with(Arc::new(ScriptedTurns {
            turns: vec![ScriptedTurns::text_turn(
                "Everything is in place. Task complete.",
            )],
            calls: AtomicUsize::new(0),
        }))
        .await;

        let result = agent
            .run_objective("small objective", AgentOptions::default())
            .await;
        assert!(result.success);
        assert_eq!(result.iterations, 1);
        assert!(result.final_response.contains("Task complete"));

        let services = crate::services::RuntimeServices::open_at(
            tmp.path(),
            SandboxPolicy::new(tmp.path()),
        )
        .unwrap();
        assert_eq!(
            services
                .audit
                .count_for_run(&result.context.run_id, event_types::AGENT_COMPLETE)
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn first_plain_turn_gets_a_free_pass_then_nudge() {
        let (agent, _tmp) = agent_with(Arc::new(ScriptedTurns {
            turns: vec![
                ScriptedTurns::text_turn("I think the work might be done."),
                ScriptedTurns::text_turn("Still thinking about it."),
                ScriptedTurns::text_turn("All done."),
            ],
            calls: AtomicUsize::new(0),
        }))
        .await;

        let result = agent
            .run_objective("ponder", AgentOptions::default())
            .await;
        assert!(result.success);

        let nudges: Vec<_> = result
            .messages
            .iter()
            .filter(|m| m.role == Role::User && m.content.contains("Task complete"))
            .collect();
        // No nudge after the first plain turn, one after the second.
        assert_eq!(nudges.len(), 1);
    }

    #[tokio::test]
    async fn router_exhaustion_fails_the_run() {
        struct AlwaysFails;
        #[async_trait]
        impl Provider for AlwaysFails {
            fn name(&self) -> &str {
                "anthropic"
            }
            fn available(&self) -> bool {
                true
            }
            fn default_model(&self) -> &str {
                "x"
            }
            async fn complete(&self, _r: &CompletionRequest) -> anyhow::Result<Completion> {
                Err(anyhow!("boom"))
            }
        }

        let (agent, _tmp) = agent_with(Arc::new(AlwaysFails)).await;
        let result = agent.run_objective("anything", AgentOptions::default()).await;
        assert!(!result.success);
        assert!(result.errors[0].contains("all providers failed"));
    }

    #[tokio::test]
    async fn unknown_tool_errors_are_fed_back_not_thrown() {
        struct CallsUnknown {
            calls: AtomicUsize,
        }
        #[async_trait]
        impl Provider for CallsUnknown {
            fn name(&self) -> &str {
                "anthropic"
            }
            fn available(&self) -> bool {
                true
            }
            fn default_model(&self) -> &str {
                "x"
            }
            async fn complete(&self, _r: &CompletionRequest) -> anyhow::Result<Completion> {
                if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Ok(Completion {
                        provider: "anthropic".into(),
                        model: "x".into(),
                        message: ChatMessage::assistant_with_tools(
                            "",
                            vec![ToolCall {
                                id: "call-1".into(),
                                name: "teleport".into(),
                                arguments: json!({}),
                            }],
                        ),
                        usage: None,
                        finish_reason: FinishReason::ToolCalls,
                    })
                } else {
                    Ok(ScriptedTurns::text_turn("Recovered. Task complete."))
                }
            }
        }

        let (agent, _tmp) = agent_with(Arc::new(CallsUnknown {
            calls: AtomicUsize::new(0),
        }))
        .await;
        let result = agent.run_objective("go", AgentOptions::default()).await;

        // The failed call is in errors, encoded in a tool result, and the
        // run still completed.
        assert!(result.errors.iter().any(|e| e.contains("unknown tool")));
        let tool_msg = result
            .messages
            .iter()
            .find(|m| m.role == Role::Tool)
            .unwrap();
        assert!(tool_msg.content.contains("error"));
        assert!(!result.success); // errors were recorded
    }

    #[test]
    fn completion_phrases_match_case_insensitively() {
        assert!(detect_completion("TASK COMPLETE"));
        assert!(detect_completion("We are finished here."));
        assert!(detect_completion("Mission accomplished!"));
        assert!(!detect_completion("almost there"));
    }

    #[test]
    fn normalize_args_tolerates_strings_and_garbage() {
        assert_eq!(
            normalize_args(&json!({"a": 1})),
            json!({"a": 1})
        );
        assert_eq!(
            normalize_args(&Value::String("{\"a\": 2}".into())),
            json!({"a": 2})
        );
        assert_eq!(normalize_args(&Value::String("{bad".into())), json!({}));
        assert_eq!(normalize_args(&Value::Null), json!({}));
    }
}
