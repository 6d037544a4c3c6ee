//! Provider router
//!
//! Picks a provider for each completion request (forced provider, then
//! routing rules over the detected task type, then the configured default,
//! then anything available) and walks a fallback chain on adapter errors.
//! The caller only sees an error after every available provider has failed.

use std::sync::Arc;
use std::time::Instant;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::providers::Provider;
use super::types::{Completion, CompletionRequest};
use crate::agent::context::RunContext;
use crate::audit::{event_types, AuditSink, Severity};
use crate::error::CoreError;

/// Task categories detected from the last user message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Search,
    Coding,
    Analysis,
    Planning,
    Execution,
    Vision,
    Conversation,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Search => "search",
            TaskType::Coding => "coding",
            TaskType::Analysis => "analysis",
            TaskType::Planning => "planning",
            TaskType::Execution => "execution",
            TaskType::Vision => "vision",
            TaskType::Conversation => "conversation",
        }
    }
}

const SEARCH_KEYWORDS: &[&str] = &[
    "search", "look up", "find online", "news", "latest", "current events", "web",
];
const VISION_KEYWORDS: &[&str] = &["image", "screenshot", "picture", "photo", "diagram"];
const CODING_KEYWORDS: &[&str] = &[
    "code", "function", "bug", "implement", "refactor", "compile", "script", "debug",
];
const PLANNING_KEYWORDS: &[&str] = &["plan", "schedule", "organize", "roadmap", "steps to"];
const ANALYSIS_KEYWORDS: &[&str] = &["analyze", "analysis", "compare", "evaluate", "summarize"];
const EXECUTION_KEYWORDS: &[&str] = &["run ", "execute", "create file", "delete", "install"];

/// Keyword heuristics over the last user-role message. Tools present and no
/// other category matched means the model is expected to act: execution.
pub fn detect_task_type(request: &CompletionRequest) -> TaskType {
    let text = request.last_user_text().unwrap_or("").to_lowercase();

    let contains = |keywords: &[&str]| keywords.iter().any(|k| text.contains(k));

    if contains(SEARCH_KEYWORDS) {
        TaskType::Search
    } else if contains(VISION_KEYWORDS) {
        TaskType::Vision
    } else if contains(CODING_KEYWORDS) {
        TaskType::Coding
    } else if contains(PLANNING_KEYWORDS) {
        TaskType::Planning
    } else if contains(ANALYSIS_KEYWORDS) {
        TaskType::Analysis
    } else if contains(EXECUTION_KEYWORDS) || !request.tools.is_empty() {
        TaskType::Execution
    } else {
        TaskType::Conversation
    }
}

/// One routing rule: matcher → provider choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingRule {
    /// Task types this rule applies to (empty = any).
    #[serde(default)]
    pub task_types: Vec<TaskType>,
    /// Keywords that must appear in the last user message (empty = any).
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Tool names that must be present in the request (empty = any).
    #[serde(default)]
    pub required_tools: Vec<String>,
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    pub reason: String,
}

impl RoutingRule {
    fn matches(&self, task: TaskType, request: &CompletionRequest) -> bool {
        if !self.task_types.is_empty() && !self.task_types.contains(&task) {
            return false;
        }
        if !self.keywords.is_empty() {
            let text = request.last_user_text().unwrap_or("").to_lowercase();
            if !self.keywords.iter().any(|k| text.contains(&k.to_lowercase())) {
                return false;
            }
        }
        if !self.required_tools.is_empty() {
            let has_all = self
                .required_tools
                .iter()
                .all(|name| request.tools.iter().any(|t| &t.name == name));
            if !has_all {
                return false;
            }
        }
        true
    }
}

static DEFAULT_RULES: Lazy<Vec<RoutingRule>> = Lazy::new(|| {
    vec![
        RoutingRule {
            task_types: vec![TaskType::Search],
            keywords: Vec::new(),
            required_tools: Vec::new(),
            provider: "perplexity".to_string(),
            model: None,
            reason: "search tasks go to the search-optimized provider".to_string(),
        },
        RoutingRule {
            task_types: vec![TaskType::Vision],
            keywords: Vec::new(),
            required_tools: Vec::new(),
            provider: "gemini".to_string(),
            model: None,
            reason: "vision tasks need a multimodal provider".to_string(),
        },
        RoutingRule {
            task_types: vec![TaskType::Coding],
            keywords: Vec::new(),
            required_tools: Vec::new(),
            provider: "anthropic".to_string(),
            model: None,
            reason: "coding tasks default to anthropic".to_string(),
        },
        RoutingRule {
            task_types: vec![TaskType::Execution],
            keywords: Vec::new(),
            required_tools: Vec::new(),
            provider: "anthropic".to_string(),
            model: None,
            reason: "tool execution defaults to anthropic".to_string(),
        },
    ]
});

/// Task-based provider selection with transparent fallback.
pub struct Router {
    providers: Vec<Arc<dyn Provider>>,
    rules: Vec<RoutingRule>,
    default_provider: Option<String>,
    audit: Arc<AuditSink>,
}

impl Router {
    /// New router over providers in registration order. User rules (if any)
    /// are evaluated before the defaults.
    pub fn new(providers: Vec<Arc<dyn Provider>>, audit: Arc<AuditSink>) -> Self {
        Self {
            providers,
            rules: DEFAULT_RULES.clone(),
            default_provider: None,
            audit,
        }
    }

    pub fn with_rules(mut self, user_rules: Vec<RoutingRule>) -> Self {
        let mut rules = user_rules;
        rules.extend(DEFAULT_RULES.clone());
        self.rules = rules;
        self
    }

    pub fn with_default_provider(mut self, name: Option<String>) -> Self {
        self.default_provider = name;
        self
    }

    /// Names of providers that are currently available.
    pub fn available_providers(&self) -> Vec<&str> {
        self.providers
            .iter()
            .filter(|p| p.available())
            .map(|p| p.name())
            .collect()
    }

    fn find(&self, name: &str) -> Option<&Arc<dyn Provider>> {
        self.providers
            .iter()
            .find(|p| p.name() == name && p.available())
    }

    /// Pick the provider for this request. Returns (provider, model
    /// override, task type, reason).
    fn select(
        &self,
        request: &CompletionRequest,
        force_provider: Option<&str>,
    ) -> Result<(Arc<dyn Provider>, Option<String>, TaskType, String), CoreError> {
        let task = detect_task_type(request);

        if let Some(forced) = force_provider {
            if let Some(p) = self.find(forced) {
                return Ok((p.clone(), None, task, format!("forced: {forced}")));
            }
        }

        for rule in &self.rules {
            if rule.matches(task, request) {
                if let Some(p) = self.find(&rule.provider) {
                    return Ok((p.clone(), rule.model.clone(), task, rule.reason.clone()));
                }
            }
        }

        if let Some(name) = &self.default_provider {
            if let Some(p) = self.find(name) {
                return Ok((p.clone(), None, task, format!("default provider: {name}")));
            }
        }

        self.providers
            .iter()
            .find(|p| p.available())
            .cloned()
            .map(|p| {
                let reason = format!("first available: {}", p.name());
                (p, None, task, reason)
            })
            .ok_or_else(|| CoreError::Fatal("no AI provider is available".to_string()))
    }

    /// Issue a completion with automatic fallback across the available set.
    pub async fn complete(
        &self,
        request: &CompletionRequest,
        ctx: &RunContext,
        force_provider: Option<&str>,
    ) -> Result<Completion, CoreError> {
        let (selected, rule_model, task, reason) = self.select(request, force_provider)?;

        // Fallback chain: selected first, then every other available
        // provider in registration order.
        let mut chain: Vec<Arc<dyn Provider>> = vec![selected.clone()];
        chain.extend(
            self.providers
                .iter()
                .filter(|p| p.available() && p.name() != selected.name())
                .cloned(),
        );

        let mut effective = request.clone();
        if effective.model.is_none() {
            effective.model = rule_model;
        }

        let mut last_error: Option<anyhow::Error> = None;
        for (attempt, provider) in chain.iter().enumerate() {
            if ctx.is_cancelled() {
                return Err(CoreError::Cancelled);
            }

            // Rule-supplied model overrides only apply to the selected
            // provider; fallbacks use their own defaults.
            let attempt_request = if attempt == 0 {
                effective.clone()
            } else {
                let mut r = request.clone();
                r.model = None;
                r
            };

            self.audit.info(
                &ctx.run_id,
                event_types::AI_REQUEST,
                &format!("AI request via {}", provider.name()),
                json!({
                    "provider": provider.name(),
                    "model": attempt_request
                        .model
                        .as_deref()
                        .unwrap_or(provider.default_model()),
                    "task_type": task.as_str(),
                    "reason": reason.clone(),
                    "attempt": attempt + 1,
                    "messages": attempt_request.messages.len(),
                    "tools": attempt_request.tools.len(),
                }),
            );

            let started = Instant::now();
            let result = tokio::select! {
                _ = ctx.cancel.cancelled() => return Err(CoreError::Cancelled),
                r = provider.complete(&attempt_request) => r,
            };

            match result {
                Ok(completion) => {
                    self.audit.info(
                        &ctx.run_id,
                        event_types::AI_RESPONSE,
                        &format!("AI response from {}", completion.provider),
                        json!({
                            "provider": completion.provider.clone(),
                            "model": completion.model.clone(),
                            "task_type": task.as_str(),
                            "duration_ms": started.elapsed().as_millis() as u64,
                            "finish_reason": completion.finish_reason,
                            "tool_calls": completion.message.tool_calls.len(),
                            "usage": completion.usage.map(|u| u.total_tokens),
                        }),
                    );
                    return Ok(completion);
                }
                Err(e) => {
                    self.audit.record(
                        &ctx.run_id,
                        event_types::AI_RESPONSE,
                        Severity::Warn,
                        &format!("Provider {} failed, trying next", provider.name()),
                        json!({
                            "provider": provider.name(),
                            "error": e.to_string(),
                            "duration_ms": started.elapsed().as_millis() as u64,
                        }),
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(CoreError::Fatal(format!(
            "all providers failed; last error: {}",
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "none attempted".to_string())
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::types::{ChatMessage, FinishReason, ToolSpec};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted provider: fails the first `fail_first` calls, then answers.
    struct Scripted {
        name: &'static str,
        available: bool,
        fail_first: usize,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn ok(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                available: true,
                fail_first: 0,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                available: true,
                fail_first: usize::MAX,
                calls: AtomicUsize::new(0),
            })
        }

        fn offline(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                available: false,
                fail_first: 0,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Provider for Scripted {
        fn name(&self) -> &str {
            self.name
        }
        fn available(&self) -> bool {
            self.available
        }
        fn default_model(&self) -> &str {
            "scripted-1"
        }
        async fn complete(&self, _request: &CompletionRequest) -> anyhow::Result<Completion> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(anyhow!("scripted failure"));
            }
            Ok(Completion {
                provider: self.name.to_string(),
                model: "scripted-1".to_string(),
                message: ChatMessage::assistant(format!("answer from {}", self.name)),
                usage: None,
                finish_reason: FinishReason::Stop,
            })
        }
    }

    fn router_with(providers: Vec<Arc<dyn Provider>>) -> Router {
        Router::new(providers, Arc::new(AuditSink::in_memory().unwrap()))
    }

    #[test]
    fn task_detection_matches_keywords() {
        let req = |text: &str| CompletionRequest::new(vec![ChatMessage::user(text)]);
        assert_eq!(
            detect_task_type(&req("search for the latest rust release")),
            TaskType::Search
        );
        assert_eq!(
            detect_task_type(&req("fix this bug in my function")),
            TaskType::Coding
        );
        assert_eq!(
            detect_task_type(&req("describe this screenshot")),
            TaskType::Vision
        );
        assert_eq!(detect_task_type(&req("how are you?")), TaskType::Conversation);
    }

    #[test]
    fn tools_present_defaults_to_execution() {
        let req = CompletionRequest::new(vec![ChatMessage::user("how are you?")]).with_tools(vec![
            ToolSpec {
                name: "terminal".into(),
                description: String::new(),
                input_schema: serde_json::json!({"type": "object"}),
            },
        ]);
        assert_eq!(detect_task_type(&req), TaskType::Execution);
    }

    #[tokio::test]
    async fn forced_provider_wins_when_available() {
        let router = router_with(vec![Scripted::ok("anthropic"), Scripted::ok("openai")]);
        let ctx = RunContext::new("t");
        let req = CompletionRequest::new(vec![ChatMessage::user("hello")]);

        let completion = router.complete(&req, &ctx, Some("openai")).await.unwrap();
        assert_eq!(completion.provider, "openai");
    }

    #[tokio::test]
    async fn fallback_walks_to_next_provider_and_audits_both_requests() {
        let audit = Arc::new(AuditSink::in_memory().unwrap());
        let router = Router::new(
            vec![
                Scripted::failing("anthropic"),
                Scripted::ok("openai"),
                Scripted::ok("gemini"),
            ],
            audit.clone(),
        );
        let ctx = RunContext::new("t");
        let req = CompletionRequest::new(vec![ChatMessage::user("hello")]);

        let completion = router
            .complete(&req, &ctx, Some("anthropic"))
            .await
            .unwrap();
        assert_eq!(completion.provider, "openai");
        assert_eq!(
            audit
                .count_for_run(&ctx.run_id, event_types::AI_REQUEST)
                .unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn error_surfaces_only_after_all_providers_fail() {
        let router = router_with(vec![
            Scripted::failing("anthropic"),
            Scripted::failing("openai"),
        ]);
        let ctx = RunContext::new("t");
        let req = CompletionRequest::new(vec![ChatMessage::user("hello")]);

        let err = router.complete(&req, &ctx, None).await.unwrap_err();
        assert!(matches!(err, CoreError::Fatal(_)));
        assert!(err.to_string().contains("all providers failed"));
    }

    #[tokio::test]
    async fn unavailable_providers_are_skipped() {
        let router = router_with(vec![Scripted::offline("anthropic"), Scripted::ok("gemini")]);
        let ctx = RunContext::new("t");
        let req = CompletionRequest::new(vec![ChatMessage::user("hello")]);

        let completion = router.complete(&req, &ctx, None).await.unwrap();
        assert_eq!(completion.provider, "gemini");
    }

    #[tokio::test]
    async fn search_tasks_route_to_perplexity() {
        let router = router_with(vec![
            Scripted::ok("anthropic"),
            Scripted::ok("perplexity"),
        ]);
        let ctx = RunContext::new("t");
        let req =
            CompletionRequest::new(vec![ChatMessage::user("search for the latest kernel news")]);

        let completion = router.complete(&req, &ctx, None).await.unwrap();
        assert_eq!(completion.provider, "perplexity");
    }

    #[tokio::test]
    async fn user_rules_take_precedence_over_defaults() {
        let router = router_with(vec![Scripted::ok("anthropic"), Scripted::ok("openai")])
            .with_rules(vec![RoutingRule {
                task_types: vec![TaskType::Search],
                keywords: Vec::new(),
                required_tools: Vec::new(),
                provider: "openai".to_string(),
                model: None,
                reason: "user override".to_string(),
            }]);
        let ctx = RunContext::new("t");
        let req = CompletionRequest::new(vec![ChatMessage::user("search for rust news")]);

        let completion = router.complete(&req, &ctx, None).await.unwrap();
        assert_eq!(completion.provider, "openai");
    }

    #[tokio::test]
    async fn cancelled_context_short_circuits() {
        let router = router_with(vec![Scripted::ok("anthropic")]);
        let ctx = RunContext::new("t");
        ctx.cancel.cancel();
        let req = CompletionRequest::new(vec![ChatMessage::user("hello")]);

        let err = router.complete(&req, &ctx, None).await.unwrap_err();
        assert!(matches!(err, CoreError::Cancelled));
    }
}
