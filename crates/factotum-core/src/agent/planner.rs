//! LM-backed planner
//!
//! Asks the router for a structured plan (strict JSON) and parses it into
//! plan steps for the deterministic runner.

use std::sync::Arc;

use serde_json::Value;

use crate::agent::context::RunContext;
use crate::ai::router::Router;
use crate::ai::types::{ChatMessage, CompletionRequest};
use crate::error::CoreError;
use crate::plan::types::Plan;

const PLANNER_PROMPT: &str = "\
You convert objectives into deterministic execution plans. Reply with ONLY a \
JSON object of the form {\"steps\": [{\"id\": \"s0\", \"kind\": \
\"filesystem|terminal|editor|verify|policy|audit|custom\", \"params\": {...}, \
\"depends_on\": [\"...\"]}]}. Step ids must be unique; dependencies must \
reference declared ids; the graph must be acyclic. No prose, no markdown.";

/// Generate a plan for an objective via the router.
pub async fn generate_plan(
    router: &Arc<Router>,
    ctx: &RunContext,
    objective: &str,
) -> Result<Plan, CoreError> {
    let request = CompletionRequest::new(vec![
        ChatMessage::system(PLANNER_PROMPT),
        ChatMessage::user(format!("Objective: {objective}")),
    ]);

    let completion = router.complete(&request, ctx, None).await?;
    let mut plan = parse_plan(&completion.message.content)?;
    plan.objective = Some(objective.to_string());
    Ok(plan)
}

/// Extract the JSON plan from assistant text, tolerating surrounding prose.
pub(crate) fn parse_plan(text: &str) -> Result<Plan, CoreError> {
    let candidate: Value = serde_json::from_str(text.trim()).or_else(|_| {
        let start = text
            .find('{')
            .ok_or_else(|| CoreError::Validation("planner returned no JSON".into()))?;
        let end = text
            .rfind('}')
            .ok_or_else(|| CoreError::Validation("planner returned no JSON".into()))?;
        serde_json::from_str(&text[start..=end])
            .map_err(|e| CoreError::Validation(format!("planner JSON is malformed: {e}")))
    })?;

    let plan: Plan = serde_json::from_value(candidate)
        .map_err(|e| CoreError::Validation(format!("plan shape is invalid: {e}")))?;
    if plan.steps.is_empty() {
        return Err(CoreError::Validation("planner produced an empty plan".into()));
    }
    crate::plan::topo::validate(&plan.steps)?;
    Ok(plan)
}
