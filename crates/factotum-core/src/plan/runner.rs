//! Deterministic plan runner
//!
//! Executes a dependency DAG of steps through the same dispatcher, policy,
//! journal, and audit primitives the agent loop uses. Each step runs under
//! its retry policy; a declared fallback parameter set is tried once after
//! the primary attempt chain fails. A terminal step failure stops the run.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::{json, Value};

use super::retry::with_retry;
use super::topo;
use super::types::{PlanRunResult, PlanStep, RunReport, RunStats, StepKind, Timings};
use crate::agent::context::RunContext;
use crate::audit::{event_types, Severity};
use crate::error::CoreError;
use crate::sandbox::Effect;
use crate::services::RuntimeServices;
use crate::tools::registry::{ToolContext, ToolOutcome, ToolRegistry};

pub struct PlanRunner {
    registry: Arc<ToolRegistry>,
    services: Arc<RuntimeServices>,
}

impl PlanRunner {
    pub fn new(registry: Arc<ToolRegistry>, services: Arc<RuntimeServices>) -> Self {
        Self { registry, services }
    }

    /// Run the steps and emit the run report.
    pub async fn run(
        &self,
        ctx: &RunContext,
        steps: &[PlanStep],
    ) -> Result<PlanRunResult, CoreError> {
        topo::validate(steps)?;
        let (order, cycle_fallback) = topo::topo_sort(steps);
        if cycle_fallback {
            self.services.audit.record(
                &ctx.run_id,
                event_types::STEP_START,
                Severity::Warn,
                "Dependency graph has a cycle; executing in input order",
                json!({ "cycle_fallback": true }),
            );
        }

        let tool_ctx = ToolContext::new(ctx.clone(), self.services.clone());
        let started = Instant::now();
        let mut stats = RunStats {
            steps: steps.len(),
            ..Default::default()
        };
        let mut failed_step: Option<String> = None;

        for idx in order {
            let step = &steps[idx];
            if ctx.is_cancelled() {
                return Err(CoreError::Cancelled);
            }

            self.services.audit.info(
                &ctx.run_id,
                event_types::STEP_START,
                &format!("Step {} ({:?})", step.id, step.kind),
                json!({ "step": step.id.clone(), "kind": step.kind }),
            );

            let policy = step.retry.unwrap_or_default();
            let primary = with_retry(&policy, || {
                self.attempt(&tool_ctx, step.kind, &step.params)
            })
            .await;
            stats.retries += primary.retries();

            let step_result = match primary.result {
                Ok(output) => Ok(output),
                Err(primary_err) => match &step.fallback_params {
                    Some(fallback) => {
                        self.services.audit.info(
                            &ctx.run_id,
                            event_types::FALLBACK_APPLY,
                            &format!("Step {}: applying fallback parameters", step.id),
                            json!({ "step": step.id.clone(), "error": primary_err.to_string() }),
                        );
                        let second =
                            with_retry(&policy, || self.attempt(&tool_ctx, step.kind, fallback))
                                .await;
                        stats.retries += second.retries();
                        if second.result.is_ok() {
                            stats.fallbacks += 1;
                        }
                        second.result
                    }
                    None => Err(primary_err),
                },
            };

            match step_result {
                Ok(_) => {
                    stats.ok += 1;
                    self.services.audit.info(
                        &ctx.run_id,
                        event_types::STEP_END,
                        &format!("Step {} succeeded", step.id),
                        json!({ "step": step.id.clone() }),
                    );
                }
                Err(e) => {
                    self.services.audit.record(
                        &ctx.run_id,
                        event_types::STEP_FAIL,
                        Severity::Error,
                        &format!("Step {} failed: {e}", step.id),
                        json!({ "step": step.id.clone(), "error": e.to_string() }),
                    );
                    failed_step = Some(step.id.clone());
                    break;
                }
            }
        }

        let report = RunReport {
            summary: match &failed_step {
                Some(id) => format!("{}/{} steps succeeded; stopped at {id}", stats.ok, stats.steps),
                None => format!("{}/{} steps succeeded", stats.ok, stats.steps),
            },
            timings: Timings {
                total_ms: started.elapsed().as_millis() as u64,
            },
            stats,
            generated_at: Utc::now().to_rfc3339(),
        };

        self.services.audit.info(
            &ctx.run_id,
            event_types::RUN_REPORT,
            &report.summary,
            json!({ "runId": ctx.run_id.clone(), "report": report.clone() }),
        );

        Ok(PlanRunResult {
            run_id: ctx.run_id.clone(),
            success: failed_step.is_none(),
            failed_step,
            report,
        })
    }

    /// One attempt: pre-check → dispatch by kind → post-validate.
    async fn attempt(
        &self,
        ctx: &ToolContext,
        kind: StepKind,
        params: &Value,
    ) -> Result<Value, CoreError> {
        self.pre_check(ctx, kind, params)?;
        let output = self.dispatch(ctx, kind, params).await?;
        post_validate(ctx, params, &output)?;
        Ok(output)
    }

    /// Policy gate before any effectful dispatch. A denial here means the
    /// handler runs zero effectful code.
    fn pre_check(&self, ctx: &ToolContext, kind: StepKind, params: &Value) -> Result<(), CoreError> {
        match kind {
            StepKind::Filesystem | StepKind::Editor => {
                let path = require_str(params, "path")?;
                let resolved = ctx.resolve_path(path);
                self.services
                    .sandbox
                    .check(&Effect::Filesystem { path: &resolved })
            }
            StepKind::Terminal => {
                let command = require_str(params, "command")?;
                self.services.sandbox.check(&Effect::Terminal { command })
            }
            _ => Ok(()),
        }
    }

    async fn dispatch(
        &self,
        ctx: &ToolContext,
        kind: StepKind,
        params: &Value,
    ) -> Result<Value, CoreError> {
        match kind {
            StepKind::Filesystem => self.run_tool(ctx, "filesystem", params).await,
            StepKind::Terminal => self.run_tool(ctx, "terminal", params).await,
            StepKind::Editor => self.run_tool(ctx, "editor", params).await,
            StepKind::Custom => {
                let tool = require_str(params, "tool")?.to_string();
                let args = params.get("args").cloned().unwrap_or(json!({}));
                self.run_tool_args(ctx, &tool, args).await
            }
            StepKind::Verify => {
                // No effect; the expectations run in post-validate.
                Ok(json!({}))
            }
            StepKind::Policy => {
                let decision = if let Some(path) = params.get("path").and_then(|p| p.as_str()) {
                    let resolved = ctx.resolve_path(path);
                    self.services
                        .sandbox
                        .decide(&Effect::Filesystem { path: &resolved })
                } else if let Some(command) = params.get("command").and_then(|c| c.as_str()) {
                    self.services.sandbox.decide(&Effect::Terminal { command })
                } else {
                    return Err(CoreError::Validation(
                        "policy step needs 'path' or 'command'".into(),
                    ));
                };
                Ok(match decision {
                    crate::sandbox::Decision::Allow => json!({ "decision": "allow" }),
                    crate::sandbox::Decision::Deny { reason } => {
                        json!({ "decision": "deny", "reason": reason })
                    }
                })
            }
            StepKind::Audit => {
                let event_type = params
                    .get("event_type")
                    .and_then(|e| e.as_str())
                    .unwrap_or("PLAN_NOTE");
                let message = params.get("message").and_then(|m| m.as_str()).unwrap_or("");
                self.services.audit.info(
                    ctx.run_id(),
                    event_type,
                    message,
                    params.get("data").cloned().unwrap_or(Value::Null),
                );
                Ok(json!({ "recorded": true }))
            }
        }
    }

    async fn run_tool(
        &self,
        ctx: &ToolContext,
        name: &str,
        params: &Value,
    ) -> Result<Value, CoreError> {
        // Expectations drive post-validate only; the tool never sees them.
        let mut args = params.clone();
        if let Some(obj) = args.as_object_mut() {
            obj.remove("expect");
        }
        self.run_tool_args(ctx, name, args).await
    }

    async fn run_tool_args(
        &self,
        ctx: &ToolContext,
        name: &str,
        args: Value,
    ) -> Result<Value, CoreError> {
        let outcome = self.registry.execute(ctx, name, args).await;
        outcome_to_result(outcome)
    }
}

/// Map a tool outcome back into the error taxonomy so the retry layer can
/// tell denials and bad arguments from transient failures.
fn outcome_to_result(outcome: ToolOutcome) -> Result<Value, CoreError> {
    if outcome.success {
        return Ok(outcome.output.unwrap_or(json!({})));
    }
    let message = outcome.error.unwrap_or_else(|| "tool failed".to_string());
    if let Some(reason) = message.strip_prefix("Denied: ") {
        Err(CoreError::denied(reason.to_string()))
    } else if message.contains("invalid parameters") || message.contains("missing required") {
        Err(CoreError::Validation(message))
    } else {
        Err(CoreError::Exec(message))
    }
}

/// Semantic checks declared on the step under `expect`.
fn post_validate(ctx: &ToolContext, params: &Value, output: &Value) -> Result<(), CoreError> {
    let Some(expect) = params.get("expect") else {
        return Ok(());
    };

    if let Some(needle) = expect.get("stdout_contains").and_then(|v| v.as_str()) {
        let stdout = output.get("stdout").and_then(|s| s.as_str()).unwrap_or("");
        if !stdout.contains(needle) {
            return Err(CoreError::Validation(format!(
                "stdout does not contain '{needle}'"
            )));
        }
    }

    if let Some(path) = expect.get("exists").and_then(|v| v.as_str()) {
        if !ctx.resolve_path(path).exists() {
            return Err(CoreError::Validation(format!("expected path missing: {path}")));
        }
    }

    if let Some(check) = expect.get("contains") {
        let path = require_str(check, "path")?;
        let needle = require_str(check, "needle")?;
        let content = std::fs::read_to_string(ctx.resolve_path(path))
            .map_err(|e| CoreError::Validation(format!("cannot read {path}: {e}")))?;
        if !content.contains(needle) {
            return Err(CoreError::Validation(format!(
                "{path} does not contain '{needle}'"
            )));
        }
    }

    Ok(())
}

fn require_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, CoreError> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| CoreError::Validation(format!("step params missing '{key}'")))
}
