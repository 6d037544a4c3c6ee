//! Plan and run-report types

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What a step does; decides which primitive runs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Filesystem,
    Terminal,
    Editor,
    Verify,
    Policy,
    Audit,
    Custom,
}

/// Retry policy for one step. Delay grows as
/// `base · factor^(n-1) · (1 + uniform(0, jitter))`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay_ms: u64,
    pub factor: f64,
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay_ms: 200,
            factor: 2.0,
            jitter: 0.2,
        }
    }
}

/// One step in a deterministic plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: String,
    pub kind: StepKind,
    #[serde(default)]
    pub params: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,
    /// Alternate parameters tried once after the primary attempt chain fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_params: Option<Value>,
}

impl PlanStep {
    pub fn new(id: impl Into<String>, kind: StepKind, params: Value) -> Self {
        Self {
            id: id.into(),
            kind,
            params,
            depends_on: Vec::new(),
            retry: None,
            fallback_params: None,
        }
    }

    pub fn depends_on(mut self, ids: &[&str]) -> Self {
        self.depends_on = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_fallback(mut self, params: Value) -> Self {
        self.fallback_params = Some(params);
        self
    }
}

/// A generated or user-supplied plan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objective: Option<String>,
    pub steps: Vec<PlanStep>,
}

/// Execution counters for the run report.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RunStats {
    pub steps: usize,
    pub ok: usize,
    pub retries: u32,
    pub fallbacks: u32,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timings {
    pub total_ms: u64,
}

/// Report emitted after a plan run, via audit and to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub summary: String,
    pub timings: Timings,
    pub stats: RunStats,
    pub generated_at: String,
}

/// Caller-facing result of a plan run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanRunResult {
    pub run_id: String,
    pub report: RunReport,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plan_steps_deserialize_with_defaults() {
        let step: PlanStep = serde_json::from_value(json!({
            "id": "s1",
            "kind": "filesystem",
            "params": {"operation": "mkdir", "path": "demo"}
        }))
        .unwrap();
        assert_eq!(step.kind, StepKind::Filesystem);
        assert!(step.depends_on.is_empty());
        assert!(step.retry.is_none());
    }

    #[test]
    fn report_serializes_camel_case() {
        let report = RunReport {
            summary: "ok".into(),
            timings: Timings { total_ms: 12 },
            stats: RunStats {
                steps: 5,
                ok: 5,
                retries: 0,
                fallbacks: 1,
            },
            generated_at: "2024-01-01T00:00:00Z".into(),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["timings"]["totalMs"], 12);
        assert_eq!(json["generatedAt"], "2024-01-01T00:00:00Z");
        assert_eq!(json["stats"]["fallbacks"], 1);
    }
}
