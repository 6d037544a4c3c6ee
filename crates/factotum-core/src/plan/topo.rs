//! Topological ordering of plan steps
//!
//! Kahn's algorithm over the declared dependency edges. When the graph has
//! a cycle no full ordering exists; the runner never refuses to run, so the
//! sort falls back to input order and reports the fallback to the caller.

use std::collections::HashMap;

use super::types::PlanStep;
use crate::error::CoreError;

/// Structural validation: unique ids, dependencies reference existing ids.
pub fn validate(steps: &[PlanStep]) -> Result<(), CoreError> {
    let mut seen = HashMap::new();
    for (idx, step) in steps.iter().enumerate() {
        if seen.insert(step.id.as_str(), idx).is_some() {
            return Err(CoreError::Fatal(format!("duplicate step id: {}", step.id)));
        }
    }
    for step in steps {
        for dep in &step.depends_on {
            if !seen.contains_key(dep.as_str()) {
                return Err(CoreError::Fatal(format!(
                    "step {} depends on unknown step {dep}",
                    step.id
                )));
            }
        }
    }
    Ok(())
}

/// Sort step indices so every step follows its dependencies.
///
/// Returns `(order, cycle_fallback)`; when `cycle_fallback` is true the
/// graph was not fully consumable and the order is the input order.
pub fn topo_sort(steps: &[PlanStep]) -> (Vec<usize>, bool) {
    let index_of: HashMap<&str, usize> = steps
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id.as_str(), i))
        .collect();

    let mut in_degree = vec![0usize; steps.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); steps.len()];
    for (idx, step) in steps.iter().enumerate() {
        for dep in &step.depends_on {
            if let Some(&dep_idx) = index_of.get(dep.as_str()) {
                in_degree[idx] += 1;
                dependents[dep_idx].push(idx);
            }
        }
    }

    // Ready queue seeded in input order keeps the sort stable.
    let mut queue: std::collections::VecDeque<usize> = (0..steps.len())
        .filter(|&i| in_degree[i] == 0)
        .collect();
    let mut order = Vec::with_capacity(steps.len());

    while let Some(idx) = queue.pop_front() {
        order.push(idx);
        for &next in &dependents[idx] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                queue.push_back(next);
            }
        }
    }

    if order.len() != steps.len() {
        return ((0..steps.len()).collect(), true);
    }
    (order, false)
}
