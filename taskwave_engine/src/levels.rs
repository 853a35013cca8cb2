//! Wave partitioning of a workflow's steps.
//!
//! A wave (level) is a maximal set of steps whose dependencies are all
//! already satisfied; steps within one wave are mutually independent
//! and may run concurrently, while waves themselves run strictly in
//! sequence.

use crate::graph::GraphError;
use std::collections::HashSet;
use taskwave_core::step::{Step, StepId};

/// Partitions steps into ordered waves.
///
/// Steps listed in `completed` are treated as already satisfied and do
/// not appear in any wave; this is how a resumed execution skips work
/// that finished before the pause. Dependencies that do not resolve to
/// any step in the list are ignored, matching graph construction.
///
/// Repeatedly scans for unassigned steps whose dependencies are all in
/// already-assigned waves (or completed); each pass forms one wave. A
/// pass that assigns nothing while steps remain is a deadlock, which is
/// unreachable for a graph that passed cycle detection but is checked
/// anyway and reported as a distinct fatal error.
pub fn group_levels(
    steps: &[Step],
    completed: &HashSet<StepId>,
) -> Result<Vec<Vec<StepId>>, GraphError> {
    let known: HashSet<&StepId> = steps.iter().map(|s| &s.id).collect();
    let mut satisfied: HashSet<StepId> = completed.clone();
    let mut remaining: Vec<&Step> = steps
        .iter()
        .filter(|s| !completed.contains(&s.id))
        .collect();
    let mut levels = Vec::new();

    while !remaining.is_empty() {
        let (ready, blocked): (Vec<&Step>, Vec<&Step>) = remaining.iter().partition(|s| {
            s.dependencies
                .iter()
                .all(|dep| satisfied.contains(dep) || !known.contains(dep))
        });

        if ready.is_empty() {
            return Err(GraphError::Deadlock(
                blocked.iter().map(|s| s.id.clone()).collect(),
            ));
        }

        for step in &ready {
            satisfied.insert(step.id.clone());
        }
        levels.push(ready.iter().map(|s| s.id.clone()).collect());
        remaining = blocked;
    }

    Ok(levels)
}

/// Parallelism factor of a workflow: total step count over wave count.
///
/// 1.0 means strictly sequential; higher values mean more steps can
/// run side by side on average.
pub fn parallelism_factor(total_steps: usize, level_count: usize) -> f64 {
    if level_count == 0 {
        0.0
    } else {
        total_steps as f64 / level_count as f64
    }
}
