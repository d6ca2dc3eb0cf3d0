use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{FlightdeckError, Result};

use super::task::Task;

/// What to do when the dependency graph contains a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePolicy {
    /// Force-select the first remaining task so every task still runs
    /// exactly once. Ordering for the forced task is not guaranteed.
    #[default]
    ForceProgress,
    /// Reject the graph with an error naming the tasks caught in the
    /// cycle.
    Fail,
}

impl std::fmt::Display for CyclePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ForceProgress => write!(f, "force_progress"),
            Self::Fail => write!(f, "fail"),
        }
    }
}

/// An ordered batch of tasks whose dependencies are all satisfied by
/// strictly earlier groups, except when `forced` marks a cycle escape.
#[derive(Debug, Clone)]
pub struct ExecutionGroup {
    pub index: usize,
    pub tasks: Vec<Task>,
    pub forced: bool,
}

/// Partition a task list into dependency-ordered execution groups.
///
/// Repeatedly collects every not-yet-grouped task whose dependencies are
/// already grouped. When none qualify, the remaining tasks form a cycle
/// and `policy` decides between forcing progress and failing.
///
/// Within a group, tasks are ordered by descending priority purely as a
/// scheduling hint; members run concurrently so it has no correctness
/// effect.
pub fn build_groups(tasks: &[Task], policy: CyclePolicy) -> Result<Vec<ExecutionGroup>> {
    let mut seen: HashSet<&str> = HashSet::new();
    for task in tasks {
        if !seen.insert(&task.id) {
            return Err(FlightdeckError::InvalidInput(format!(
                "duplicate task id '{}'",
                task.id
            )));
        }
    }
    for task in tasks {
        for dep in &task.dependencies {
            if !seen.contains(dep.as_str()) {
                return Err(FlightdeckError::InvalidInput(format!(
                    "task '{}' depends on unknown task '{}'",
                    task.id, dep
                )));
            }
        }
    }

    let mut remaining: Vec<Task> = tasks.to_vec();
    let mut grouped: HashSet<String> = HashSet::new();
    let mut groups = Vec::new();

    while !remaining.is_empty() {
        let mut ready = Vec::new();
        let mut deferred = Vec::new();
        for task in remaining {
            if task.dependencies.iter().all(|dep| grouped.contains(dep)) {
                ready.push(task);
            } else {
                deferred.push(task);
            }
        }

        let index = groups.len();
        if ready.is_empty() {
            match policy {
                CyclePolicy::Fail => {
                    let tasks = deferred.into_iter().map(|t| t.id).collect();
                    return Err(FlightdeckError::DependencyCycle { tasks });
                }
                CyclePolicy::ForceProgress => {
                    let forced = deferred.remove(0);
                    warn!(
                        task_id = %forced.id,
                        group = index,
                        "dependency cycle detected, forcing task into its own group"
                    );
                    grouped.insert(forced.id.clone());
                    groups.push(ExecutionGroup {
                        index,
                        tasks: vec![forced],
                        forced: true,
                    });
                }
            }
        } else {
            ready.sort_by_key(|task| std::cmp::Reverse(task.priority));
            grouped.extend(ready.iter().map(|t| t.id.clone()));
            groups.push(ExecutionGroup {
                index,
                tasks: ready,
                forced: false,
            });
        }
        remaining = deferred;
    }

    Ok(groups)
}
