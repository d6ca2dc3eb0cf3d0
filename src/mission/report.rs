use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::degradation::DegradationLevel;
use crate::scheduler::TaskOutcome;

/// One task's settled result plus the degradation level active when it
/// settled, so a failed run can be diagnosed without re-execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReport {
    pub outcome: TaskOutcome,
    pub degradation_level: DegradationLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionReport {
    pub tasks: HashMap<String, TaskReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl MissionReport {
    pub fn succeeded(&self) -> usize {
        self.tasks.values().filter(|t| t.outcome.success).count()
    }

    pub fn failed(&self) -> usize {
        self.tasks.len() - self.succeeded()
    }

    pub fn all_succeeded(&self) -> bool {
        self.tasks.values().all(|t| t.outcome.success)
    }

    pub fn summary(&self) -> String {
        format!(
            "{}/{} tasks succeeded in {}s",
            self.succeeded(),
            self.tasks.len(),
            (self.finished_at - self.started_at).num_seconds()
        )
    }
}
