use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorClass, FlightdeckError};

/// Backend failure messages can embed whole responses; reports keep a
/// bounded prefix.
const MAX_ERROR_LEN: usize = 2_000;

/// Cap an error message at `max_bytes`, never splitting a UTF-8 sequence.
fn bounded_error(message: &str, max_bytes: usize) -> String {
    if message.len() <= max_bytes {
        return message.to_string();
    }
    let mut end = max_bytes;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...[truncated]", &message[..end])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One unit of work in a mission's dependency graph. Created per run and
/// discarded afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub estimated_duration: Option<Duration>,
    #[serde(default)]
    pub status: TaskStatus,
}

impl Task {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            dependencies: Vec::new(),
            priority: 0,
            estimated_duration: None,
            status: TaskStatus::Pending,
        }
    }

    pub fn with_dependency(mut self, id: impl Into<String>) -> Self {
        self.dependencies.push(id.into());
        self
    }

    pub fn with_dependencies<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_estimated_duration(mut self, duration: Duration) -> Self {
        self.estimated_duration = Some(duration);
        self
    }
}

/// Settled result of a single task, captured into the run's result map
/// whether the task succeeded or failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub success: bool,
    pub output: Option<String>,
    pub error: Option<String>,
    pub error_class: Option<ErrorClass>,
    pub duration: Duration,
}

impl TaskOutcome {
    pub fn succeeded(output: impl Into<String>, duration: Duration) -> Self {
        Self {
            success: true,
            output: Some(output.into()),
            error: None,
            error_class: None,
            duration,
        }
    }

    pub fn failed(error: &FlightdeckError, duration: Duration) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(bounded_error(&error.to_string(), MAX_ERROR_LEN)),
            error_class: Some(error.class()),
            duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_accumulates_dependencies() {
        let task = Task::new("build", "compile the project")
            .with_dependency("fetch")
            .with_dependency("configure")
            .with_priority(5);
        assert_eq!(task.dependencies, vec!["fetch", "configure"]);
        assert_eq!(task.priority, 5);
        assert_eq!(task.status, TaskStatus::Pending);
    }

    #[test]
    fn failed_outcome_carries_the_error_class() {
        let err = FlightdeckError::Backend("429 too many requests".into());
        let outcome = TaskOutcome::failed(&err, Duration::from_millis(12));
        assert!(!outcome.success);
        assert_eq!(outcome.error_class, Some(ErrorClass::RateLimit));
        assert!(outcome.error.unwrap().contains("429"));
    }

    #[test]
    fn short_error_messages_pass_through_unchanged() {
        assert_eq!(bounded_error("connection reset", 100), "connection reset");
    }

    #[test]
    fn long_error_messages_are_capped_with_a_marker() {
        assert_eq!(bounded_error("hello world", 5), "hello...[truncated]");
    }

    #[test]
    fn capping_never_splits_a_multibyte_char() {
        // The cap falls mid-character; the whole character is dropped.
        assert_eq!(bounded_error("héllo", 2), "h...[truncated]");

        let korean = "안녕하세요 세계입니다";
        let capped = bounded_error(korean, 10);
        assert!(capped.ends_with("...[truncated]"));
        assert!(!capped.contains('\u{FFFD}'));
    }
}
