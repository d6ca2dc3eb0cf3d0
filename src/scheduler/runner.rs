use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::config::SchedulerConfig;
use crate::error::{FlightdeckError, Result};

use super::groups::{build_groups, ExecutionGroup};
use super::task::{Task, TaskOutcome, TaskStatus};

/// Executes a single task. The scheduler treats it as an opaque fallible
/// unit of work; composition (admission, retry, caching) lives in the
/// executor implementation.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: &Task) -> Result<String>;
}

#[async_trait]
impl<T: TaskExecutor + ?Sized> TaskExecutor for Arc<T> {
    async fn execute(&self, task: &Task) -> Result<String> {
        (**self).execute(task).await
    }
}

/// Fired once per settled task, success or failure.
pub type ProgressFn = Arc<dyn Fn(&Task, &TaskOutcome) + Send + Sync>;

#[derive(Default)]
pub struct RunOptions {
    /// Concurrent tasks within a group; defaults to the scheduler's
    /// configured `max_parallel_tasks`.
    pub concurrency_limit: Option<usize>,
    pub on_progress: Option<ProgressFn>,
}

impl RunOptions {
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.concurrency_limit = Some(limit);
        self
    }

    pub fn with_progress(mut self, on_progress: ProgressFn) -> Self {
        self.on_progress = Some(on_progress);
        self
    }
}

/// Runs a dependency graph of tasks as strictly sequential groups with
/// bounded parallelism inside each group.
///
/// A task's failure is isolated: siblings keep running, the failure is
/// captured into the result map, and later groups still execute. Only
/// caller-level misuse (empty input, invalid graph under the `Fail`
/// cycle policy) is rejected up front.
pub struct TaskGraphScheduler {
    config: SchedulerConfig,
}

impl TaskGraphScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    /// Dependency-order the graph without running it.
    pub fn plan(&self, tasks: &[Task]) -> Result<Vec<ExecutionGroup>> {
        build_groups(tasks, self.config.cycle_policy)
    }

    pub async fn run(
        &self,
        tasks: Vec<Task>,
        executor: Arc<dyn TaskExecutor>,
        options: RunOptions,
    ) -> Result<HashMap<String, TaskOutcome>> {
        if tasks.is_empty() {
            return Err(FlightdeckError::InvalidInput(
                "no tasks to schedule".to_string(),
            ));
        }
        let groups = self.plan(&tasks)?;
        self.run_groups(groups, executor, options).await
    }

    /// Run pre-planned groups. Group *k+1* starts only once every task in
    /// group *k* has settled, including retry exhaustion inside the
    /// executor.
    pub async fn run_groups(
        &self,
        groups: Vec<ExecutionGroup>,
        executor: Arc<dyn TaskExecutor>,
        options: RunOptions,
    ) -> Result<HashMap<String, TaskOutcome>> {
        let limit = options
            .concurrency_limit
            .unwrap_or(self.config.max_parallel_tasks)
            .max(1);
        let semaphore = Arc::new(Semaphore::new(limit));
        let mut results = HashMap::new();

        for group in groups {
            info!(
                group = group.index,
                tasks = group.tasks.len(),
                forced = group.forced,
                "starting execution group"
            );

            let mut ids = Vec::with_capacity(group.tasks.len());
            let mut handles = Vec::with_capacity(group.tasks.len());
            for mut task in group.tasks {
                ids.push(task.id.clone());
                let semaphore = Arc::clone(&semaphore);
                let executor = Arc::clone(&executor);
                let on_progress = options.on_progress.clone();
                handles.push(tokio::spawn(async move {
                    let _permit = match semaphore.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(err) => {
                            return TaskOutcome::failed(
                                &FlightdeckError::Other(format!(
                                    "scheduler semaphore closed: {err}"
                                )),
                                Duration::ZERO,
                            );
                        }
                    };

                    task.status = TaskStatus::Running;
                    let started = Instant::now();
                    let outcome = match executor.execute(&task).await {
                        Ok(output) => {
                            task.status = TaskStatus::Succeeded;
                            TaskOutcome::succeeded(output, started.elapsed())
                        }
                        Err(err) => {
                            task.status = TaskStatus::Failed;
                            warn!(task_id = %task.id, error = %err, "task failed");
                            TaskOutcome::failed(&err, started.elapsed())
                        }
                    };
                    if let Some(on_progress) = &on_progress {
                        on_progress(&task, &outcome);
                    }
                    outcome
                }));
            }

            for (id, joined) in ids.into_iter().zip(join_all(handles).await) {
                let outcome = joined.unwrap_or_else(|err| {
                    TaskOutcome::failed(
                        &FlightdeckError::Other(format!("task panicked: {err}")),
                        Duration::ZERO,
                    )
                });
                results.insert(id, outcome);
            }
        }

        Ok(results)
    }
}
