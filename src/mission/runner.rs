use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::admission::AdmissionController;
use crate::backend::{Backend, CallRequest, CallResponse};
use crate::cache::{CacheStats, Deduplicator, ResultCache};
use crate::config::FlightdeckConfig;
use crate::degradation::{DegradationController, ExecutionTarget};
use crate::error::{FlightdeckError, Result};
use crate::retry::RetryExecutor;
use crate::scheduler::{RunOptions, Task, TaskExecutor, TaskGraphScheduler};

use super::report::{MissionReport, TaskReport};

/// Per-task call path: cache, then admission, dedup, backend, retry.
struct CallPipeline {
    admission: Arc<AdmissionController>,
    retry: RetryExecutor,
    degradation: Arc<DegradationController>,
    cache: ResultCache<CallResponse>,
    dedup: Deduplicator<CallResponse>,
    backend: Arc<dyn Backend>,
}

impl CallPipeline {
    fn request_for(&self, task: &Task) -> CallRequest {
        let request = CallRequest::new(&task.description);
        match self.degradation.target() {
            ExecutionTarget::Lightweight => request.with_target("lightweight"),
            ExecutionTarget::Primary | ExecutionTarget::CacheOnly => request,
        }
    }

    /// One admitted backend attempt. Admission is requested before the
    /// call because the call itself consumes the quota. Quota is charged
    /// inside the dedup closure: only the caller that actually issues the
    /// backend call pays, and it pays at issue time, so joined callers and
    /// timed-out calls are accounted correctly.
    async fn attempt(&self, request: &CallRequest) -> Result<CallResponse> {
        self.admission.acquire().await;
        let result = self
            .dedup
            .execute(request, || {
                self.admission.record_call(1);
                self.backend.call(request.clone())
            })
            .await;
        self.admission.release();
        result
    }

    fn apply_ceiling(&self) {
        self.admission
            .set_concurrency_ceiling(self.degradation.max_concurrent().max(1));
    }
}

#[async_trait]
impl TaskExecutor for CallPipeline {
    async fn execute(&self, task: &Task) -> Result<String> {
        let request = self.request_for(task);
        let caching = self.degradation.is_feature_available("result_caching");
        let cache_only = self.degradation.target() == ExecutionTarget::CacheOnly;

        if caching || cache_only {
            if let Some(hit) = self.cache.get(&request)? {
                debug!(task_id = %task.id, "Serving task from result cache");
                return Ok(hit.content);
            }
        }

        if cache_only {
            return Err(FlightdeckError::FeatureUnavailable {
                feature: "backend calls".to_string(),
                level: self.degradation.level().to_string(),
            });
        }

        match self.retry.execute(|| self.attempt(&request)).await {
            Ok(response) => {
                if self.degradation.record_success().is_some() {
                    self.apply_ceiling();
                }
                if caching {
                    self.cache.set(&request, response.clone())?;
                }
                Ok(response.content)
            }
            Err(err) => {
                if self.degradation.record_failure(err.class()).is_some() {
                    self.apply_ceiling();
                }
                Err(err)
            }
        }
    }
}

/// Runs a mission's task graph end to end and reports per-task results.
///
/// Owns explicit instances of every control component; nothing is shared
/// across runners, so two missions (or two tests) never observe each
/// other's state.
pub struct MissionRunner {
    scheduler: TaskGraphScheduler,
    pipeline: Arc<CallPipeline>,
    max_parallel_tasks: usize,
}

impl MissionRunner {
    pub fn new(config: FlightdeckConfig, backend: Arc<dyn Backend>) -> Self {
        let pipeline = CallPipeline {
            admission: Arc::new(AdmissionController::new(config.admission.clone())),
            retry: RetryExecutor::new(config.retry.clone()),
            degradation: Arc::new(DegradationController::new(config.degradation.clone())),
            cache: ResultCache::from_config(&config.cache),
            dedup: Deduplicator::from_config(&config.dedup),
            backend,
        };
        Self {
            scheduler: TaskGraphScheduler::new(config.scheduler.clone()),
            pipeline: Arc::new(pipeline),
            max_parallel_tasks: config.scheduler.max_parallel_tasks,
        }
    }

    pub fn admission(&self) -> &Arc<AdmissionController> {
        &self.pipeline.admission
    }

    pub fn degradation(&self) -> &Arc<DegradationController> {
        &self.pipeline.degradation
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.pipeline.cache.stats()
    }

    pub async fn run(&self, tasks: Vec<Task>) -> Result<MissionReport> {
        let started_at = Utc::now();
        let task_count = tasks.len();
        info!(tasks = task_count, "Starting mission run");

        let concurrency = if self.pipeline.degradation.is_feature_available("parallel_dispatch") {
            self.max_parallel_tasks
                .min(self.pipeline.degradation.max_concurrent().max(1))
        } else {
            1
        };

        // Sampled as each task settles, so a failure is tied to the level
        // that was active at the time, not the level at end of run.
        let levels: Arc<Mutex<HashMap<String, _>>> = Arc::new(Mutex::new(HashMap::new()));
        let options = {
            let levels = Arc::clone(&levels);
            let degradation = Arc::clone(&self.pipeline.degradation);
            RunOptions::default()
                .with_concurrency(concurrency)
                .with_progress(Arc::new(move |task, _outcome| {
                    levels.lock().insert(task.id.clone(), degradation.level());
                }))
        };

        let executor: Arc<dyn TaskExecutor> = Arc::clone(&self.pipeline) as Arc<dyn TaskExecutor>;
        let outcomes = self.scheduler.run(tasks, executor, options).await?;

        let levels = levels.lock();
        let final_level = self.pipeline.degradation.level();
        let tasks = outcomes
            .into_iter()
            .map(|(id, outcome)| {
                let degradation_level = levels.get(&id).copied().unwrap_or(final_level);
                (
                    id,
                    TaskReport {
                        outcome,
                        degradation_level,
                    },
                )
            })
            .collect();

        let report = MissionReport {
            tasks,
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            level = %final_level,
            "Mission run finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::config::{DegradationConfig, RetryConfig};
    use crate::degradation::DegradationLevel;
    use crate::error::ErrorClass;

    struct CountingBackend {
        calls: AtomicU32,
    }

    impl CountingBackend {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl Backend for CountingBackend {
        async fn call(&self, request: CallRequest) -> Result<CallResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(CallResponse::new(format!("answer to: {}", request.prompt)))
        }
    }

    struct AlwaysRateLimited;

    #[async_trait]
    impl Backend for AlwaysRateLimited {
        async fn call(&self, _request: CallRequest) -> Result<CallResponse> {
            Err(FlightdeckError::Backend("HTTP 429 Too Many Requests".into()))
        }
    }

    fn fast_retry() -> RetryConfig {
        let mut retry = RetryConfig::default();
        for policy in [
            &mut retry.rate_limit,
            &mut retry.network,
            &mut retry.timeout,
            &mut retry.validation,
            &mut retry.unknown,
        ] {
            policy.base_delay_ms = 1;
            policy.max_delay_ms = 2;
            policy.jitter_fraction = 0.0;
        }
        retry
    }

    fn diamond() -> Vec<Task> {
        vec![
            Task::new("plan", "draft a plan"),
            Task::new("research", "gather sources").with_dependency("plan"),
            Task::new("outline", "outline sections").with_dependency("plan"),
            Task::new("write", "write the report").with_dependencies(["research", "outline"]),
        ]
    }

    #[tokio::test]
    async fn healthy_run_reports_every_task() {
        let backend = CountingBackend::new();
        let runner = MissionRunner::new(FlightdeckConfig::default(), backend);

        let report = runner.run(diamond()).await.unwrap();
        assert_eq!(report.tasks.len(), 4);
        assert!(report.all_succeeded());
        assert!(report
            .tasks
            .values()
            .all(|t| t.degradation_level == DegradationLevel::Full));
        assert_eq!(
            report.tasks["write"].outcome.output.as_deref(),
            Some("answer to: write the report")
        );
    }

    #[tokio::test]
    async fn identical_prompts_are_served_from_cache() {
        let backend = CountingBackend::new();
        let runner = MissionRunner::new(FlightdeckConfig::default(), Arc::clone(&backend) as Arc<dyn Backend>);

        let tasks = vec![
            Task::new("first", "summarize the corpus"),
            Task::new("second", "summarize the corpus").with_dependency("first"),
        ];
        let report = runner.run(tasks).await.unwrap();
        assert!(report.all_succeeded());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(runner.cache_stats().hits, 1);
    }

    #[tokio::test]
    async fn failures_carry_class_and_level_at_failure_time() {
        let mut config = FlightdeckConfig::default();
        config.retry = fast_retry();
        config.degradation = DegradationConfig {
            degrade_threshold: 1,
            rate_limit_degrade_threshold: 1,
            recovery_threshold: 3,
        };
        let runner = MissionRunner::new(config, Arc::new(AlwaysRateLimited));

        let tasks = vec![
            Task::new("a", "first prompt"),
            Task::new("b", "second prompt").with_dependency("a"),
        ];
        let report = runner.run(tasks).await.unwrap();

        assert_eq!(report.failed(), 2);
        let first = &report.tasks["a"];
        assert_eq!(first.outcome.error_class, Some(ErrorClass::RateLimit));
        assert_eq!(first.degradation_level, DegradationLevel::Reduced);
        // The second task settled after a further degradation step.
        assert_eq!(
            report.tasks["b"].degradation_level,
            DegradationLevel::Minimal
        );
    }

    #[tokio::test]
    async fn offline_level_serves_only_from_cache() {
        let backend = CountingBackend::new();
        let mut config = FlightdeckConfig::default();
        config.retry = fast_retry();
        let runner = MissionRunner::new(config, Arc::clone(&backend) as Arc<dyn Backend>);

        // Warm the cache while healthy.
        runner
            .run(vec![Task::new("warm", "cached prompt")])
            .await
            .unwrap();

        // Drive the controller to offline.
        for _ in 0..15 {
            runner.degradation().record_failure(ErrorClass::RateLimit);
        }
        assert_eq!(runner.degradation().level(), DegradationLevel::Offline);

        let report = runner
            .run(vec![
                Task::new("hit", "cached prompt"),
                Task::new("miss", "never seen before"),
            ])
            .await
            .unwrap();

        assert!(report.tasks["hit"].outcome.success);
        assert!(!report.tasks["miss"].outcome.success);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }
}
