use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use flightdeck::config::{DegradationConfig, RetryConfig};
use flightdeck::{
    Backend, CallRequest, CallResponse, DegradationLevel, ErrorClass, FlightdeckConfig,
    FlightdeckError, MissionRunner, Result, Task,
};

/// Route crate logs through the test harness; `RUST_LOG` controls verbosity.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
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

/// Fails each distinct prompt a fixed number of times before succeeding.
struct FlakyBackend {
    failures_per_prompt: u32,
    calls: AtomicU32,
    seen: Mutex<HashMap<String, u32>>,
}

impl FlakyBackend {
    fn new(failures_per_prompt: u32) -> Arc<Self> {
        Arc::new(Self {
            failures_per_prompt,
            calls: AtomicU32::new(0),
            seen: Mutex::new(HashMap::new()),
        })
    }
}

#[async_trait]
impl Backend for FlakyBackend {
    async fn call(&self, request: CallRequest) -> Result<CallResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut seen = self.seen.lock();
        let count = seen.entry(request.prompt.clone()).or_insert(0);
        *count += 1;
        if *count <= self.failures_per_prompt {
            Err(FlightdeckError::Backend("HTTP 429 Too Many Requests".into()))
        } else {
            Ok(CallResponse::new(format!("answer to: {}", request.prompt)))
        }
    }
}

struct SlowBackend {
    calls: AtomicU32,
}

#[async_trait]
impl Backend for SlowBackend {
    async fn call(&self, request: CallRequest) -> Result<CallResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(CallResponse::new(format!("answer to: {}", request.prompt)))
    }
}

#[tokio::test]
async fn transient_failures_recover_within_the_retry_budget() {
    init_tracing();
    let backend = FlakyBackend::new(2);
    let mut config = FlightdeckConfig::default();
    config.retry = fast_retry();
    let runner = MissionRunner::new(config, Arc::clone(&backend) as Arc<dyn Backend>);

    let tasks = vec![
        Task::new("plan", "draft a plan"),
        Task::new("write", "write it up").with_dependency("plan"),
    ];
    let report = runner.run(tasks).await.unwrap();

    assert!(report.all_succeeded());
    // Two prompts, each failing twice before the third attempt lands.
    assert_eq!(backend.calls.load(Ordering::SeqCst), 6);
    assert_eq!(
        report.tasks["write"].outcome.output.as_deref(),
        Some("answer to: write it up")
    );
}

#[tokio::test]
async fn every_backend_call_is_charged_against_the_quota() {
    init_tracing();
    let backend = FlakyBackend::new(0);
    let runner = MissionRunner::new(
        FlightdeckConfig::default(),
        Arc::clone(&backend) as Arc<dyn Backend>,
    );

    let tasks = vec![
        Task::new("a", "prompt one"),
        Task::new("b", "prompt two").with_dependency("a"),
        Task::new("c", "prompt three").with_dependency("a"),
    ];
    runner.run(tasks).await.unwrap();

    let state = runner.admission().state();
    assert_eq!(state.quota_remaining, state.quota_limit - 3);
    assert!(state.last_call_at.is_some());
    assert_eq!(state.active, 0);
}

#[tokio::test]
async fn concurrent_identical_prompts_collapse_to_one_call() {
    init_tracing();
    let backend = Arc::new(SlowBackend {
        calls: AtomicU32::new(0),
    });
    let runner = MissionRunner::new(
        FlightdeckConfig::default(),
        Arc::clone(&backend) as Arc<dyn Backend>,
    );

    // No dependencies: all three run in the same group, concurrently.
    let tasks = vec![
        Task::new("a", "shared prompt"),
        Task::new("b", "shared prompt"),
        Task::new("c", "shared prompt"),
    ];
    let report = runner.run(tasks).await.unwrap();

    assert!(report.all_succeeded());
    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    for task in report.tasks.values() {
        assert_eq!(
            task.outcome.output.as_deref(),
            Some("answer to: shared prompt")
        );
    }
    // Joined callers issued no backend call, so only the leader pays quota.
    let state = runner.admission().state();
    assert_eq!(state.quota_remaining, state.quota_limit - 1);
}

#[tokio::test]
async fn sustained_failure_tightens_the_admission_ceiling() {
    init_tracing();
    let mut config = FlightdeckConfig::default();
    config.retry = fast_retry();
    config.degradation = DegradationConfig {
        degrade_threshold: 1,
        rate_limit_degrade_threshold: 1,
        recovery_threshold: 3,
    };
    // Never succeeds: every settled task is a rate-limit failure.
    let backend = FlakyBackend::new(u32::MAX);
    let runner = MissionRunner::new(config, backend as Arc<dyn Backend>);

    let tasks = vec![
        Task::new("a", "first"),
        Task::new("b", "second").with_dependency("a"),
    ];
    let report = runner.run(tasks).await.unwrap();

    assert_eq!(report.failed(), 2);
    assert_eq!(
        report.tasks["a"].outcome.error_class,
        Some(ErrorClass::RateLimit)
    );
    assert_eq!(runner.degradation().level(), DegradationLevel::Minimal);
    // The degradation step propagated into admission's ceiling.
    assert_eq!(runner.admission().state().max_concurrent, 1);
}
