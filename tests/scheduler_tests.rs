use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use flightdeck::config::SchedulerConfig;
use flightdeck::{
    build_groups, CyclePolicy, FlightdeckError, Result, RunOptions, Task, TaskExecutor,
    TaskGraphScheduler,
};

/// Route crate logs through the test harness; `RUST_LOG` controls verbosity.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct EchoExecutor;

#[async_trait]
impl TaskExecutor for EchoExecutor {
    async fn execute(&self, task: &Task) -> Result<String> {
        Ok(format!("done:{}", task.id))
    }
}

struct FailOn(&'static str);

#[async_trait]
impl TaskExecutor for FailOn {
    async fn execute(&self, task: &Task) -> Result<String> {
        if task.id == self.0 {
            Err(FlightdeckError::Backend("boom".into()))
        } else {
            Ok(format!("done:{}", task.id))
        }
    }
}

fn diamond() -> Vec<Task> {
    vec![
        Task::new("1", ""),
        Task::new("2", "").with_dependency("1"),
        Task::new("3", "").with_dependency("1"),
        Task::new("4", "").with_dependencies(["2", "3"]),
    ]
}

#[test]
fn diamond_plans_into_expected_groups() {
    let groups = build_groups(&diamond(), CyclePolicy::Fail).unwrap();
    let ids: Vec<Vec<&str>> = groups
        .iter()
        .map(|g| {
            let mut ids: Vec<&str> = g.tasks.iter().map(|t| t.id.as_str()).collect();
            ids.sort();
            ids
        })
        .collect();
    assert_eq!(ids, vec![vec!["1"], vec!["2", "3"], vec!["4"]]);
}

#[test]
fn dependencies_always_land_in_strictly_earlier_groups() {
    let tasks = vec![
        Task::new("fetch", ""),
        Task::new("parse", "").with_dependency("fetch"),
        Task::new("lint", "").with_dependency("parse"),
        Task::new("docs", "").with_dependency("parse"),
        Task::new("build", "").with_dependencies(["parse", "lint"]),
        Task::new("test", "").with_dependencies(["build", "docs"]),
        Task::new("standalone", ""),
    ];
    let groups = build_groups(&tasks, CyclePolicy::Fail).unwrap();

    let mut group_of = HashMap::new();
    for group in &groups {
        for task in &group.tasks {
            group_of.insert(task.id.clone(), group.index);
        }
    }
    for task in &tasks {
        for dep in &task.dependencies {
            assert!(
                group_of[dep] < group_of[&task.id],
                "{} must be grouped before {}",
                dep,
                task.id
            );
        }
    }
}

#[test]
fn cyclic_graphs_still_cover_every_task_exactly_once() {
    let tasks = vec![
        Task::new("a", "").with_dependency("b"),
        Task::new("b", "").with_dependency("c"),
        Task::new("c", "").with_dependency("a"),
        Task::new("d", "").with_dependency("b"),
        Task::new("e", ""),
    ];
    let groups = build_groups(&tasks, CyclePolicy::ForceProgress).unwrap();

    let ids: Vec<String> = groups
        .iter()
        .flat_map(|g| g.tasks.iter().map(|t| t.id.clone()))
        .collect();
    assert_eq!(ids.len(), tasks.len());
    assert_eq!(ids.iter().collect::<HashSet<_>>().len(), tasks.len());
}

#[test]
fn cyclic_graphs_can_be_rejected_instead() {
    let tasks = vec![
        Task::new("a", "").with_dependency("b"),
        Task::new("b", "").with_dependency("a"),
    ];
    assert!(matches!(
        build_groups(&tasks, CyclePolicy::Fail),
        Err(FlightdeckError::DependencyCycle { .. })
    ));
}

#[tokio::test]
async fn settled_results_are_identical_across_concurrency_limits() {
    init_tracing();
    let scheduler = TaskGraphScheduler::new(SchedulerConfig::default());

    let serial = scheduler
        .run(
            diamond(),
            Arc::new(FailOn("3")),
            RunOptions::default().with_concurrency(1),
        )
        .await
        .unwrap();
    let parallel = scheduler
        .run(
            diamond(),
            Arc::new(FailOn("3")),
            RunOptions::default().with_concurrency(4),
        )
        .await
        .unwrap();

    assert_eq!(serial.len(), parallel.len());
    for (id, outcome) in &serial {
        let other = &parallel[id];
        assert_eq!(outcome.success, other.success);
        assert_eq!(outcome.output, other.output);
        assert_eq!(outcome.error_class, other.error_class);
    }
    assert!(!serial["3"].success);
    assert!(serial["4"].success);
}

#[tokio::test]
async fn every_task_settles_even_when_the_graph_is_cyclic() {
    init_tracing();
    let scheduler = TaskGraphScheduler::new(SchedulerConfig {
        cycle_policy: CyclePolicy::ForceProgress,
        ..SchedulerConfig::default()
    });
    let tasks = vec![
        Task::new("a", "").with_dependency("b"),
        Task::new("b", "").with_dependency("a"),
        Task::new("c", "").with_dependency("a"),
    ];
    let results = scheduler
        .run(tasks, Arc::new(EchoExecutor), RunOptions::default())
        .await
        .unwrap();
    assert_eq!(results.len(), 3);
    assert!(results.values().all(|o| o.success));
}
