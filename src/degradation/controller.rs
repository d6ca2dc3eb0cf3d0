use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::config::DegradationConfig;
use crate::error::ErrorClass;

use super::level::{DegradationLevel, ExecutionTarget, LevelConfig};

struct Inner {
    level: DegradationLevel,
    failure_count: u32,
    success_count: u32,
}

/// Tiered state machine reacting to classified outcomes.
///
/// Sustained failure steps the active level down one tier at a time;
/// sustained success steps it back up, one tier at a time. Transitions
/// never skip a level, and counters reset on every transition and on
/// every direction change (the thresholds count *consecutive* outcomes).
pub struct DegradationController {
    config: DegradationConfig,
    levels: HashMap<DegradationLevel, LevelConfig>,
    inner: RwLock<Inner>,
}

impl DegradationController {
    pub fn new(config: DegradationConfig) -> Self {
        let levels = [
            DegradationLevel::Full,
            DegradationLevel::Reduced,
            DegradationLevel::Minimal,
            DegradationLevel::Offline,
        ]
        .into_iter()
        .map(|l| (l, l.default_config()))
        .collect();

        Self {
            config,
            levels,
            inner: RwLock::new(Inner {
                level: DegradationLevel::Full,
                failure_count: 0,
                success_count: 0,
            }),
        }
    }

    /// Override one level's definition (features, target, ceiling).
    pub fn with_level_config(mut self, level: DegradationLevel, config: LevelConfig) -> Self {
        self.levels.insert(level, config);
        self
    }

    pub fn level(&self) -> DegradationLevel {
        self.inner.read().level
    }

    /// Record a classified failure. Returns the new level if this failure
    /// crossed the degrade threshold.
    pub fn record_failure(&self, class: ErrorClass) -> Option<DegradationLevel> {
        let threshold = match class {
            ErrorClass::RateLimit => self.config.rate_limit_degrade_threshold,
            _ => self.config.degrade_threshold,
        };

        let mut inner = self.inner.write();
        inner.success_count = 0;
        inner.failure_count += 1;

        if inner.failure_count < threshold {
            return None;
        }

        let from = inner.level;
        let to = from.step_down();
        inner.failure_count = 0;
        inner.success_count = 0;
        if to == from {
            return None;
        }
        inner.level = to;
        warn!(%from, %to, %class, "Degrading after sustained failures");
        Some(to)
    }

    /// Record a success. Returns the new level if this success crossed
    /// the recovery threshold while below `Full`.
    pub fn record_success(&self) -> Option<DegradationLevel> {
        let mut inner = self.inner.write();
        inner.failure_count = 0;

        if inner.level == DegradationLevel::Full {
            inner.success_count = 0;
            return None;
        }

        inner.success_count += 1;
        if inner.success_count < self.config.recovery_threshold {
            return None;
        }

        let from = inner.level;
        let to = from.step_up();
        inner.failure_count = 0;
        inner.success_count = 0;
        inner.level = to;
        info!(%from, %to, "Recovering after sustained successes");
        Some(to)
    }

    /// Pure read: whether the named feature is allowed at the active level.
    pub fn is_feature_available(&self, name: &str) -> bool {
        self.active_config().has_feature(name)
    }

    /// Pure read: the active level's full definition.
    pub fn active_config(&self) -> LevelConfig {
        let level = self.inner.read().level;
        self.levels
            .get(&level)
            .cloned()
            .unwrap_or_else(|| level.default_config())
    }

    pub fn target(&self) -> ExecutionTarget {
        self.active_config().target
    }

    pub fn max_concurrent(&self) -> usize {
        self.active_config().max_concurrent
    }
}
