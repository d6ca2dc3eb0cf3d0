use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why admission was denied. Structured reasons, never errors: denial is
/// a normal scheduling outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// All concurrency slots are occupied.
    CapacityExceeded,
    /// Call quota for the current window is spent.
    QuotaExhausted,
    /// Observed memory usage is over the configured threshold.
    MemoryPressure,
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CapacityExceeded => write!(f, "capacity-exceeded"),
            Self::QuotaExhausted => write!(f, "quota-exhausted"),
            Self::MemoryPressure => write!(f, "memory-pressure"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AdmissionDecision {
    pub allowed: bool,
    pub reason: Option<DenyReason>,
    /// How long the caller should expect to wait before the denial could
    /// lift on its own.
    pub suggested_wait: Option<Duration>,
}

impl AdmissionDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
            suggested_wait: None,
        }
    }

    pub fn deny(reason: DenyReason, suggested_wait: Duration) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            suggested_wait: Some(suggested_wait),
        }
    }
}

/// Concurrency guidance derived from the remaining-quota fraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recommendation {
    pub recommended_concurrency: usize,
    pub should_pause: bool,
    pub reason: String,
}

/// Resource bookkeeping owned exclusively by the admission controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceState {
    pub max_concurrent: usize,
    pub active: usize,
    pub quota_remaining: u64,
    pub quota_limit: u64,
    pub quota_reset_at: Option<DateTime<Utc>>,
    pub last_call_at: Option<DateTime<Utc>>,
    pub memory_bytes: Option<u64>,
}

impl ResourceState {
    pub fn quota_fraction(&self) -> f64 {
        if self.quota_limit == 0 {
            return 0.0;
        }
        self.quota_remaining as f64 / self.quota_limit as f64
    }
}
