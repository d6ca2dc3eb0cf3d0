use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::backend::TelemetrySource;
use crate::config::AdmissionConfig;

use super::types::{AdmissionDecision, DenyReason, Recommendation, ResourceState};

struct Waiter {
    id: u64,
    /// Taken when the waiter is signalled; replaced by the waiter itself
    /// if it wakes up and finds the denial still in force.
    signal: Option<oneshot::Sender<()>>,
}

struct Inner {
    max_concurrent: usize,
    active: usize,
    quota_remaining: u64,
    quota_reset_at: Option<DateTime<Utc>>,
    last_call_at: Option<DateTime<Utc>>,
    memory_bytes: Option<u64>,
    waiters: VecDeque<Waiter>,
    next_waiter_id: u64,
}

/// Gates backend calls on concurrency, quota, and memory headroom.
///
/// Waiters queue in strict arrival order. Slot releases and quota resets
/// signal the queue head directly; denials that only time can lift (quota
/// windows, memory backoff) are re-checked by the head on a bounded
/// interval instead of a tight poll loop.
pub struct AdmissionController {
    config: AdmissionConfig,
    inner: Mutex<Inner>,
}

impl AdmissionController {
    pub fn new(config: AdmissionConfig) -> Self {
        let inner = Inner {
            max_concurrent: config.max_concurrent,
            active: 0,
            quota_remaining: config.quota_limit,
            quota_reset_at: None,
            last_call_at: None,
            memory_bytes: None,
            waiters: VecDeque::new(),
            next_waiter_id: 0,
        };
        Self {
            config,
            inner: Mutex::new(inner),
        }
    }

    /// Single-point admission check against the current resource state.
    /// Never errors: denial is a scheduling outcome, not a failure.
    pub fn can_admit(&self) -> AdmissionDecision {
        let inner = self.inner.lock();
        self.decide(&inner)
    }

    fn decide(&self, inner: &Inner) -> AdmissionDecision {
        if inner.active >= inner.max_concurrent {
            return AdmissionDecision::deny(
                DenyReason::CapacityExceeded,
                self.recheck_interval(),
            );
        }
        if inner.quota_remaining == 0 {
            let wait = inner
                .quota_reset_at
                .and_then(|at| (at - Utc::now()).to_std().ok())
                .unwrap_or_else(|| Duration::from_secs(self.config.default_quota_wait_secs));
            return AdmissionDecision::deny(DenyReason::QuotaExhausted, wait);
        }
        if let Some(bytes) = inner.memory_bytes {
            if bytes > self.config.memory_threshold_bytes {
                return AdmissionDecision::deny(
                    DenyReason::MemoryPressure,
                    Duration::from_secs(self.config.memory_backoff_secs),
                );
            }
        }
        AdmissionDecision::allow()
    }

    /// Wait until a slot is admitted, in strict arrival order.
    ///
    /// The caller owns the slot afterwards and must pair it with
    /// [`release`](Self::release).
    pub async fn acquire(&self) {
        let (id, mut rx) = {
            let mut inner = self.inner.lock();
            if inner.waiters.is_empty() && self.decide(&inner).allowed {
                inner.active += 1;
                return;
            }
            let id = inner.next_waiter_id;
            inner.next_waiter_id += 1;
            let (tx, rx) = oneshot::channel();
            inner.waiters.push_back(Waiter {
                id,
                signal: Some(tx),
            });
            (id, rx)
        };

        loop {
            let signalled = tokio::time::timeout(self.recheck_interval(), &mut rx)
                .await
                .is_ok();

            let mut inner = self.inner.lock();
            let is_head = inner.waiters.front().map(|w| w.id) == Some(id);
            if !is_head {
                // Signals only ever target the head, so a non-head waiter
                // got here via its recheck timer. Keep waiting.
                if signalled {
                    warn!(waiter_id = id, "admission signal reached a non-head waiter");
                    let (tx, new_rx) = oneshot::channel();
                    if let Some(w) = inner.waiters.iter_mut().find(|w| w.id == id) {
                        w.signal = Some(tx);
                    }
                    rx = new_rx;
                }
                continue;
            }

            let decision = self.decide(&inner);
            if decision.allowed {
                inner.waiters.pop_front();
                inner.active += 1;
                // The next waiter may also be admissible (e.g. quota reset
                // freed more than one slot's worth of headroom).
                Self::signal_head(&mut inner);
                return;
            }

            debug!(
                waiter_id = id,
                reason = %decision.reason.map(|r| r.to_string()).unwrap_or_default(),
                "admission still denied at queue head"
            );
            // Re-arm the signal channel if this wake consumed it.
            let (tx, new_rx) = oneshot::channel();
            if let Some(head) = inner.waiters.front_mut() {
                head.signal = Some(tx);
                rx = new_rx;
            }
        }
    }

    /// Return a slot taken by [`acquire`](Self::acquire) and wake the
    /// queue head.
    pub fn release(&self) {
        let mut inner = self.inner.lock();
        inner.active = inner.active.saturating_sub(1);
        Self::signal_head(&mut inner);
    }

    fn signal_head(inner: &mut Inner) {
        while let Some(head) = inner.waiters.front_mut() {
            match head.signal.take() {
                Some(tx) => {
                    if tx.send(()).is_ok() {
                        return;
                    }
                    // Receiver dropped: the waiter was cancelled. Discard
                    // the entry so it cannot stall the queue.
                    inner.waiters.pop_front();
                }
                // Already signalled; the wake is in flight.
                None => return,
            }
        }
    }

    /// Record a completed call's quota cost.
    pub fn record_call(&self, cost: u64) {
        let mut inner = self.inner.lock();
        inner.quota_remaining = inner.quota_remaining.saturating_sub(cost);
        inner.last_call_at = Some(Utc::now());
    }

    /// Restore the full quota window and wake the queue head.
    pub fn reset_quota(&self) {
        let mut inner = self.inner.lock();
        inner.quota_remaining = self.config.quota_limit;
        inner.quota_reset_at = None;
        Self::signal_head(&mut inner);
    }

    /// Pull memory usage and quota-reset timing from a telemetry source.
    pub fn observe(&self, source: &dyn TelemetrySource) {
        let memory = source.memory_usage();
        let reset_at = source.quota_reset_at();
        let mut inner = self.inner.lock();
        inner.memory_bytes = memory;
        if reset_at.is_some() {
            inner.quota_reset_at = reset_at;
        }
        // Falling memory can lift a pressure denial without any release.
        Self::signal_head(&mut inner);
    }

    /// Lower or restore the concurrency ceiling, e.g. when the
    /// degradation level changes.
    pub fn set_concurrency_ceiling(&self, ceiling: usize) {
        let mut inner = self.inner.lock();
        inner.max_concurrent = ceiling.max(1);
        Self::signal_head(&mut inner);
    }

    /// Concurrency guidance from the remaining-quota fraction. Monotone:
    /// less quota never recommends more concurrency.
    pub fn recommend(&self) -> Recommendation {
        let state = self.state();
        let fraction = state.quota_fraction();
        if fraction < self.config.pause_quota_fraction {
            Recommendation {
                recommended_concurrency: 1,
                should_pause: true,
                reason: format!("quota nearly exhausted ({:.0}% remaining)", fraction * 100.0),
            }
        } else if fraction < self.config.reduce_quota_fraction {
            Recommendation {
                recommended_concurrency: (state.max_concurrent / 2).max(1),
                should_pause: false,
                reason: format!("quota running low ({:.0}% remaining)", fraction * 100.0),
            }
        } else {
            Recommendation {
                recommended_concurrency: state.max_concurrent,
                should_pause: false,
                reason: "quota healthy".to_string(),
            }
        }
    }

    /// Snapshot of the current resource bookkeeping.
    pub fn state(&self) -> ResourceState {
        let inner = self.inner.lock();
        ResourceState {
            max_concurrent: inner.max_concurrent,
            active: inner.active,
            quota_remaining: inner.quota_remaining,
            quota_limit: self.config.quota_limit,
            quota_reset_at: inner.quota_reset_at,
            last_call_at: inner.last_call_at,
            memory_bytes: inner.memory_bytes,
        }
    }

    fn recheck_interval(&self) -> Duration {
        Duration::from_millis(self.config.recheck_interval_ms.max(1))
    }
}
