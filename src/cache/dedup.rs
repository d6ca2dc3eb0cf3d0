use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::config::DedupConfig;
use crate::error::{FlightdeckError, Result};

use super::key::cache_key;

/// Outcome fanned out to joined callers. Errors cross the channel as
/// strings; classification downstream is message-based anyway.
type SharedOutcome<T> = std::result::Result<T, String>;

/// Coalesces concurrent identical calls into one underlying execution.
///
/// The first caller for a parameter hash becomes the leader and runs the
/// function; concurrent callers with the same hash subscribe to the
/// leader's outcome instead of issuing a second external call. Every call
/// races a hard per-call timeout, and the in-flight entry is removed on
/// settlement regardless of outcome, so a stalled call cannot pin the
/// slot.
pub struct Deduplicator<T> {
    in_flight: Mutex<HashMap<String, broadcast::Sender<SharedOutcome<T>>>>,
    timeout: Duration,
}

impl<T: Clone + Send + 'static> Deduplicator<T> {
    pub fn new(timeout: Duration) -> Self {
        Self {
            in_flight: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    pub fn from_config(config: &DedupConfig) -> Self {
        Self::new(config.timeout())
    }

    /// Number of calls currently in flight.
    pub fn pending(&self) -> usize {
        self.in_flight.lock().len()
    }

    pub async fn execute<P, F, Fut>(&self, params: &P, call: F) -> Result<T>
    where
        P: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.execute_with_timeout(params, call, self.timeout).await
    }

    pub async fn execute_with_timeout<P, F, Fut>(
        &self,
        params: &P,
        call: F,
        timeout: Duration,
    ) -> Result<T>
    where
        P: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let key = cache_key(params)?;

        // Join an existing in-flight call, or register as its leader.
        let mut rx = {
            let mut in_flight = self.in_flight.lock();
            match in_flight.get(&key) {
                Some(tx) => {
                    trace!(key = %key, "Joining in-flight call");
                    Some(tx.subscribe())
                }
                None => {
                    let (tx, _) = broadcast::channel(1);
                    in_flight.insert(key.clone(), tx);
                    None
                }
            }
        };

        if let Some(rx) = rx.as_mut() {
            return match rx.recv().await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(message)) => Err(FlightdeckError::SharedCall(message)),
                Err(_) => Err(FlightdeckError::SharedCall(
                    "in-flight call settled without an outcome".to_string(),
                )),
            };
        }

        let result = match tokio::time::timeout(timeout, call()).await {
            Ok(outcome) => outcome,
            Err(_) => {
                debug!(key = %key, timeout_secs = timeout.as_secs(), "In-flight call timed out");
                Err(FlightdeckError::Timeout {
                    operation: "deduplicated call".to_string(),
                    duration_secs: timeout.as_secs(),
                })
            }
        };

        // Settle: free the slot first, then fan the outcome out to any
        // callers that joined while the call ran.
        let tx = self.in_flight.lock().remove(&key);
        if let Some(tx) = tx {
            let shared = match &result {
                Ok(value) => Ok(value.clone()),
                Err(e) => Err(e.to_string()),
            };
            let _ = tx.send(shared);
        }

        result
    }
}
