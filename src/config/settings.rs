use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{ErrorClass, FlightdeckError, Result};
use crate::scheduler::CyclePolicy;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FlightdeckConfig {
    pub scheduler: SchedulerConfig,
    pub admission: AdmissionConfig,
    pub retry: RetryConfig,
    pub degradation: DegradationConfig,
    pub context: ContextConfig,
    pub cache: CacheConfig,
    pub dedup: DedupConfig,
}

impl FlightdeckConfig {
    pub async fn load(config_path: &Path) -> Result<Self> {
        let config = if config_path.exists() {
            let content = fs::read_to_string(config_path).await?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub async fn save(&self, config_path: &Path) -> Result<()> {
        self.validate()?;
        let content =
            toml::to_string_pretty(self).map_err(|e| FlightdeckError::Config(e.to_string()))?;
        fs::write(config_path, content).await?;
        Ok(())
    }

    /// Validate configuration values for consistency and safety.
    /// Collects all violations rather than failing on the first.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.scheduler.max_parallel_tasks == 0 {
            errors.push("scheduler.max_parallel_tasks must be greater than 0".to_string());
        }

        if self.admission.max_concurrent == 0 {
            errors.push("admission.max_concurrent must be greater than 0".to_string());
        }
        if self.admission.recheck_interval_ms == 0 {
            errors.push("admission.recheck_interval_ms must be greater than 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.admission.pause_quota_fraction) {
            errors.push("admission.pause_quota_fraction must be between 0.0 and 1.0".to_string());
        }
        if !(0.0..=1.0).contains(&self.admission.reduce_quota_fraction) {
            errors.push("admission.reduce_quota_fraction must be between 0.0 and 1.0".to_string());
        }
        if self.admission.pause_quota_fraction > self.admission.reduce_quota_fraction {
            errors.push(
                "admission.pause_quota_fraction must not exceed reduce_quota_fraction".to_string(),
            );
        }

        if self.retry.global_max_attempts == 0 {
            errors.push("retry.global_max_attempts must be greater than 0".to_string());
        }
        for (class, policy) in self.retry.all_policies() {
            if policy.max_attempts == 0 {
                errors.push(format!("retry policy for {} has max_attempts = 0", class));
            }
            if policy.backoff_multiplier < 1.0 {
                errors.push(format!(
                    "retry policy for {} has backoff_multiplier < 1.0",
                    class
                ));
            }
            if !(0.0..=1.0).contains(&policy.jitter_fraction) {
                errors.push(format!(
                    "retry policy for {} has jitter_fraction outside [0.0, 1.0]",
                    class
                ));
            }
            if policy.max_delay_ms < policy.base_delay_ms {
                errors.push(format!(
                    "retry policy for {} has max_delay_ms < base_delay_ms",
                    class
                ));
            }
        }

        if self.degradation.degrade_threshold == 0 {
            errors.push("degradation.degrade_threshold must be greater than 0".to_string());
        }
        if self.degradation.rate_limit_degrade_threshold == 0 {
            errors
                .push("degradation.rate_limit_degrade_threshold must be greater than 0".to_string());
        }
        if self.degradation.recovery_threshold == 0 {
            errors.push("degradation.recovery_threshold must be greater than 0".to_string());
        }

        if self.context.max_tokens == 0 {
            errors.push("context.max_tokens must be greater than 0".to_string());
        }
        if self.context.recency_horizon_secs == 0 {
            errors.push("context.recency_horizon_secs must be greater than 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.context.summarize_importance_threshold) {
            errors.push(
                "context.summarize_importance_threshold must be between 0.0 and 1.0".to_string(),
            );
        }
        if self.context.summarize_min_chunks < 2 {
            errors.push("context.summarize_min_chunks must be at least 2".to_string());
        }

        if self.cache.max_entries == 0 {
            errors.push("cache.max_entries must be greater than 0".to_string());
        }
        if self.dedup.timeout_secs == 0 {
            errors.push("dedup.timeout_secs must be greater than 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(FlightdeckError::Config(errors.join("; ")))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Upper bound on concurrently running tasks within a group.
    pub max_parallel_tasks: usize,
    /// What to do when the dependency graph contains a cycle.
    pub cycle_policy: CyclePolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_parallel_tasks: 4,
            cycle_policy: CyclePolicy::ForceProgress,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Concurrency ceiling enforced before any backend call starts.
    pub max_concurrent: usize,
    /// Call quota per quota window.
    pub quota_limit: u64,
    /// Deny admission when observed memory exceeds this many bytes.
    pub memory_threshold_bytes: u64,
    /// Wait suggested for quota denials when no reset time is known.
    pub default_quota_wait_secs: u64,
    /// Wait suggested for memory-pressure denials.
    pub memory_backoff_secs: u64,
    /// Bounded re-check interval for time-lifted denials (quota reset,
    /// memory backoff). Slot releases wake waiters immediately; this only
    /// caps how stale a timed denial can get.
    pub recheck_interval_ms: u64,
    /// Below this remaining-quota fraction, recommend pausing.
    pub pause_quota_fraction: f64,
    /// Below this remaining-quota fraction, recommend reduced concurrency.
    pub reduce_quota_fraction: f64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            quota_limit: 1_000,
            memory_threshold_bytes: 2 * 1024 * 1024 * 1024,
            default_quota_wait_secs: 60,
            memory_backoff_secs: 5,
            recheck_interval_ms: 250,
            pause_quota_fraction: 0.1,
            reduce_quota_fraction: 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicyConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter_fraction: f64,
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter_fraction: 0.2,
        }
    }
}

impl RetryPolicyConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Hard cap on total attempts across all error classes. Guarantees
    /// termination even when consecutive failures keep reclassifying.
    pub global_max_attempts: u32,
    pub rate_limit: RetryPolicyConfig,
    pub network: RetryPolicyConfig,
    pub timeout: RetryPolicyConfig,
    pub logic: RetryPolicyConfig,
    pub validation: RetryPolicyConfig,
    pub unknown: RetryPolicyConfig,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            global_max_attempts: 10,
            rate_limit: RetryPolicyConfig {
                max_attempts: 5,
                base_delay_ms: 5_000,
                max_delay_ms: 120_000,
                backoff_multiplier: 2.0,
                jitter_fraction: 0.25,
            },
            network: RetryPolicyConfig {
                max_attempts: 4,
                base_delay_ms: 2_000,
                max_delay_ms: 60_000,
                backoff_multiplier: 2.0,
                jitter_fraction: 0.2,
            },
            timeout: RetryPolicyConfig {
                max_attempts: 3,
                base_delay_ms: 3_000,
                max_delay_ms: 60_000,
                backoff_multiplier: 2.0,
                jitter_fraction: 0.2,
            },
            logic: RetryPolicyConfig {
                max_attempts: 1,
                base_delay_ms: 0,
                max_delay_ms: 0,
                backoff_multiplier: 1.0,
                jitter_fraction: 0.0,
            },
            validation: RetryPolicyConfig {
                max_attempts: 2,
                base_delay_ms: 500,
                max_delay_ms: 2_000,
                backoff_multiplier: 2.0,
                jitter_fraction: 0.1,
            },
            unknown: RetryPolicyConfig {
                max_attempts: 3,
                base_delay_ms: 1_000,
                max_delay_ms: 30_000,
                backoff_multiplier: 2.0,
                jitter_fraction: 0.2,
            },
        }
    }
}

impl RetryConfig {
    pub fn policy(&self, class: ErrorClass) -> RetryPolicyConfig {
        match class {
            ErrorClass::RateLimit => self.rate_limit,
            ErrorClass::Network => self.network,
            ErrorClass::Timeout => self.timeout,
            ErrorClass::Logic => self.logic,
            ErrorClass::Validation => self.validation,
            ErrorClass::Unknown => self.unknown,
        }
    }

    fn all_policies(&self) -> HashMap<ErrorClass, RetryPolicyConfig> {
        HashMap::from([
            (ErrorClass::RateLimit, self.rate_limit),
            (ErrorClass::Network, self.network),
            (ErrorClass::Timeout, self.timeout),
            (ErrorClass::Logic, self.logic),
            (ErrorClass::Validation, self.validation),
            (ErrorClass::Unknown, self.unknown),
        ])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DegradationConfig {
    /// Consecutive classified failures before stepping one level down.
    pub degrade_threshold: u32,
    /// Rate-limit failures degrade sooner than generic ones.
    pub rate_limit_degrade_threshold: u32,
    /// Consecutive successes before stepping one level back up.
    pub recovery_threshold: u32,
}

impl Default for DegradationConfig {
    fn default() -> Self {
        Self {
            degrade_threshold: 5,
            rate_limit_degrade_threshold: 3,
            recovery_threshold: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Token ceiling for the window; eviction starts past this estimate.
    pub max_tokens: usize,
    /// Recency decays linearly to zero over this horizon.
    pub recency_horizon_secs: u64,
    /// Chunks younger than this are never summarized.
    pub summarize_min_age_secs: u64,
    /// Chunks at or above this importance are never summarized.
    pub summarize_importance_threshold: f64,
    /// Minimum number of eligible chunks before a summarization call is
    /// worth making.
    pub summarize_min_chunks: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_tokens: 8_000,
            recency_horizon_secs: 3_600,
            summarize_min_age_secs: 600,
            summarize_importance_threshold: 0.5,
            summarize_min_chunks: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 500,
            ttl_secs: 300,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Per-call hard timeout so a stalled call cannot pin its in-flight
    /// slot indefinitely.
    pub timeout_secs: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self { timeout_secs: 120 }
    }
}

impl DedupConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_is_valid() {
        assert!(FlightdeckConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_collects_all_violations() {
        let mut config = FlightdeckConfig::default();
        config.scheduler.max_parallel_tasks = 0;
        config.cache.max_entries = 0;
        config.retry.rate_limit.jitter_fraction = 2.0;

        let err = config.validate().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("max_parallel_tasks"));
        assert!(msg.contains("cache.max_entries"));
        assert!(msg.contains("jitter_fraction"));
    }

    #[test]
    fn quota_fractions_must_be_ordered() {
        let mut config = FlightdeckConfig::default();
        config.admission.pause_quota_fraction = 0.5;
        config.admission.reduce_quota_fraction = 0.3;
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn round_trips_through_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = FlightdeckConfig::default();
        config.scheduler.max_parallel_tasks = 7;
        config.context.max_tokens = 12_000;
        config.save(&path).await.unwrap();

        let loaded = FlightdeckConfig::load(&path).await.unwrap();
        assert_eq!(loaded.scheduler.max_parallel_tasks, 7);
        assert_eq!(loaded.context.max_tokens, 12_000);
    }

    #[tokio::test]
    async fn missing_file_loads_defaults() {
        let dir = TempDir::new().unwrap();
        let loaded = FlightdeckConfig::load(&dir.path().join("absent.toml"))
            .await
            .unwrap();
        assert_eq!(
            loaded.scheduler.max_parallel_tasks,
            SchedulerConfig::default().max_parallel_tasks
        );
    }
}
