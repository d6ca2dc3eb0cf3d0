use serde::{Deserialize, Serialize};

/// Operating modes, strictly ordered from healthiest to worst.
/// Exactly one level is active at a time; transitions move one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradationLevel {
    Full,
    Reduced,
    Minimal,
    Offline,
}

impl std::fmt::Display for DegradationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Reduced => write!(f, "reduced"),
            Self::Minimal => write!(f, "minimal"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

impl DegradationLevel {
    /// One step worse, saturating at `Offline`.
    pub fn step_down(&self) -> Self {
        match self {
            Self::Full => Self::Reduced,
            Self::Reduced => Self::Minimal,
            Self::Minimal | Self::Offline => Self::Offline,
        }
    }

    /// One step healthier, saturating at `Full`.
    pub fn step_up(&self) -> Self {
        match self {
            Self::Full | Self::Reduced => Self::Full,
            Self::Minimal => Self::Reduced,
            Self::Offline => Self::Minimal,
        }
    }
}

/// Where calls should be routed at a given level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionTarget {
    /// The configured primary backend.
    Primary,
    /// A cheaper/smaller fallback backend.
    Lightweight,
    /// Serve from cache only; no external calls.
    CacheOnly,
}

/// What a level permits: its feature set, execution target, and
/// concurrency ceiling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelConfig {
    pub features: Vec<String>,
    pub target: ExecutionTarget,
    pub max_concurrent: usize,
}

impl LevelConfig {
    pub fn has_feature(&self, name: &str) -> bool {
        self.features.iter().any(|f| f == name)
    }
}

impl DegradationLevel {
    /// Built-in level definitions; each level allows a strict subset of
    /// the level above it.
    pub fn default_config(&self) -> LevelConfig {
        match self {
            Self::Full => LevelConfig {
                features: vec![
                    "parallel_dispatch".to_string(),
                    "result_caching".to_string(),
                    "context_summarization".to_string(),
                    "speculative_retry".to_string(),
                ],
                target: ExecutionTarget::Primary,
                max_concurrent: 8,
            },
            Self::Reduced => LevelConfig {
                features: vec![
                    "parallel_dispatch".to_string(),
                    "result_caching".to_string(),
                    "context_summarization".to_string(),
                ],
                target: ExecutionTarget::Primary,
                max_concurrent: 4,
            },
            Self::Minimal => LevelConfig {
                features: vec!["result_caching".to_string()],
                target: ExecutionTarget::Lightweight,
                max_concurrent: 1,
            },
            Self::Offline => LevelConfig {
                features: Vec::new(),
                target: ExecutionTarget::CacheOnly,
                max_concurrent: 0,
            },
        }
    }
}
