use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Retry taxonomy for backend call failures.
///
/// Each class is bound to its own `RetryPolicy` (see `crate::retry`). The
/// mapping from a raw failure to a class is heuristic keyword matching over
/// the failure message; structured backends can swap in their own
/// `ErrorClassifier`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    RateLimit,
    Network,
    Timeout,
    Logic,
    Validation,
    Unknown,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Network => write!(f, "network"),
            Self::Timeout => write!(f, "timeout"),
            Self::Logic => write!(f, "logic"),
            Self::Validation => write!(f, "validation"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

impl ErrorClass {
    /// Parse a failure message into an error class.
    /// Only matches unambiguous patterns (HTTP codes, explicit keywords).
    /// Ambiguous messages fall through to `Unknown` rather than guessing.
    pub fn from_message(msg: &str) -> Self {
        let lower = msg.to_lowercase();

        // HTTP status codes - universal and unambiguous
        if lower.contains("429")
            || lower.contains("too many requests")
            || lower.contains("quota")
            || lower.contains("rate limit")
        {
            return Self::RateLimit;
        }
        if lower.contains("timeout")
            || lower.contains("timed out")
            || lower.contains("deadline")
        {
            return Self::Timeout;
        }
        if lower.contains("502")
            || lower.contains("503")
            || lower.contains("504")
            || lower.contains("network")
            || lower.contains("connection")
            || lower.contains("dns")
            || lower.contains("unreachable")
        {
            return Self::Network;
        }
        if lower.contains("invalid")
            || lower.contains("schema")
            || lower.contains("validation")
            || lower.contains("malformed")
        {
            return Self::Validation;
        }
        if lower.contains("panic") || lower.contains("assert") || lower.contains("unwrap") {
            return Self::Logic;
        }

        Self::Unknown
    }

    /// Whether failures of this class are worth retrying at all.
    /// Logic and validation errors will not change on re-execution.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimit | Self::Network | Self::Timeout)
    }

    /// Extract a server-provided retry hint in seconds, if the message
    /// carries one ("retry after 30", "Retry-After: 30").
    pub fn extract_retry_after(msg: &str) -> Option<u64> {
        let msg_lower = msg.to_lowercase();
        for pattern in ["retry after ", "retry-after: ", "retry_after="] {
            if let Some(idx) = msg_lower.find(pattern) {
                let after_pattern = &msg_lower[idx + pattern.len()..];
                let num_str: String = after_pattern
                    .chars()
                    .take_while(|c| c.is_ascii_digit())
                    .collect();
                if let Ok(secs) = num_str.parse() {
                    return Some(secs);
                }
            }
        }
        None
    }
}

#[derive(Error, Debug)]
pub enum FlightdeckError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dependency cycle involving tasks: {}", tasks.join(", "))]
    DependencyCycle { tasks: Vec<String> },

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Backend call failed: {0}")]
    Backend(String),

    #[error("Operation timed out after {duration_secs}s: {operation}")]
    Timeout {
        operation: String,
        duration_secs: u64,
    },

    #[error("Retries exhausted after {attempts} attempts ({class}): {message}")]
    RetryExhausted {
        class: ErrorClass,
        attempts: u32,
        message: String,
    },

    #[error("Feature unavailable at degradation level {level}: {feature}")]
    FeatureUnavailable { feature: String, level: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("Deduplicated call failed: {0}")]
    SharedCall(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("{0}")]
    Other(String),
}

impl FlightdeckError {
    /// Classify this error for retry purposes.
    /// Structured variants map directly; everything else goes through
    /// message heuristics.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Timeout { .. } => ErrorClass::Timeout,
            Self::RetryExhausted { class, .. } => *class,
            Self::InvalidInput(_) | Self::Config(_) => ErrorClass::Validation,
            Self::Backend(msg) | Self::SharedCall(msg) | Self::Other(msg) => {
                ErrorClass::from_message(msg)
            }
            _ => ErrorClass::from_message(&self.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, FlightdeckError>;
