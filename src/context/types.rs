use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::estimate_tokens;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkRole {
    System,
    User,
    Assistant,
    Tool,
    /// Produced by `ContextWindow::summarize_old` when merging old
    /// low-importance chunks.
    Summary,
}

impl std::fmt::Display for ChunkRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::Tool => write!(f, "tool"),
            Self::Summary => write!(f, "summary"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextChunk {
    pub content: String,
    pub role: ChunkRole,
    /// Caller-assigned weight in [0, 1]; clamped on construction.
    pub importance: f64,
    pub created_at: DateTime<Utc>,
    /// Cached token estimate for this chunk's content.
    pub tokens: usize,
}

impl ContextChunk {
    pub fn new(content: impl Into<String>, role: ChunkRole, importance: f64) -> Self {
        let content = content.into();
        let tokens = estimate_tokens(&content);
        Self {
            content,
            role,
            importance: importance.clamp(0.0, 1.0),
            created_at: Utc::now(),
            tokens,
        }
    }

    pub(super) fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Linear recency in [0, 1]: 1.0 when just created, decaying to 0.0
    /// at the horizon.
    pub fn recency(&self, now: DateTime<Utc>, horizon_secs: u64) -> f64 {
        let age_secs = (now - self.created_at).num_seconds().max(0) as f64;
        (1.0 - age_secs / horizon_secs.max(1) as f64).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn importance_is_clamped() {
        assert_eq!(ContextChunk::new("x", ChunkRole::User, 1.5).importance, 1.0);
        assert_eq!(ContextChunk::new("x", ChunkRole::User, -0.2).importance, 0.0);
    }

    #[test]
    fn recency_decays_linearly() {
        let chunk = ContextChunk::new("x", ChunkRole::User, 0.5)
            .with_created_at(Utc::now() - chrono::Duration::seconds(1_800));
        let recency = chunk.recency(Utc::now(), 3_600);
        assert!((recency - 0.5).abs() < 0.01);
    }

    #[test]
    fn recency_floors_at_zero_past_horizon() {
        let chunk = ContextChunk::new("x", ChunkRole::User, 0.5)
            .with_created_at(Utc::now() - chrono::Duration::seconds(10_000));
        assert_eq!(chunk.recency(Utc::now(), 3_600), 0.0);
    }
}
