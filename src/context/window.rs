use chrono::Utc;
use tracing::{debug, warn};

use crate::backend::{Backend, CallRequest};
use crate::config::ContextConfig;
use crate::error::Result;
use crate::persistence::{Snapshot, SnapshotEntry};

use super::types::{ChunkRole, ContextChunk};

// Eviction ranks by durability of the content; selection leans slightly
// more on recency so fresh material wins ties when assembling a prompt.
const EVICT_IMPORTANCE_WEIGHT: f64 = 0.7;
const EVICT_RECENCY_WEIGHT: f64 = 0.3;
const SELECT_IMPORTANCE_WEIGHT: f64 = 0.6;
const SELECT_RECENCY_WEIGHT: f64 = 0.4;

/// Bounded, importance-weighted buffer of content chunks.
///
/// The token estimate is the documented length/4 approximation (see
/// `crate::utils::estimate_tokens`). While the estimate exceeds the
/// configured ceiling, the chunk with the lowest composite eviction score
/// is dropped — never the most-recently-added chunk, so the window cannot
/// be emptied while content keeps arriving.
pub struct ContextWindow {
    chunks: Vec<ContextChunk>,
    estimated_tokens: usize,
    config: ContextConfig,
}

impl ContextWindow {
    pub fn new(config: ContextConfig) -> Self {
        Self {
            chunks: Vec::new(),
            estimated_tokens: 0,
            config,
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn estimated_tokens(&self) -> usize {
        self.estimated_tokens
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
        self.estimated_tokens = 0;
    }

    pub fn add(&mut self, content: impl Into<String>, role: ChunkRole, importance: f64) {
        let chunk = ContextChunk::new(content, role, importance);
        self.estimated_tokens += chunk.tokens;
        self.chunks.push(chunk);
        self.evict_to_ceiling();
    }

    /// Evict lowest-scoring chunks until the estimate fits the ceiling.
    /// The newest chunk is exempt, so the estimate can overshoot by at
    /// most that one chunk's size.
    fn evict_to_ceiling(&mut self) {
        let now = Utc::now();
        while self.estimated_tokens > self.config.max_tokens && self.chunks.len() > 1 {
            let evictable = &self.chunks[..self.chunks.len() - 1];
            let victim = evictable
                .iter()
                .enumerate()
                .map(|(i, c)| {
                    let score = c.importance * EVICT_IMPORTANCE_WEIGHT
                        + c.recency(now, self.config.recency_horizon_secs) * EVICT_RECENCY_WEIGHT;
                    (i, score)
                })
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(i, _)| i);

            let Some(index) = victim else { break };
            let removed = self.chunks.remove(index);
            self.estimated_tokens = self.estimated_tokens.saturating_sub(removed.tokens);
            debug!(
                role = %removed.role,
                importance = removed.importance,
                tokens = removed.tokens,
                "Evicted context chunk over token ceiling"
            );
        }
    }

    /// Select chunks for a prompt, best composite selection score first,
    /// until `max_tokens` fills; the survivors are concatenated in their
    /// original arrival order.
    pub fn get_context(&self, max_tokens: usize) -> String {
        let now = Utc::now();
        let mut ranked: Vec<(usize, f64)> = self
            .chunks
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let score = c.importance * SELECT_IMPORTANCE_WEIGHT
                    + c.recency(now, self.config.recency_horizon_secs) * SELECT_RECENCY_WEIGHT;
                (i, score)
            })
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        let mut budget = 0usize;
        let mut selected: Vec<usize> = Vec::new();
        for (index, _) in ranked {
            let tokens = self.chunks[index].tokens;
            if budget + tokens > max_tokens {
                continue;
            }
            budget += tokens;
            selected.push(index);
        }

        selected.sort_unstable();
        selected
            .into_iter()
            .map(|i| self.chunks[i].content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Merge chunks that are both old and unimportant into one
    /// backend-produced summary chunk. This is the window's only external
    /// call; on failure the original chunks are left untouched.
    ///
    /// Returns `true` if a replacement happened.
    pub async fn summarize_old(&mut self, backend: &dyn Backend) -> bool {
        let now = Utc::now();
        let min_age = chrono::Duration::seconds(self.config.summarize_min_age_secs as i64);
        let eligible: Vec<usize> = self
            .chunks
            .iter()
            .enumerate()
            .filter(|(_, c)| {
                now - c.created_at >= min_age
                    && c.importance < self.config.summarize_importance_threshold
            })
            .map(|(i, _)| i)
            .collect();

        if eligible.len() < self.config.summarize_min_chunks {
            return false;
        }

        let body = eligible
            .iter()
            .map(|&i| {
                let c = &self.chunks[i];
                format!("[{}] {}", c.role, c.content)
            })
            .collect::<Vec<_>>()
            .join("\n");
        let request = CallRequest::new(format!(
            "Condense the following context into a short summary, \
             preserving decisions and facts:\n\n{}",
            body
        ));

        let summary = match backend.call(request).await {
            Ok(response) => response.content,
            Err(e) => {
                warn!(error = %e, chunks = eligible.len(), "Summarization call failed, keeping originals");
                return false;
            }
        };

        // Replace in place: summary inherits the newest merged timestamp
        // and the highest merged importance so it is not evicted first.
        let importance = eligible
            .iter()
            .map(|&i| self.chunks[i].importance)
            .fold(0.0f64, f64::max);
        let created_at = eligible
            .iter()
            .map(|&i| self.chunks[i].created_at)
            .max()
            .unwrap_or(now);
        let insert_at = eligible[0];

        for &index in eligible.iter().rev() {
            let removed = self.chunks.remove(index);
            self.estimated_tokens = self.estimated_tokens.saturating_sub(removed.tokens);
        }
        let chunk =
            ContextChunk::new(summary, ChunkRole::Summary, importance).with_created_at(created_at);
        self.estimated_tokens += chunk.tokens;
        self.chunks.insert(insert_at, chunk);
        // A long summary can overshoot the ceiling; re-apply it rather
        // than waiting for the next add().
        self.evict_to_ceiling();
        debug!(merged = eligible.len(), "Replaced old chunks with summary");
        true
    }

    /// Export chunks as an opaque snapshot map, keyed by arrival index.
    pub fn export_snapshot(&self) -> Result<Snapshot> {
        let mut snapshot = Snapshot::new();
        for (i, chunk) in self.chunks.iter().enumerate() {
            snapshot.insert(
                format!("chunk-{:06}", i),
                SnapshotEntry {
                    value: serde_json::to_value(chunk)?,
                    timestamp: chunk.created_at,
                },
            );
        }
        Ok(snapshot)
    }

    /// Rebuild the window from a snapshot. Undecodable entries are
    /// skipped; the ceiling is re-applied afterwards.
    pub fn restore_snapshot(&mut self, snapshot: &Snapshot) {
        self.clear();
        let mut keys: Vec<&String> = snapshot.keys().collect();
        keys.sort();
        for key in keys {
            let Ok(chunk) =
                serde_json::from_value::<ContextChunk>(snapshot[key].value.clone())
            else {
                debug!(key = %key, "Skipping undecodable context snapshot entry");
                continue;
            };
            self.estimated_tokens += chunk.tokens;
            self.chunks.push(chunk);
        }
        self.evict_to_ceiling();
    }
}
