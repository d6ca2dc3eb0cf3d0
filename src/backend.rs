//! Collaborator seams consumed by the execution-control core.
//!
//! The core treats the model backend as a single opaque, fallible,
//! possibly slow operation; everything it knows about the host process
//! arrives through `TelemetrySource`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One unit of work handed to the external model backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallRequest {
    pub prompt: String,
    /// Persona the call is issued under. Persona content is external;
    /// the core only routes and keys on the name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,
    /// Free-form routing hint (e.g. a fallback model name chosen by the
    /// degradation controller).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl CallRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            persona: None,
            target: None,
        }
    }

    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = Some(persona.into());
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallResponse {
    pub content: String,
    /// Tokens consumed, when the backend reports them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u64>,
}

impl CallResponse {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tokens_used: None,
        }
    }
}

/// The one operation the core requires of the model backend.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn call(&self, request: CallRequest) -> Result<CallResponse>;
}

#[async_trait]
impl<B: Backend> Backend for Arc<B> {
    async fn call(&self, request: CallRequest) -> Result<CallResponse> {
        (**self).call(request).await
    }
}

/// Host observations fed into admission decisions.
///
/// Implementations are free to return `None` when an observation is
/// unavailable; admission then falls back to its configured defaults.
pub trait TelemetrySource: Send + Sync {
    /// Approximate current memory usage in bytes.
    fn memory_usage(&self) -> Option<u64>;

    /// When the external call quota next resets, if known.
    fn quota_reset_at(&self) -> Option<DateTime<Utc>> {
        None
    }
}
