//! Bounded, importance-weighted context buffer.

mod types;
mod window;

pub use types::{ChunkRole, ContextChunk};
pub use window::ContextWindow;
