//! Adaptive retry: pluggable failure classification plus per-class
//! exponential backoff with jitter and an explicit global attempt cap.

mod classifier;
mod executor;

pub use classifier::{ErrorClassifier, KeywordClassifier};
pub use executor::{RetryEvent, RetryExecutor};
