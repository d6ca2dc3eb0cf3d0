//! Call-result caching, in-flight deduplication, and the generic
//! capacity+TTL bounded store they specialize.

mod bounded;
mod dedup;
mod key;
mod result_cache;

pub use bounded::BoundedStore;
pub use dedup::Deduplicator;
pub use key::cache_key;
pub use result_cache::{CacheStats, ResultCache};
