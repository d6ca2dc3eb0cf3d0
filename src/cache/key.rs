use std::hash::{Hash, Hasher};

use serde::Serialize;

use crate::error::Result;

/// Derive a cache key from arbitrary serializable call parameters.
///
/// The parameters are serialized to JSON and hashed. Struct fields
/// serialize in declaration order, so the key is stable for a given
/// parameter type within a process; it is not guaranteed stable across
/// builds, which is fine for an in-memory cache.
pub fn cache_key<P: Serialize>(params: &P) -> Result<String> {
    let encoded = serde_json::to_string(params)?;
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    encoded.hash(&mut hasher);
    Ok(format!("{:016x}", hasher.finish()))
}
