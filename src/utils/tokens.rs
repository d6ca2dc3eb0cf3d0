//! Token estimation for context budgeting.
//!
//! Exact tokenization is out of scope for this core; the documented
//! approximation is one token per four bytes of content, which tracks
//! English prose closely enough for eviction and budgeting decisions.

const BYTES_PER_TOKEN: usize = 4;

/// Estimate the token count of a piece of content.
///
/// tokens ≈ len / 4, rounded up so non-empty content never estimates to
/// zero. All window and budget arithmetic in `crate::context` uses this
/// same estimate, keeping the bookkeeping internally consistent even
/// where the absolute numbers drift from a real tokenizer.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(BYTES_PER_TOKEN)
}
