mod tokens;

pub use tokens::estimate_tokens;
