// utils
pub mod error;
pub mod xml;

// If header: scanner, grammar, matching
pub mod cond;
pub mod token;

// lock ownership
pub mod lock;

// multistatus & lock discovery
pub mod decoder;
pub mod encoder;
pub mod types;
