//! reposter domain crate
//!
//! This crate contains the core domain logic following hexagonal architecture:
//! - `model`: Domain entities and value objects
//! - `ports`: Trait definitions for external dependencies (adapters)
//! - `usecases`: Resolver, filter chain, dedup, selection, formatting and the publish cycle
//! - `policy`: Text normalization, blacklist and cleanup rules

pub mod model;
pub mod policy;
pub mod ports;
pub mod usecases;

pub use model::*;
pub use ports::*;

use sha2::{Digest, Sha256};

/// Hex SHA-256 of the given byte chunks, cut to `len` hex characters
pub fn short_digest(chunks: &[&[u8]], len: usize) -> String {
    let mut hasher = Sha256::new();
    for chunk in chunks {
        hasher.update(chunk);
    }
    let mut hex = format!("{:x}", hasher.finalize());
    hex.truncate(len);
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_digest_is_deterministic() {
        let a = short_digest(&[b"owner", b"post"], 16);
        let b = short_digest(&[b"owner", b"post"], 16);

        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert_ne!(a, short_digest(&[b"owner", b"other"], 16));
    }
}
