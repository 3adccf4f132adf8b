//! Content fingerprinting.
//!
//! [`hasher`] holds the pure hashing primitives; [`engine`] wraps them with
//! the store so unchanged files are never hashed twice.

pub mod engine;
pub mod hasher;

pub use engine::{EngineStats, FingerprintEngine, Lookup};
pub use hasher::{
    hash_to_hex, hex_to_hash, Hash, HashError, Hasher, HasherConfig, CHUNK_SIZE,
    DEFAULT_QUICK_SAMPLE, DEFAULT_QUICK_THRESHOLD,
};
