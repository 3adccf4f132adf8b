//! Durable state for the engine.
//!
//! # Architecture
//!
//! * [`record`]: versioned record types validated at the store boundary.
//! * [`database`]: SQLite persistence for fingerprints and the deletion ledger.
//!
//! # Cache Coherency
//!
//! A stored fingerprint is trusted only while the file's size and
//! modification time match the record. Any difference forces both hashes to
//! be recomputed. Duplicate-group membership is never stored; it is derived
//! from secure-hash buckets on demand.

pub mod database;
pub mod record;

pub use database::{FingerprintStore, StoreError, StoreResult};
pub use record::{DeletionRecord, FileFingerprint, NewDeletion, RecordError, RECORD_VERSION};
