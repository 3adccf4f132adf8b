//! safedupe - content-addressed deduplication with safe deletion
//!
//! Files are fingerprinted with BLAKE3 into a SQLite store, grouped by
//! secure hash, scored for how safe they are to clean up, and only removed
//! after a verified backup has been written and recorded in an append-only
//! ledger that supports restore.
//!
//! - [`fingerprint`]: quick and secure hashing, cache-coherent lookups
//! - [`store`]: persistent fingerprints and the deletion ledger table
//! - [`duplicates`]: grouping by content
//! - [`safety`] and [`canonical`]: deciding what may go and what stays
//! - [`actions`]: backup-before-delete execution
//! - [`ledger`]: restore, confirmation and retention
//! - [`realtime`] and [`indexer`]: single-event and whole-tree drivers

pub mod actions;
pub mod app;
pub mod canonical;
pub mod cli;
pub mod clock;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod fingerprint;
pub mod indexer;
pub mod ledger;
pub mod logging;
pub mod policy;
pub mod progress;
pub mod realtime;
pub mod safety;
pub mod scanner;
pub mod signal;
pub mod store;

pub use app::run_app;
