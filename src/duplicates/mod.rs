//! Duplicate detection.
//!
//! - [`groups`]: the derived [`DuplicateGroup`] type
//! - [`grouper`]: verified grouping and incremental checks over the store

pub mod grouper;
pub mod groups;

pub use grouper::{Grouper, GrouperStats, IncrementalMatch};
pub use groups::{DuplicateGroup, GroupMember};
