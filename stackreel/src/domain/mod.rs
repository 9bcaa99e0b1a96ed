//! Core domain types and errors.
//!
//! Newtype wrappers keep raw `u64` addresses, byte counts and timestamps
//! from being confused with one another; errors are structured `thiserror`
//! enums so callers can match on failure modes instead of strings.

pub mod errors;
pub mod types;

pub use errors::{ExportError, RecordError, ReplayError};
pub use types::{ModuleRange, Timestamp};
