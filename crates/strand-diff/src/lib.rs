//! Diff engine for Strand repositories.
//!
//! Compares two snapshots of a keyed address map and turns the differences
//! into domain-level change events.
//!
//! # Key Types
//!
//! - [`DataDiff`] -- adds / updates / deletes between two keyed address maps
//! - [`Event`] -- one change to an object or namespace
//! - [`Collection`] -- which collection of a namespace an event concerns

pub mod data_diff;
pub mod error;
pub mod event;

pub use data_diff::{data_diff, id_map_diff, tid_entries_diff, Add, DataDiff, Delete, Update};
pub use error::{DiffError, DiffResult};
pub use event::{Collection, Event};
