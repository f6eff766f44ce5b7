//! Temporal storage engine for tempora.
//!
//! A [`Database`] owns one [`Table`] per relation. Temporal tables keep a
//! [`VersionChain`] per row identity and never physically remove a version;
//! conventional tables hold a single row per identity and mutate in place.
//!
//! The engine is single-threaded per database: callers that share a
//! [`Database`] across threads must synchronise externally.

pub mod clock;
pub mod database;
pub mod error;
mod load;
pub mod table;
pub mod version;

pub use clock::{Clock, ManualClock, SystemClock};
pub use database::Database;
pub use error::{Error, Result};
pub use table::{Key, Mutation, Table};
pub use version::{RowVersion, ValidTime, VersionChain};
