//! Core types for the tempora kernel.
//!
//! Holds the schema model, the query IR produced by SQL parsing, and the
//! scalar type system shared by the code generator and the storage engine.
//! This crate does no I/O; every other crate depends on it.

pub mod error;
pub mod query;
pub mod schema;
pub mod types;

pub use error::{Error, Result};
