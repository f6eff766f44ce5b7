//! Schema and SQL front end for tempora.
//!
//! Turns schema text into a [`Schema`] and a single SQL statement into a
//! [`Query`]. Pure and synchronous; every error carries the 1-based line on
//! which it was detected.
//!
//! # Quick start
//!
//! ```no_run
//! let schema = tempora_sql::parse_schema(
//!   "CREATE TABLE warehouse (w_id integer PRIMARY KEY, w_city varchar(20))
//!    WITH SYSTEM VERSIONING;",
//! )
//! .unwrap();
//! let query =
//!   tempora_sql::parse_query("UPDATE warehouse SET w_city = ? WHERE w_id = ?")
//!     .unwrap();
//! assert_eq!(schema.relations.len(), 1);
//! assert_eq!(query.param_count(), 2);
//! ```

pub mod error;
mod lexer;
mod parser;
mod query;
mod schema;

pub use error::{Error, Result};
use tempora_core::{query::Query, schema::Schema};

/// Parse schema text: a sequence of `CREATE TABLE` statements.
pub fn parse_schema(input: &str) -> Result<Schema> { schema::parse(input) }

/// Parse exactly one SQL statement, optionally prefixed with `EXPLAIN`.
pub fn parse_query(input: &str) -> Result<Query> { query::parse(input) }
