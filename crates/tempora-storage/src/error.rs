//! Error type for `tempora-storage`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown table: {0}")]
  UnknownTable(String),

  #[error("duplicate key {key} in {table}")]
  DuplicateKey { table: String, key: String },

  #[error("{table} expects {expected} values, got {found}")]
  Arity {
    table:    String,
    expected: usize,
    found:    usize,
  },

  #[error("value {value} does not fit column {table}.{column}")]
  TypeMismatch {
    table:  String,
    column: String,
    value:  String,
  },

  #[error("column {table}.{column} may not be null")]
  NullViolation { table: String, column: String },

  #[error("primary key column {table}.{column} cannot be updated")]
  KeyUpdate { table: String, column: String },

  #[error("value error: {0}")]
  Value(#[from] tempora_core::Error),

  #[error("failed to read {path:?}: {source}")]
  Io {
    path:   PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("{path:?} line {line}: {message}")]
  MalformedRow {
    path:    PathBuf,
    line:    usize,
    message: String,
  },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
