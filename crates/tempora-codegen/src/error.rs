//! Error types for tempora-codegen.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  // ── Resolution (raised while generating source) ──────────────────────────
  #[error("unknown table {0:?}")]
  UnknownTable(String),

  #[error("unknown column {column:?} in {table:?}")]
  UnknownColumn { table: String, column: String },

  #[error("column {column:?} of {table:?} is named more than once")]
  DuplicateColumn { table: String, column: String },

  #[error("primary key column {column:?} of {table:?} cannot be assigned")]
  KeyAssignment { table: String, column: String },

  #[error("INSERT into {table:?} omits primary key column {column:?}")]
  MissingKeyColumn { table: String, column: String },

  #[error("INSERT into {table:?} expects {expected} values, got {found}")]
  InsertArity {
    table:    String,
    expected: usize,
    found:    usize,
  },

  #[error("literal for {column:?}: {source}")]
  Literal {
    column: String,
    #[source]
    source: tempora_core::Error,
  },

  // ── Assembly ─────────────────────────────────────────────────────────────
  #[error("line {line}: {message}")]
  Assemble { line: usize, message: String },

  #[error("unsupported unit ABI version {found} (expected {expected})")]
  Abi { found: u32, expected: u32 },

  #[error("unit object: {0}")]
  Json(#[from] serde_json::Error),

  // ── Execution ────────────────────────────────────────────────────────────
  #[error("parameter {index} missing: {supplied} supplied")]
  MissingParam { index: usize, supplied: usize },

  #[error("parameter {index}: {source}")]
  Param {
    index:  usize,
    #[source]
    source: tempora_core::Error,
  },

  #[error("column #{index} out of range for {table:?}")]
  ColumnIndex { table: String, index: usize },

  #[error("seek on {table:?} supplies {found} key values, key has {expected}")]
  SeekArity {
    table:    String,
    expected: usize,
    found:    usize,
  },

  #[error("AS OF operand is not a timestamp: {0}")]
  AsOf(String),

  #[error(transparent)]
  Storage(#[from] tempora_storage::Error),
}

impl Error {
  /// Whether the error was raised while resolving a statement against the
  /// schema, before any source existed.
  pub fn is_resolution(&self) -> bool {
    matches!(
      self,
      Self::UnknownTable(_)
        | Self::UnknownColumn { .. }
        | Self::DuplicateColumn { .. }
        | Self::KeyAssignment { .. }
        | Self::MissingKeyColumn { .. }
        | Self::InsertArity { .. }
        | Self::Literal { .. }
    )
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
