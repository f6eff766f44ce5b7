//! Error taxonomy for the compile → build → load → run pipeline.

use std::{io, path::PathBuf};

use thiserror::Error;

/// Schema text could not be turned into a definition unit.
#[derive(Debug, Error)]
pub enum SchemaError {
  #[error("schema line {line}: {message}")]
  ParseFailure { line: usize, message: String },

  #[error("definition failed to build: {0}")]
  CompileFailure(#[source] BuildError),
}

/// Query text could not be turned into a query unit.
#[derive(Debug, Error)]
pub enum QueryError {
  #[error("query line {line}: {message}")]
  ParseFailure { line: usize, message: String },

  /// The statement does not fit the schema.
  #[error("query does not fit the schema: {0}")]
  Plan(#[source] tempora_codegen::Error),

  #[error("query failed to build: {0}")]
  CompileFailure(#[source] BuildError),
}

#[derive(Debug, Error)]
pub enum BuildError {
  #[error("{path}: {source}")]
  Io {
    path:   PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("toolchain exited with {}: {stderr}", exit_status(.status))]
  ToolchainFailure { status: Option<i32>, stderr: String },

  /// The in-process assembler refused the listing.
  #[error("listing rejected: {0}")]
  Rejected(#[source] tempora_codegen::Error),
}

fn exit_status(status: &Option<i32>) -> String {
  status.map_or_else(|| "a signal".to_owned(), |s| format!("status {s}"))
}

impl BuildError {
  pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
    let path = path.into();
    move |source| Self::Io { path, source }
  }
}

#[derive(Debug, Error)]
pub enum LoadError {
  #[error("cannot open unit {path}: {reason}")]
  OpenFailure { path: PathBuf, reason: String },

  #[error("unit {path} does not export {name}")]
  SymbolMissing { name: String, path: PathBuf },

  /// Units were still in use when the loader released them.
  #[error("unit {path} still has {outstanding} live handle(s)")]
  UnloadFailure { path: PathBuf, outstanding: usize },
}

impl LoadError {
  /// Whether the artifact itself is bad and rebuilding it may help.
  pub fn is_corrupt_artifact(&self) -> bool {
    matches!(self, Self::OpenFailure { .. } | Self::SymbolMissing { .. })
  }
}

/// Invoking a compiled unit failed.
#[derive(Debug, Error)]
pub enum RunError {
  #[error(transparent)]
  Load(#[from] LoadError),

  #[error(transparent)]
  Build(#[from] BuildError),

  #[error("execution failed: {0}")]
  Exec(#[from] tempora_codegen::Error),
}

/// Any pipeline failure.
#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Schema(#[from] SchemaError),

  #[error(transparent)]
  Query(#[from] QueryError),

  #[error(transparent)]
  Run(#[from] RunError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
