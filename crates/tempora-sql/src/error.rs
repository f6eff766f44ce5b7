//! Error types for the schema and SQL parsers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("line {line}: unexpected character {ch:?}")]
  UnexpectedChar { line: usize, ch: char },

  #[error("line {line}: unterminated string literal")]
  UnterminatedString { line: usize },

  #[error("line {line}: expected {expected}, found {found}")]
  Unexpected {
    line:     usize,
    expected: String,
    found:    String,
  },

  #[error("line {line}: {message}")]
  Invalid { line: usize, message: String },
}

impl Error {
  /// The 1-based line at which the error was detected.
  pub fn line(&self) -> usize {
    match self {
      Self::UnexpectedChar { line, .. }
      | Self::UnterminatedString { line }
      | Self::Unexpected { line, .. }
      | Self::Invalid { line, .. } => *line,
    }
  }

  /// The error text without its line prefix.
  pub fn message(&self) -> String {
    match self {
      Self::UnexpectedChar { ch, .. } => format!("unexpected character {ch:?}"),
      Self::UnterminatedString { .. } => "unterminated string literal".into(),
      Self::Unexpected {
        expected, found, ..
      } => format!("expected {expected}, found {found}"),
      Self::Invalid { message, .. } => message.clone(),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
