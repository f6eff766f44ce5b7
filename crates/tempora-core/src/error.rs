//! Error types for `tempora-core`.

use thiserror::Error;

use crate::types::ScalarType;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown type: {0:?}")]
  UnknownType(String),

  #[error("numeric precision {precision} exceeds the maximum of {max}")]
  PrecisionTooLarge { precision: u8, max: u8 },

  #[error("invalid {ty} literal: {value:?}")]
  InvalidLiteral { ty: ScalarType, value: String },

  #[error("value {value:?} is too long for {ty}")]
  ValueTooLong { ty: ScalarType, value: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
