//! Scalar types and runtime values.
//!
//! Every value crossing the kernel boundary (query parameters, table files)
//! arrives as a string and is coerced with [`ScalarType::parse_value`].

use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── ScalarType ──────────────────────────────────────────────────────────────

/// Numerics are stored as a scaled `i64`, which holds any 18 decimal digits.
pub const MAX_NUMERIC_PRECISION: u8 = 18;

/// The declared type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScalarType {
  Integer,
  /// Fixed-point decimal with `precision` total digits, `scale` of them
  /// after the point.
  Numeric { precision: u8, scale: u8 },
  /// Fixed-length character string; values may be shorter than `len`.
  Char { len: u16 },
  Varchar { len: u16 },
  Timestamp,
}

impl ScalarType {
  /// Resolve a type from its SQL name and parenthesised arguments,
  /// e.g. `("varchar", [20])` or `("numeric", [6, 2])`.
  pub fn from_parts(name: &str, args: &[u32]) -> Result<Self> {
    let unknown = || Error::UnknownType(render_parts(name, args));
    let narrow_u8 = |n: u32| u8::try_from(n).map_err(|_| unknown());
    let narrow_u16 = |n: u32| u16::try_from(n).map_err(|_| unknown());

    match (name.to_ascii_lowercase().as_str(), args) {
      ("integer" | "int", []) => Ok(Self::Integer),
      ("timestamp", []) => Ok(Self::Timestamp),
      ("numeric" | "decimal", [p]) => Self::numeric(narrow_u8(*p)?, 0),
      ("numeric" | "decimal", [p, s]) if s <= p => {
        Self::numeric(narrow_u8(*p)?, narrow_u8(*s)?)
      }
      ("char" | "character", [n]) => Ok(Self::Char { len: narrow_u16(*n)? }),
      ("varchar", [n]) => Ok(Self::Varchar { len: narrow_u16(*n)? }),
      _ => Err(unknown()),
    }
  }

  fn numeric(precision: u8, scale: u8) -> Result<Self> {
    if precision > MAX_NUMERIC_PRECISION {
      return Err(Error::PrecisionTooLarge {
        precision,
        max: MAX_NUMERIC_PRECISION,
      });
    }
    Ok(Self::Numeric { precision, scale })
  }

  /// Coerce the string form of a value into this type.
  pub fn parse_value(&self, input: &str) -> Result<Value> {
    let invalid = || Error::InvalidLiteral {
      ty:    *self,
      value: input.to_owned(),
    };

    match *self {
      Self::Integer => input
        .trim()
        .parse::<i64>()
        .map(Value::Integer)
        .map_err(|_| invalid()),
      Self::Numeric { precision, scale } => {
        parse_numeric(input.trim(), precision, scale)
          .map(|raw| Value::Numeric { raw, scale })
          .ok_or_else(invalid)
      }
      Self::Char { len } | Self::Varchar { len } => {
        if input.chars().count() > usize::from(len) {
          return Err(Error::ValueTooLong {
            ty:    *self,
            value: input.to_owned(),
          });
        }
        Ok(Value::Text(input.to_owned()))
      }
      Self::Timestamp => parse_timestamp(input.trim())
        .map(Value::Timestamp)
        .ok_or_else(invalid),
    }
  }
}

impl fmt::Display for ScalarType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Integer => f.write_str("integer"),
      Self::Numeric { precision, scale } => {
        write!(f, "numeric({precision},{scale})")
      }
      Self::Char { len } => write!(f, "char({len})"),
      Self::Varchar { len } => write!(f, "varchar({len})"),
      Self::Timestamp => f.write_str("timestamp"),
    }
  }
}

/// Parses the compact form produced by [`fmt::Display`], e.g. `varchar(20)`.
impl FromStr for ScalarType {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    let Some((name, rest)) = s.split_once('(') else {
      return Self::from_parts(s.trim(), &[]);
    };
    let inner = rest
      .strip_suffix(')')
      .ok_or_else(|| Error::UnknownType(s.to_owned()))?;
    let args = inner
      .split(',')
      .map(|a| a.trim().parse::<u32>())
      .collect::<Result<Vec<_>, _>>()
      .map_err(|_| Error::UnknownType(s.to_owned()))?;
    Self::from_parts(name.trim(), &args)
  }
}

fn render_parts(name: &str, args: &[u32]) -> String {
  if args.is_empty() {
    return name.to_owned();
  }
  let args: Vec<String> = args.iter().map(u32::to_string).collect();
  format!("{name}({})", args.join(","))
}

/// Parse `[-+]digits[.digits]` into a value scaled by `10^scale`.
///
/// Rejects more fractional digits than `scale` and more integral digits than
/// `precision - scale`.
fn parse_numeric(s: &str, precision: u8, scale: u8) -> Option<i64> {
  let (negative, digits) = match s.as_bytes().first()? {
    b'-' => (true, &s[1..]),
    b'+' => (false, &s[1..]),
    _ => (false, s),
  };
  let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
  if int_part.is_empty() && frac_part.is_empty() {
    return None;
  }
  if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
    return None;
  }

  let significant = int_part.trim_start_matches('0');
  if significant.len() > usize::from(precision.saturating_sub(scale))
    || frac_part.len() > usize::from(scale)
  {
    return None;
  }

  let mut raw: i64 = 0;
  for b in significant.bytes() {
    raw = raw.checked_mul(10)?.checked_add(i64::from(b - b'0'))?;
  }
  for i in 0..usize::from(scale) {
    let digit = frac_part.as_bytes().get(i).map_or(0, |b| b - b'0');
    raw = raw.checked_mul(10)?.checked_add(i64::from(digit))?;
  }

  Some(if negative { -raw } else { raw })
}

/// RFC 3339, or `YYYY-MM-DD HH:MM:SS[.f]` interpreted as UTC.
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Some(dt.with_timezone(&Utc));
  }
  NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
    .ok()
    .map(|naive| naive.and_utc())
}

// ─── Value ───────────────────────────────────────────────────────────────────

/// A single column value.
///
/// Values are totally ordered so composite primary keys can key ordered maps.
/// Comparisons are only meaningful between values of the same column.
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
  Null,
  Integer(i64),
  /// A fixed-point decimal stored as `raw / 10^scale`.
  Numeric { raw: i64, scale: u8 },
  Text(String),
  Timestamp(DateTime<Utc>),
}

impl Value {
  pub fn is_null(&self) -> bool { matches!(self, Self::Null) }

  /// Whether this value is a valid inhabitant of `ty`. `Null` inhabits every
  /// type.
  pub fn conforms_to(&self, ty: &ScalarType) -> bool {
    match (self, ty) {
      (Self::Null, _) => true,
      (Self::Integer(_), ScalarType::Integer) => true,
      (Self::Numeric { scale, .. }, ScalarType::Numeric { scale: s, .. }) => {
        scale == s
      }
      (Self::Text(t), ScalarType::Char { len } | ScalarType::Varchar { len }) => {
        t.chars().count() <= usize::from(*len)
      }
      (Self::Timestamp(_), ScalarType::Timestamp) => true,
      _ => false,
    }
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Null => f.write_str("NULL"),
      Self::Integer(i) => write!(f, "{i}"),
      Self::Numeric { raw, scale } => {
        if *scale == 0 {
          return write!(f, "{raw}");
        }
        let sign = if *raw < 0 { "-" } else { "" };
        let abs = raw.unsigned_abs();
        // Past 10^19 the divisor exceeds every magnitude an i64 can hold.
        let (int, frac) = match 10u64.checked_pow(u32::from(*scale)) {
          Some(divisor) => (abs / divisor, abs % divisor),
          None => (0, abs),
        };
        write!(f, "{sign}{int}.{frac:0width$}", width = usize::from(*scale))
      }
      Self::Text(t) => f.write_str(t),
      Self::Timestamp(ts) => f.write_str(&ts.to_rfc3339()),
    }
  }
}

/// A tuple in relation column order.
pub type Row = Vec<Value>;
