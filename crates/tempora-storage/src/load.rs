//! Bulk loading from `|`-separated table files.
//!
//! One row per line, fields in column order. A single trailing `|` is
//! tolerated. An empty field is `NULL` for a nullable non-text column.

use std::path::Path;

use chrono::{DateTime, Utc};
use tempora_core::types::{ScalarType, Value};

use crate::{Error, Result, table::Table};

/// Load `path` into `table`, returning the number of rows inserted. A missing
/// file loads nothing.
pub(crate) fn load_table(table: &mut Table, path: &Path, at: DateTime<Utc>) -> Result<usize> {
  let contents = match std::fs::read_to_string(path) {
    Ok(c) => c,
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
    Err(source) => {
      return Err(Error::Io {
        path: path.to_path_buf(),
        source,
      });
    }
  };

  let malformed = |line: usize, message: String| Error::MalformedRow {
    path: path.to_path_buf(),
    line,
    message,
  };

  let mut count = 0;
  for (i, line) in contents.lines().enumerate() {
    let line_no = i + 1;
    if line.trim().is_empty() {
      continue;
    }
    let fields: Vec<&str> = line.strip_suffix('|').unwrap_or(line).split('|').collect();
    let columns = &table.relation().columns;
    if fields.len() != columns.len() {
      return Err(malformed(
        line_no,
        format!("expected {} fields, found {}", columns.len(), fields.len()),
      ));
    }

    let row = fields
      .iter()
      .zip(columns)
      .map(|(field, column)| {
        let textual = matches!(column.ty, ScalarType::Char { .. } | ScalarType::Varchar { .. });
        if field.is_empty() && !textual && !column.not_null {
          return Ok(Value::Null);
        }
        column.ty.parse_value(field)
      })
      .collect::<Result<Vec<_>, _>>()
      .map_err(|e| malformed(line_no, e.to_string()))?;

    table
      .insert(row, at)
      .map_err(|e| malformed(line_no, e.to_string()))?;
    count += 1;
  }

  Ok(count)
}
