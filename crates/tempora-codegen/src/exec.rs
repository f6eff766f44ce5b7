//! Running unit programs against a [`Database`].

use std::{fmt, path::Path, sync::Arc};

use chrono::{DateTime, Utc};
use tempora_core::{
  query::CompareOp,
  types::{Row, Value},
};
use tempora_storage::{Clock, Database, Key, Table};

use crate::{
  Error, Result,
  emit::render_operation,
  program::{Access, Body, DefinitionProgram, Operand, Operation, QueryProgram},
};

// ─── Output ──────────────────────────────────────────────────────────────────

/// Rows produced by a SELECT, in primary-key order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultSet {
  pub columns: Vec<String>,
  pub rows:    Vec<Row>,
}

impl fmt::Display for ResultSet {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "{}", self.columns.join("|"))?;
    for row in &self.rows {
      let fields: Vec<String> = row.iter().map(ToString::to_string).collect();
      writeln!(f, "{}", fields.join("|"))?;
    }
    Ok(())
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutput {
  /// Rows touched by INSERT, UPDATE or DELETE. Zero means nothing matched.
  Affected(usize),
  Rows(ResultSet),
  /// The routine's logic, printed instead of executed.
  Explained(String),
}

impl fmt::Display for QueryOutput {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Affected(n) => writeln!(f, "{n} row(s) affected"),
      Self::Rows(rs) => rs.fmt(f),
      Self::Explained(text) => f.write_str(text),
    }
  }
}

// ─── Definition entry points ─────────────────────────────────────────────────

/// Build a database for `program`, loading table files from `root`.
pub fn make_database(
  program: &DefinitionProgram,
  root: &Path,
  clock: Arc<dyn Clock>,
) -> Result<Database> {
  Ok(Database::open(&program.schema, root, clock)?)
}

pub fn get_size(db: &Database, table: &str) -> Result<usize> {
  Ok(db.get_size(table)?)
}

// ─── Query entry point ───────────────────────────────────────────────────────

/// Run a query routine.
///
/// With `explain` set, or for a unit generated in explain mode, nothing is
/// executed and the routine's logic is returned as text.
pub fn run_query(
  program: &QueryProgram,
  db: &mut Database,
  params: &[String],
  explain: bool,
) -> Result<QueryOutput> {
  let op = match &program.body {
    Body::Explain(text) => return Ok(QueryOutput::Explained(text.clone())),
    Body::Execute(op) if explain => {
      return Ok(QueryOutput::Explained(render_operation(op)));
    }
    Body::Execute(op) => op,
  };

  if params.len() < program.params {
    return Err(Error::MissingParam {
      index:    params.len(),
      supplied: params.len(),
    });
  }
  let bind = Binder { params };
  let at = db.now();
  let table = db.table_mut(&program.table)?;

  let output = match op {
    Operation::Insert { values } => {
      let mut row = vec![Value::Null; table.relation().arity()];
      for (column, operand) in values {
        let slot = row
          .get_mut(*column)
          .ok_or_else(|| column_error(table, *column))?;
        *slot = bind.value(operand)?;
      }
      table.insert(row, at)?;
      QueryOutput::Affected(1)
    }
    Operation::Update {
      assignments,
      access,
    } => {
      let assignments = assignments
        .iter()
        .map(|(column, operand)| Ok((*column, bind.value(operand)?)))
        .collect::<Result<Vec<_>>>()?;
      let mut affected = 0;
      for key in matching_keys(table, access, &bind)? {
        if table.update(&key, &assignments, at)?.is_applied() {
          affected += 1;
        }
      }
      QueryOutput::Affected(affected)
    }
    Operation::Delete { access } => {
      let mut affected = 0;
      for key in matching_keys(table, access, &bind)? {
        if table.delete(&key, at).is_applied() {
          affected += 1;
        }
      }
      QueryOutput::Affected(affected)
    }
    Operation::Select {
      projection,
      as_of,
      access,
    } => {
      let as_of = as_of.as_ref().map(|o| bind.timestamp(o)).transpose()?;
      let relation = table.relation();
      let columns = projection
        .iter()
        .map(|&i| {
          relation
            .columns
            .get(i)
            .map(|c| c.name.clone())
            .ok_or_else(|| column_error(table, i))
        })
        .collect::<Result<Vec<_>>>()?;
      let rows = matching_rows(table, access, as_of, &bind)?
        .into_iter()
        .map(|row| projection.iter().map(|&i| row[i].clone()).collect())
        .collect();
      QueryOutput::Rows(ResultSet { columns, rows })
    }
  };

  tracing::debug!(table = %program.table, ?output, "query routine finished");
  Ok(output)
}

// ─── Access paths ────────────────────────────────────────────────────────────

/// Keys of the current rows `access` selects.
fn matching_keys(table: &Table, access: &Access, bind: &Binder) -> Result<Vec<Key>> {
  let relation = table.relation();
  Ok(
    matching_rows(table, access, None, bind)?
      .into_iter()
      .map(|row| relation.key_of(row))
      .collect(),
  )
}

fn matching_rows<'t>(
  table: &'t Table,
  access: &Access,
  as_of: Option<DateTime<Utc>>,
  bind: &Binder,
) -> Result<Vec<&'t Row>> {
  let arity = table.relation().arity();
  let filters = access
    .filters
    .iter()
    .map(|f| {
      if f.column >= arity {
        return Err(column_error(table, f.column));
      }
      Ok((f.column, f.op, bind.value(&f.operand)?))
    })
    .collect::<Result<Vec<_>>>()?;

  let candidates: Vec<&Row> = match &access.seek {
    Some(seek) => {
      let expected = table.relation().primary_key.len();
      if seek.len() != expected {
        return Err(Error::SeekArity {
          table: table.name().to_owned(),
          expected,
          found: seek.len(),
        });
      }
      let key = seek
        .iter()
        .map(|o| bind.value(o))
        .collect::<Result<Vec<_>>>()?;
      table.get(&key, as_of).into_iter().collect()
    }
    None => table.scan(as_of).collect(),
  };

  Ok(
    candidates
      .into_iter()
      .filter(|row| {
        filters
          .iter()
          .all(|(column, op, value)| compare(&row[*column], *op, value))
      })
      .collect(),
  )
}

/// SQL comparison; anything compared with NULL is false.
fn compare(lhs: &Value, op: CompareOp, rhs: &Value) -> bool {
  if lhs.is_null() || rhs.is_null() {
    return false;
  }
  match op {
    CompareOp::Eq => lhs == rhs,
    CompareOp::NotEq => lhs != rhs,
    CompareOp::Lt => lhs < rhs,
    CompareOp::LtEq => lhs <= rhs,
    CompareOp::Gt => lhs > rhs,
    CompareOp::GtEq => lhs >= rhs,
  }
}

fn column_error(table: &Table, index: usize) -> Error {
  Error::ColumnIndex {
    table: table.name().to_owned(),
    index,
  }
}

// ─── Parameter binding ───────────────────────────────────────────────────────

struct Binder<'a> {
  params: &'a [String],
}

impl Binder<'_> {
  fn value(&self, operand: &Operand) -> Result<Value> {
    match operand {
      Operand::Const { value, .. } => Ok(value.clone()),
      Operand::Param { index, ty } => {
        let raw = self.params.get(*index).ok_or(Error::MissingParam {
          index:    *index,
          supplied: self.params.len(),
        })?;
        ty.parse_value(raw).map_err(|source| Error::Param {
          index: *index,
          source,
        })
      }
    }
  }

  fn timestamp(&self, operand: &Operand) -> Result<DateTime<Utc>> {
    match self.value(operand)? {
      Value::Timestamp(ts) => Ok(ts),
      other => Err(Error::AsOf(other.to_string())),
    }
  }
}
