//! Source generation.
//!
//! Pipeline:
//!   Schema  ─ definition_source() → listing
//!   Query   ─ resolve()           → Operation
//!             └─ render_operation() → listing body
//!                  └─ query_source()  → listing (or explain listing)
//!
//! Generation is pure and deterministic: the same input always yields
//! byte-identical text.

use tempora_core::{
  query::{CompareOp, Comparison, Expr, Projection, Query, Statement},
  schema::{Relation, Schema},
  types::ScalarType,
};

use crate::{
  Error, Result,
  program::{Access, Filter, GET_SIZE, MAKE_DATABASE, Operand, Operation, QUERY},
};

/// Text handed to the build step, plus what the caller needs to know about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedSource {
  pub text:        String,
  /// The routine prints its logic instead of executing it.
  pub explain:     bool,
  /// One-line human-readable form of what the source implements.
  pub description: String,
}

// ─── Listing builder ─────────────────────────────────────────────────────────

#[derive(Default)]
struct Listing(String);

impl Listing {
  fn line(&mut self, text: impl AsRef<str>) {
    self.0.push_str(text.as_ref());
    self.0.push('\n');
  }

  fn comment(&mut self, text: &str) {
    // A comment must stay on one line.
    self.line(format!("; {}", text.replace(['\n', '\r'], " ")));
  }
}

/// Double-quote `s`, escaping `\`, `"` and newlines.
pub(crate) fn quote(s: &str) -> String {
  let escaped = s
    .replace('\\', "\\\\")
    .replace('"', "\\\"")
    .replace('\n', "\\n");
  format!("\"{escaped}\"")
}

// ─── Definition ──────────────────────────────────────────────────────────────

/// Listing for the storage definition of `schema`.
pub fn definition_source(schema: &Schema) -> GeneratedSource {
  let description = format!("storage definition, {} relations", schema.relations.len());

  let mut out = Listing::default();
  out.comment(&description);
  out.line("unit definition");
  out.line(format!("export {MAKE_DATABASE}"));
  out.line(format!("export {GET_SIZE}"));

  for relation in &schema.relations {
    let kind = if relation.temporal { "temporal" } else { "plain" };
    out.line(format!("relation {} {kind}", quote(&relation.name)));
    for column in &relation.columns {
      let not_null = if column.not_null { " notnull" } else { "" };
      out.line(format!("column {} {}{not_null}", quote(&column.name), column.ty));
    }
    let key: Vec<String> = relation
      .primary_key
      .iter()
      .map(|&i| quote(&relation.columns[i].name))
      .collect();
    out.line(format!("key {}", key.join(" ")));
    out.line("end");
  }

  GeneratedSource {
    text: out.0,
    explain: false,
    description,
  }
}

// ─── Query ───────────────────────────────────────────────────────────────────

/// Listing for `query`, resolved against `schema`.
///
/// Every table, column and literal is checked here; a statement that does not
/// fit the schema produces no source.
pub fn query_source(query: &Query, schema: &Schema) -> Result<GeneratedSource> {
  let relation = schema
    .relation(query.table())
    .ok_or_else(|| Error::UnknownTable(query.table().to_owned()))?;
  let operation = resolve(&query.statement, relation)?;
  let body = render_operation(&operation);
  let description = query.to_string();

  let mut out = Listing::default();
  out.comment(&description);
  out.line("unit query");
  out.line(format!("export {QUERY}"));
  out.line(format!("params {}", query.param_count()));
  out.line(format!("table {}", quote(&relation.name)));
  if query.explain {
    out.line(format!("explain {}", quote(&body)));
  } else {
    out.0.push_str(&body);
  }

  Ok(GeneratedSource {
    text: out.0,
    explain: query.explain,
    description,
  })
}

/// The body lines of a query listing, from the operation line to `end`.
pub fn render_operation(op: &Operation) -> String {
  let mut out = Listing::default();
  let sets = |out: &mut Listing, values: &[(usize, Operand)]| {
    for (column, operand) in values {
      out.line(format!("set {column} {}", render_operand(operand)));
    }
  };

  match op {
    Operation::Insert { values } => {
      out.line("insert");
      sets(&mut out, values);
    }
    Operation::Update {
      assignments,
      access,
    } => {
      out.line("update");
      sets(&mut out, assignments);
      render_access(&mut out, access);
    }
    Operation::Delete { access } => {
      out.line("delete");
      render_access(&mut out, access);
    }
    Operation::Select {
      projection,
      as_of,
      access,
    } => {
      out.line("select");
      let columns: Vec<String> = projection.iter().map(usize::to_string).collect();
      out.line(format!("project {}", columns.join(" ")));
      if let Some(at) = as_of {
        out.line(format!("asof {}", render_operand(at)));
      }
      render_access(&mut out, access);
    }
  }
  out.line("end");
  out.0
}

fn render_access(out: &mut Listing, access: &Access) {
  if let Some(seek) = &access.seek {
    let key: Vec<String> = seek.iter().map(render_operand).collect();
    out.line(format!("seek {}", key.join(" ")));
  }
  for f in &access.filters {
    out.line(format!(
      "filter {} {} {}",
      f.column,
      f.op.symbol(),
      render_operand(&f.operand)
    ));
  }
}

fn render_operand(operand: &Operand) -> String {
  match operand {
    Operand::Param { index, ty } => format!("param {index} {ty}"),
    Operand::Const { ty, value } => format!("const {ty} {}", quote(&value.to_string())),
  }
}

// ─── Resolution ──────────────────────────────────────────────────────────────

fn resolve(statement: &Statement, relation: &Relation) -> Result<Operation> {
  match statement {
    Statement::Insert {
      columns, values, ..
    } => resolve_insert(relation, columns.as_deref(), values),
    Statement::Update {
      assignments,
      predicate,
      ..
    } => {
      let mut resolved: Vec<(usize, Operand)> = Vec::with_capacity(assignments.len());
      for a in assignments {
        let column = column_index(relation, &a.column)?;
        if relation.is_key_column(column) {
          return Err(Error::KeyAssignment {
            table:  relation.name.clone(),
            column: a.column.clone(),
          });
        }
        if resolved.iter().any(|(c, _)| *c == column) {
          return Err(duplicate_column(relation, &a.column));
        }
        resolved.push((column, column_operand(relation, column, &a.value)?));
      }
      Ok(Operation::Update {
        assignments: resolved,
        access:      resolve_access(relation, predicate)?,
      })
    }
    Statement::Delete { predicate, .. } => Ok(Operation::Delete {
      access: resolve_access(relation, predicate)?,
    }),
    Statement::Select {
      projection,
      as_of,
      predicate,
      ..
    } => {
      let projection = match projection {
        Projection::All => (0..relation.arity()).collect(),
        Projection::Columns(names) => names
          .iter()
          .map(|n| column_index(relation, n))
          .collect::<Result<Vec<_>>>()?,
      };
      let as_of = as_of
        .as_ref()
        .map(|e| operand(e, ScalarType::Timestamp, "AS OF"))
        .transpose()?;
      Ok(Operation::Select {
        projection,
        as_of,
        access: resolve_access(relation, predicate)?,
      })
    }
  }
}

fn resolve_insert(
  relation: &Relation,
  columns: Option<&[String]>,
  values: &[Expr],
) -> Result<Operation> {
  let targets: Vec<usize> = match columns {
    Some(names) => names
      .iter()
      .map(|n| column_index(relation, n))
      .collect::<Result<_>>()?,
    None => (0..relation.arity()).collect(),
  };
  if targets.len() != values.len() {
    return Err(Error::InsertArity {
      table:    relation.name.clone(),
      expected: targets.len(),
      found:    values.len(),
    });
  }

  let mut resolved: Vec<(usize, Operand)> = Vec::with_capacity(targets.len());
  for (&column, value) in targets.iter().zip(values) {
    if resolved.iter().any(|(c, _)| *c == column) {
      return Err(duplicate_column(relation, &relation.columns[column].name));
    }
    resolved.push((column, column_operand(relation, column, value)?));
  }

  if let Some(&missing) = relation
    .primary_key
    .iter()
    .find(|k| !targets.contains(k))
  {
    return Err(Error::MissingKeyColumn {
      table:  relation.name.clone(),
      column: relation.columns[missing].name.clone(),
    });
  }

  Ok(Operation::Insert { values: resolved })
}

/// Resolve a predicate. When every primary-key column is pinned by `=`, those
/// comparisons become a seek and the rest stay filters.
fn resolve_access(relation: &Relation, predicate: &[Comparison]) -> Result<Access> {
  let mut filters = Vec::with_capacity(predicate.len());
  for c in predicate {
    let column = column_index(relation, &c.column)?;
    filters.push(Filter {
      column,
      op: c.op,
      operand: column_operand(relation, column, &c.value)?,
    });
  }

  if relation.primary_key.is_empty() {
    return Ok(Access { seek: None, filters });
  }
  let pins: Option<Vec<usize>> = relation
    .primary_key
    .iter()
    .map(|&k| {
      filters
        .iter()
        .position(|f| f.column == k && f.op == CompareOp::Eq)
    })
    .collect();
  let Some(pins) = pins else {
    return Ok(Access { seek: None, filters });
  };

  let seek = pins.iter().map(|&i| filters[i].operand.clone()).collect();
  let filters = filters
    .into_iter()
    .enumerate()
    .filter(|(i, _)| !pins.contains(i))
    .map(|(_, f)| f)
    .collect();
  Ok(Access {
    seek: Some(seek),
    filters,
  })
}

fn column_index(relation: &Relation, name: &str) -> Result<usize> {
  relation
    .column_index(name)
    .ok_or_else(|| Error::UnknownColumn {
      table:  relation.name.clone(),
      column: name.to_owned(),
    })
}

fn column_operand(relation: &Relation, column: usize, expr: &Expr) -> Result<Operand> {
  let col = &relation.columns[column];
  operand(expr, col.ty, &col.name)
}

fn operand(expr: &Expr, ty: ScalarType, column: &str) -> Result<Operand> {
  match expr {
    Expr::Param(index) => Ok(Operand::Param { index: *index, ty }),
    Expr::Literal(lit) => {
      let value = ty.parse_value(lit.text()).map_err(|source| Error::Literal {
        column: column.to_owned(),
        source,
      })?;
      Ok(Operand::Const { ty, value })
    }
  }
}

fn duplicate_column(relation: &Relation, column: &str) -> Error {
  Error::DuplicateColumn {
    table:  relation.name.clone(),
    column: column.to_owned(),
  }
}
