//! Query IR: the parsed form of a single SQL statement.
//!
//! The IR is unresolved: table and column names are plain strings and
//! literals keep their source text. The code generator resolves both against
//! a [`crate::schema::Schema`].

use std::fmt;

use serde::{Deserialize, Serialize};

// ─── Expressions ─────────────────────────────────────────────────────────────

/// A literal exactly as written in the query text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum Literal {
  /// An integer or decimal numeral, e.g. `42` or `-3.50`.
  Number(String),
  /// A single-quoted string with quote escapes already removed.
  String(String),
}

impl Literal {
  pub fn text(&self) -> &str {
    match self {
      Self::Number(s) | Self::String(s) => s,
    }
  }
}

/// A scalar operand: either a positional parameter or a literal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Expr {
  /// A `?` placeholder; the index is its position among all placeholders of
  /// the statement, counted left to right from zero.
  Param(usize),
  Literal(Literal),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
  Eq,
  NotEq,
  Lt,
  LtEq,
  Gt,
  GtEq,
}

impl CompareOp {
  pub fn symbol(&self) -> &'static str {
    match self {
      Self::Eq => "=",
      Self::NotEq => "<>",
      Self::Lt => "<",
      Self::LtEq => "<=",
      Self::Gt => ">",
      Self::GtEq => ">=",
    }
  }
}

/// `column op value`; a predicate is a conjunction of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comparison {
  pub column: String,
  pub op:     CompareOp,
  pub value:  Expr,
}

/// `column = value` in an UPDATE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
  pub column: String,
  pub value:  Expr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "columns", rename_all = "snake_case")]
pub enum Projection {
  All,
  Columns(Vec<String>),
}

// ─── Statements ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
  Insert,
  Update,
  Delete,
  Select,
}

impl fmt::Display for StatementKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::Insert => "INSERT",
      Self::Update => "UPDATE",
      Self::Delete => "DELETE",
      Self::Select => "SELECT",
    })
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Statement {
  Insert {
    table:   String,
    /// Explicit column list; `None` means all columns in relation order.
    columns: Option<Vec<String>>,
    values:  Vec<Expr>,
  },
  Update {
    table:       String,
    assignments: Vec<Assignment>,
    predicate:   Vec<Comparison>,
  },
  Delete {
    table:     String,
    predicate: Vec<Comparison>,
  },
  Select {
    table:      String,
    projection: Projection,
    /// `FOR SYSTEM_TIME AS OF <expr>`.
    as_of:      Option<Expr>,
    predicate:  Vec<Comparison>,
  },
}

impl Statement {
  pub fn kind(&self) -> StatementKind {
    match self {
      Self::Insert { .. } => StatementKind::Insert,
      Self::Update { .. } => StatementKind::Update,
      Self::Delete { .. } => StatementKind::Delete,
      Self::Select { .. } => StatementKind::Select,
    }
  }

  pub fn table(&self) -> &str {
    match self {
      Self::Insert { table, .. }
      | Self::Update { table, .. }
      | Self::Delete { table, .. }
      | Self::Select { table, .. } => table,
    }
  }

  /// Every expression in textual order.
  fn exprs(&self) -> Vec<&Expr> {
    match self {
      Self::Insert { values, .. } => values.iter().collect(),
      Self::Update {
        assignments,
        predicate,
        ..
      } => assignments
        .iter()
        .map(|a| &a.value)
        .chain(predicate_exprs(predicate))
        .collect(),
      Self::Delete { predicate, .. } => predicate_exprs(predicate).collect(),
      Self::Select {
        as_of, predicate, ..
      } => as_of.iter().chain(predicate_exprs(predicate)).collect(),
    }
  }
}

fn predicate_exprs(predicate: &[Comparison]) -> impl Iterator<Item = &Expr> {
  predicate.iter().map(|c| &c.value)
}

/// A parsed statement plus the explain flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
  pub statement: Statement,
  /// When set, the compiled routine prints its generated logic instead of
  /// executing it.
  pub explain:   bool,
}

impl Query {
  pub fn kind(&self) -> StatementKind { self.statement.kind() }

  pub fn table(&self) -> &str { self.statement.table() }

  /// Number of positional parameters the statement binds.
  pub fn param_count(&self) -> usize {
    self
      .statement
      .exprs()
      .into_iter()
      .filter_map(|e| match e {
        Expr::Param(i) => Some(i + 1),
        Expr::Literal(_) => None,
      })
      .max()
      .unwrap_or(0)
  }
}

// ─── Display ─────────────────────────────────────────────────────────────────

impl fmt::Display for Expr {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Param(_) => f.write_str("?"),
      Self::Literal(Literal::Number(n)) => f.write_str(n),
      Self::Literal(Literal::String(s)) => write!(f, "'{}'", s.replace('\'', "''")),
    }
  }
}

fn write_predicate(f: &mut fmt::Formatter<'_>, predicate: &[Comparison]) -> fmt::Result {
  for (i, c) in predicate.iter().enumerate() {
    f.write_str(if i == 0 { " WHERE " } else { " AND " })?;
    write!(f, "{} {} {}", c.column, c.op.symbol(), c.value)?;
  }
  Ok(())
}

fn join<T: fmt::Display>(items: &[T]) -> String {
  items
    .iter()
    .map(ToString::to_string)
    .collect::<Vec<_>>()
    .join(", ")
}

/// Canonical SQL rendering; used as the human-readable description embedded
/// in generated source.
impl fmt::Display for Query {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.explain {
      f.write_str("EXPLAIN ")?;
    }
    match &self.statement {
      Statement::Insert {
        table,
        columns,
        values,
      } => {
        write!(f, "INSERT INTO {table}")?;
        if let Some(cols) = columns {
          write!(f, " ({})", cols.join(", "))?;
        }
        write!(f, " VALUES ({})", join(values))
      }
      Statement::Update {
        table,
        assignments,
        predicate,
      } => {
        write!(f, "UPDATE {table} SET ")?;
        let sets: Vec<String> = assignments
          .iter()
          .map(|a| format!("{} = {}", a.column, a.value))
          .collect();
        f.write_str(&sets.join(", "))?;
        write_predicate(f, predicate)
      }
      Statement::Delete { table, predicate } => {
        write!(f, "DELETE FROM {table}")?;
        write_predicate(f, predicate)
      }
      Statement::Select {
        table,
        projection,
        as_of,
        predicate,
      } => {
        f.write_str("SELECT ")?;
        match projection {
          Projection::All => f.write_str("*")?,
          Projection::Columns(cols) => f.write_str(&cols.join(", "))?,
        }
        write!(f, " FROM {table}")?;
        if let Some(t) = as_of {
          write!(f, " FOR SYSTEM_TIME AS OF {t}")?;
        }
        write_predicate(f, predicate)
      }
    }
  }
}
