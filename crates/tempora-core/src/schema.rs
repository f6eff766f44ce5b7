//! Schema model: relations and their columns.
//!
//! A [`Schema`] is produced once by the schema parser and never mutated. Its
//! relation and column order is the parse order, which keeps generated
//! definition source deterministic.

use serde::{Deserialize, Serialize};

use crate::types::{Row, ScalarType, Value};

/// A single column of a relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
  pub name:     String,
  pub ty:       ScalarType,
  pub not_null: bool,
}

/// A relation: ordered columns plus a primary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
  pub name:        String,
  pub columns:     Vec<Column>,
  /// Indices into `columns`, in key order.
  pub primary_key: Vec<usize>,
  /// Temporal relations keep a version chain per row identity; conventional
  /// ones mutate in place.
  pub temporal:    bool,
}

impl Relation {
  pub fn arity(&self) -> usize { self.columns.len() }

  pub fn column_index(&self, name: &str) -> Option<usize> {
    self
      .columns
      .iter()
      .position(|c| c.name.eq_ignore_ascii_case(name))
  }

  pub fn column(&self, name: &str) -> Option<&Column> {
    self.column_index(name).map(|i| &self.columns[i])
  }

  pub fn is_key_column(&self, index: usize) -> bool {
    self.primary_key.contains(&index)
  }

  /// Project the primary-key values out of `row`.
  pub fn key_of(&self, row: &Row) -> Vec<Value> {
    self
      .primary_key
      .iter()
      .map(|&i| row.get(i).cloned().unwrap_or(Value::Null))
      .collect()
  }
}

/// The full set of relations known to a database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
  pub relations: Vec<Relation>,
}

impl Schema {
  pub fn relation(&self, name: &str) -> Option<&Relation> {
    self
      .relations
      .iter()
      .find(|r| r.name.eq_ignore_ascii_case(name))
  }
}
