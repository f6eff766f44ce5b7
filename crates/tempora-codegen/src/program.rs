//! The unit object model.
//!
//! A [`CompiledUnit`] is what the assembler produces from a listing and what
//! the loader reads back from disk. It is plain serde data; the artifact on
//! disk is its JSON encoding.

use serde::{Deserialize, Serialize};
use tempora_core::{
  query::CompareOp,
  schema::Schema,
  types::{ScalarType, Value},
};

use crate::{Error, Result};

/// Bumped whenever the unit object layout changes incompatibly.
pub const ABI_VERSION: u32 = 1;

/// Definition entry point: build a database from a table directory.
pub const MAKE_DATABASE: &str = "make_database";
/// Definition entry point: physical size of one table.
pub const GET_SIZE: &str = "get_size";
/// Query entry point.
pub const QUERY: &str = "query";

// ─── Unit ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledUnit {
  pub abi:     u32,
  /// Entry points the unit exposes.
  pub exports: Vec<String>,
  pub program: Program,
}

impl CompiledUnit {
  pub fn exports(&self, symbol: &str) -> bool {
    self.exports.iter().any(|e| e == symbol)
  }

  pub fn to_json(&self) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(self)?)
  }

  /// Decode a unit object, rejecting any other ABI version.
  pub fn from_json(bytes: &[u8]) -> Result<Self> {
    let unit: Self = serde_json::from_slice(bytes)?;
    if unit.abi != ABI_VERSION {
      return Err(Error::Abi {
        found:    unit.abi,
        expected: ABI_VERSION,
      });
    }
    Ok(unit)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "unit", rename_all = "snake_case")]
pub enum Program {
  Definition(DefinitionProgram),
  Query(QueryProgram),
}

/// A storage definition: the relations a database is built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefinitionProgram {
  pub schema: Schema,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryProgram {
  /// Number of positional parameters the routine binds.
  pub params: usize,
  pub table:  String,
  pub body:   Body,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum Body {
  Execute(Operation),
  /// The routine prints this text instead of executing anything.
  Explain(String),
}

// ─── Operations ──────────────────────────────────────────────────────────────

/// A resolved statement. Columns are referenced by index into the target
/// relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
  /// Columns not listed in `values` are null.
  Insert { values: Vec<(usize, Operand)> },
  Update {
    assignments: Vec<(usize, Operand)>,
    access:      Access,
  },
  Delete { access: Access },
  Select {
    projection: Vec<usize>,
    as_of:      Option<Operand>,
    access:     Access,
  },
}

/// How a statement finds its target rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Access {
  /// Full primary key in key order, when every key column is pinned by `=`.
  pub seek:    Option<Vec<Operand>>,
  pub filters: Vec<Filter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
  pub column:  usize,
  pub op:      CompareOp,
  pub operand: Operand,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operand {
  /// Positional parameter coerced with `ty` at invocation.
  Param { index: usize, ty: ScalarType },
  /// A literal already coerced at generation time.
  Const { ty: ScalarType, value: Value },
}
