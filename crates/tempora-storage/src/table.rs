//! Tables: temporal and conventional row stores behind one interface.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tempora_core::{
  schema::Relation,
  types::{Row, Value},
};

use crate::{
  Error, Result,
  version::{RowVersion, VersionChain},
};

/// Primary-key values in key-column order.
pub type Key = Vec<Value>;

/// The result of an UPDATE or DELETE on one identity.
///
/// Targeting an identity with no current row is not an error; it reports
/// `NoMatch` and leaves the table untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
  Applied,
  NoMatch,
}

impl Mutation {
  pub fn is_applied(&self) -> bool { matches!(self, Self::Applied) }
}

#[derive(Debug)]
enum Rows {
  Temporal(BTreeMap<Key, VersionChain>),
  Plain(BTreeMap<Key, Row>),
}

/// A named collection of rows for one relation.
#[derive(Debug)]
pub struct Table {
  relation: Relation,
  rows:     Rows,
}

impl Table {
  pub fn new(relation: Relation) -> Self {
    let rows = if relation.temporal {
      Rows::Temporal(BTreeMap::new())
    } else {
      Rows::Plain(BTreeMap::new())
    };
    Self { relation, rows }
  }

  pub fn relation(&self) -> &Relation { &self.relation }

  pub fn name(&self) -> &str { &self.relation.name }

  pub fn is_temporal(&self) -> bool { matches!(self.rows, Rows::Temporal(_)) }

  /// Number of current rows.
  pub fn len(&self) -> usize {
    match &self.rows {
      Rows::Temporal(chains) => {
        chains.values().filter(|c| c.current().is_some()).count()
      }
      Rows::Plain(rows) => rows.len(),
    }
  }

  pub fn is_empty(&self) -> bool { self.len() == 0 }

  /// Number of stored row versions, current and historical.
  pub fn physical_len(&self) -> usize {
    match &self.rows {
      Rows::Temporal(chains) => chains.values().map(VersionChain::len).sum(),
      Rows::Plain(rows) => rows.len(),
    }
  }

  // ── Writes ──────────────────────────────────────────────────────────────

  /// Insert a new identity.
  ///
  /// Fails with [`Error::DuplicateKey`] if the identity currently exists. A
  /// temporal identity that is historical-only gains a new current version.
  pub fn insert(&mut self, row: Row, at: DateTime<Utc>) -> Result<()> {
    self.check_row(&row)?;
    let key = self.relation.key_of(&row);

    match &mut self.rows {
      Rows::Temporal(chains) => match chains.get_mut(&key) {
        Some(chain) if chain.current().is_some() => {
          Err(duplicate(&self.relation, &key))
        }
        Some(chain) => {
          chain.open(row, at);
          Ok(())
        }
        None => {
          chains.insert(key, VersionChain::new(row, at));
          Ok(())
        }
      },
      Rows::Plain(rows) => {
        if rows.contains_key(&key) {
          return Err(duplicate(&self.relation, &key));
        }
        rows.insert(key, row);
        Ok(())
      }
    }
  }

  /// Apply `assignments` (column index, new value) to the current row of
  /// `key`. Temporal tables close the current version and append the updated
  /// row; conventional tables overwrite in place.
  pub fn update(
    &mut self,
    key: &[Value],
    assignments: &[(usize, Value)],
    at: DateTime<Utc>,
  ) -> Result<Mutation> {
    for (idx, value) in assignments {
      let column = self.relation.columns.get(*idx).ok_or_else(|| Error::Arity {
        table:    self.relation.name.clone(),
        expected: self.relation.arity(),
        found:    idx + 1,
      })?;
      if self.relation.is_key_column(*idx) {
        return Err(Error::KeyUpdate {
          table:  self.relation.name.clone(),
          column: column.name.clone(),
        });
      }
      self.check_value(*idx, value)?;
    }

    let apply = |row: &mut Row| {
      for (idx, value) in assignments {
        row[*idx] = value.clone();
      }
    };

    let mutation = match &mut self.rows {
      Rows::Temporal(chains) => {
        let Some(chain) = chains.get_mut(key) else {
          return Ok(Mutation::NoMatch);
        };
        let Some(current) = chain.current() else {
          return Ok(Mutation::NoMatch);
        };
        let mut next = current.row.clone();
        apply(&mut next);
        chain.supersede(next, at);
        Mutation::Applied
      }
      Rows::Plain(rows) => match rows.get_mut(key) {
        Some(row) => {
          apply(row);
          Mutation::Applied
        }
        None => Mutation::NoMatch,
      },
    };
    Ok(mutation)
  }

  /// Remove the current row of `key`. Temporal tables close the current
  /// version and keep the chain for past-time reads.
  pub fn delete(&mut self, key: &[Value], at: DateTime<Utc>) -> Mutation {
    match &mut self.rows {
      Rows::Temporal(chains) => {
        match chains.get_mut(key).and_then(|chain| chain.close(at)) {
          Some(_) => Mutation::Applied,
          None => Mutation::NoMatch,
        }
      }
      Rows::Plain(rows) => match rows.remove(key) {
        Some(_) => Mutation::Applied,
        None => Mutation::NoMatch,
      },
    }
  }

  // ── Reads ───────────────────────────────────────────────────────────────

  /// The row for `key`, current or as of a past instant. Conventional
  /// tables have no history and always answer with the current row.
  pub fn get(&self, key: &[Value], as_of: Option<DateTime<Utc>>) -> Option<&Row> {
    match &self.rows {
      Rows::Temporal(chains) => {
        let chain = chains.get(key)?;
        let version = match as_of {
          Some(at) => chain.as_of(at),
          None => chain.current(),
        };
        version.map(|v| &v.row)
      }
      Rows::Plain(rows) => rows.get(key),
    }
  }

  /// Rows in primary-key order, current or as of a past instant.
  pub fn scan(
    &self,
    as_of: Option<DateTime<Utc>>,
  ) -> Box<dyn Iterator<Item = &Row> + '_> {
    match &self.rows {
      Rows::Temporal(chains) => Box::new(chains.values().filter_map(move |c| {
        let version = match as_of {
          Some(at) => c.as_of(at),
          None => c.current(),
        };
        version.map(|v| &v.row)
      })),
      Rows::Plain(rows) => Box::new(rows.values()),
    }
  }

  /// Every stored version of `key`; `None` for conventional tables or
  /// unknown identities.
  pub fn history(&self, key: &[Value]) -> Option<&[RowVersion]> {
    match &self.rows {
      Rows::Temporal(chains) => chains.get(key).map(VersionChain::versions),
      Rows::Plain(_) => None,
    }
  }

  // ── Validation ──────────────────────────────────────────────────────────

  fn check_row(&self, row: &Row) -> Result<()> {
    if row.len() != self.relation.arity() {
      return Err(Error::Arity {
        table:    self.relation.name.clone(),
        expected: self.relation.arity(),
        found:    row.len(),
      });
    }
    row
      .iter()
      .enumerate()
      .try_for_each(|(idx, value)| self.check_value(idx, value))
  }

  fn check_value(&self, idx: usize, value: &Value) -> Result<()> {
    let column = &self.relation.columns[idx];
    if value.is_null() && column.not_null {
      return Err(Error::NullViolation {
        table:  self.relation.name.clone(),
        column: column.name.clone(),
      });
    }
    if !value.conforms_to(&column.ty) {
      return Err(Error::TypeMismatch {
        table:  self.relation.name.clone(),
        column: column.name.clone(),
        value:  value.to_string(),
      });
    }
    Ok(())
  }
}

fn duplicate(relation: &Relation, key: &[Value]) -> Error {
  let key: Vec<String> = key.iter().map(ToString::to_string).collect();
  Error::DuplicateKey {
    table: relation.name.clone(),
    key:   format!("({})", key.join(", ")),
  }
}
