//! [`Database`], the handle every compiled query routine operates on.

use std::{
  collections::BTreeMap,
  path::{Path, PathBuf},
  sync::Arc,
};

use chrono::{DateTime, Utc};
use tempora_core::schema::Schema;

use crate::{Clock, Error, Result, load, table::Table};

/// Owns one [`Table`] per relation of a storage definition.
#[derive(Debug)]
pub struct Database {
  root:   PathBuf,
  tables: BTreeMap<String, Table>,
  clock:  Arc<dyn Clock>,
}

impl Database {
  /// Create empty tables for every relation in `schema`.
  pub fn new(schema: &Schema, root: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
    let tables = schema
      .relations
      .iter()
      .map(|r| (r.name.to_ascii_lowercase(), Table::new(r.clone())))
      .collect();
    Self {
      root: root.into(),
      tables,
      clock,
    }
  }

  /// Create the tables and populate each from `<root>/<relation>.tbl` when
  /// that file exists.
  pub fn open(schema: &Schema, root: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Result<Self> {
    let mut db = Self::new(schema, root, clock);
    let at = db.now();
    for table in db.tables.values_mut() {
      let path = db.root.join(format!("{}.tbl", table.name()));
      let loaded = load::load_table(table, &path, at)?;
      if loaded > 0 {
        tracing::debug!(table = table.name(), rows = loaded, "loaded table file");
      }
    }
    Ok(db)
  }

  pub fn root(&self) -> &Path { &self.root }

  /// The current transition time according to the database clock.
  pub fn now(&self) -> DateTime<Utc> { self.clock.now() }

  pub fn table(&self, name: &str) -> Result<&Table> {
    self
      .tables
      .get(&name.to_ascii_lowercase())
      .ok_or_else(|| Error::UnknownTable(name.to_owned()))
  }

  pub fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
    self
      .tables
      .get_mut(&name.to_ascii_lowercase())
      .ok_or_else(|| Error::UnknownTable(name.to_owned()))
  }

  pub fn tables(&self) -> impl Iterator<Item = &Table> { self.tables.values() }

  /// Stored row versions of `table`, history included.
  pub fn get_size(&self, table: &str) -> Result<usize> {
    Ok(self.table(table)?.physical_len())
  }
}
