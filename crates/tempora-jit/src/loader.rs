//! Execution unit loader.
//!
//! Loading reads a unit object, checks its ABI version and resolves the entry
//! points the caller needs. An [`ExecutionUnit`] is the only way to invoke a
//! unit and [`ExecutionUnit::unload`] consumes it, so a released unit cannot
//! be called again.

use std::{
  collections::HashMap,
  path::{Path, PathBuf},
  sync::Arc,
};

use parking_lot::Mutex;
use tempora_codegen::{
  CompiledUnit, Program, QueryOutput, exec,
  program::{GET_SIZE, MAKE_DATABASE, QUERY},
};
use tempora_storage::{Clock, Database};

use crate::error::{LoadError, RunError};

// ─── Loader ──────────────────────────────────────────────────────────────────

/// Opens units, optionally keeping them open across invocations.
#[derive(Debug)]
pub struct Loader {
  keep_open: bool,
  open:      Mutex<HashMap<PathBuf, Arc<CompiledUnit>>>,
}

impl Loader {
  pub fn new(keep_open: bool) -> Self {
    Self {
      keep_open,
      open: Mutex::new(HashMap::new()),
    }
  }

  /// Open the unit at `path` and resolve `symbols` against its exports.
  pub async fn load(&self, path: &Path, symbols: &[&str]) -> Result<ExecutionUnit, LoadError> {
    let cached = self.open.lock().get(path).cloned();
    let (unit, fresh) = match cached {
      Some(unit) => {
        tracing::debug!(unit = %path.display(), "reusing open unit");
        (unit, false)
      }
      None => {
        let unit = Arc::new(read_unit(path).await?);
        tracing::debug!(unit = %path.display(), "loaded unit");
        (unit, true)
      }
    };

    if let Some(&symbol) = symbols.iter().find(|s| !provides(&unit, s)) {
      return Err(LoadError::SymbolMissing {
        name: symbol.to_owned(),
        path: path.to_path_buf(),
      });
    }

    // Only units that resolved are kept, so a bad one is re-read next time.
    if fresh && self.keep_open {
      self.open.lock().insert(path.to_path_buf(), unit.clone());
    }

    Ok(ExecutionUnit {
      path:     path.to_path_buf(),
      unit:     Some(unit),
      resolved: symbols.iter().map(|s| (*s).to_owned()).collect(),
    })
  }

  /// Forget any open handle for `path`; the next load reads it from disk.
  pub fn invalidate(&self, path: &Path) {
    if self.open.lock().remove(path).is_some() {
      tracing::debug!(unit = %path.display(), "invalidated open unit");
    }
  }

  /// Number of units currently held open.
  pub fn open_units(&self) -> usize { self.open.lock().len() }

  /// Release every open unit. Fails if any of them is still checked out.
  pub fn shutdown(&self) -> Result<(), LoadError> {
    let open: Vec<(PathBuf, Arc<CompiledUnit>)> = self.open.lock().drain().collect();
    let mut first_error = None;
    for (path, unit) in open {
      let outstanding = Arc::strong_count(&unit) - 1;
      if outstanding > 0 {
        tracing::warn!(unit = %path.display(), outstanding, "unit still in use at shutdown");
        first_error.get_or_insert(LoadError::UnloadFailure { path, outstanding });
      }
    }
    match first_error {
      Some(e) => Err(e),
      None => Ok(()),
    }
  }
}

async fn read_unit(path: &Path) -> Result<CompiledUnit, LoadError> {
  let open_failure = |reason: String| LoadError::OpenFailure {
    path: path.to_path_buf(),
    reason,
  };
  let bytes = tokio::fs::read(path)
    .await
    .map_err(|e| open_failure(e.to_string()))?;
  CompiledUnit::from_json(&bytes).map_err(|e| open_failure(e.to_string()))
}

/// An exported symbol only counts if the unit's program backs it.
fn provides(unit: &CompiledUnit, symbol: &str) -> bool {
  let backed = match &unit.program {
    Program::Definition(_) => symbol == MAKE_DATABASE || symbol == GET_SIZE,
    Program::Query(_) => symbol == QUERY,
  };
  backed && unit.exports(symbol)
}

// ─── Execution unit ──────────────────────────────────────────────────────────

/// A loaded unit with its entry points resolved.
#[derive(Debug)]
pub struct ExecutionUnit {
  path:     PathBuf,
  /// `None` once unloaded.
  unit:     Option<Arc<CompiledUnit>>,
  resolved: Vec<String>,
}

impl ExecutionUnit {
  pub fn path(&self) -> &Path { &self.path }

  fn entry(&self, symbol: &str) -> Result<&CompiledUnit, LoadError> {
    match &self.unit {
      Some(unit) if self.resolved.iter().any(|s| s == symbol) => Ok(unit),
      _ => Err(LoadError::SymbolMissing {
        name: symbol.to_owned(),
        path: self.path.clone(),
      }),
    }
  }

  /// `make_database(root)`.
  pub fn make_database(&self, root: &Path, clock: Arc<dyn Clock>) -> Result<Database, RunError> {
    match &self.entry(MAKE_DATABASE)?.program {
      Program::Definition(def) => Ok(exec::make_database(def, root, clock)?),
      Program::Query(_) => Err(self.missing(MAKE_DATABASE)),
    }
  }

  /// `get_size(db, table)`.
  pub fn get_size(&self, db: &Database, table: &str) -> Result<usize, RunError> {
    match &self.entry(GET_SIZE)?.program {
      Program::Definition(_) => Ok(exec::get_size(db, table)?),
      Program::Query(_) => Err(self.missing(GET_SIZE)),
    }
  }

  /// `query(db, params, explain)`.
  pub fn invoke_query(
    &self,
    db: &mut Database,
    params: &[String],
    explain: bool,
  ) -> Result<QueryOutput, RunError> {
    match &self.entry(QUERY)?.program {
      Program::Query(q) => Ok(exec::run_query(q, db, params, explain)?),
      Program::Definition(_) => Err(self.missing(QUERY)),
    }
  }

  fn missing(&self, symbol: &str) -> RunError {
    RunError::Load(LoadError::SymbolMissing {
      name: symbol.to_owned(),
      path: self.path.clone(),
    })
  }

  /// Release the unit.
  pub fn unload(mut self) -> Result<(), LoadError> {
    self.unit.take();
    tracing::debug!(unit = %self.path.display(), "unloaded unit");
    Ok(())
  }
}

impl Drop for ExecutionUnit {
  fn drop(&mut self) {
    if self.unit.take().is_some() {
      tracing::warn!(unit = %self.path.display(), "execution unit dropped without unload");
    }
  }
}

#[cfg(test)]
mod tests {
  use tempora_codegen::{assemble, program::ABI_VERSION};

  use super::*;

  async fn write(dir: &Path, name: &str, listing: &str) -> PathBuf {
    let path = dir.join(name);
    let unit = assemble(listing).unwrap();
    tokio::fs::write(&path, unit.to_json().unwrap()).await.unwrap();
    path
  }

  const QUERY_UNIT: &str = "unit query\nexport query\nparams 0\ntable \"t\"\ndelete\nend\n";

  #[tokio::test]
  async fn missing_file_is_open_failure() {
    let dir = tempfile::TempDir::new().unwrap();
    let err = Loader::new(false)
      .load(&dir.path().join("nope.unit"), &[QUERY])
      .await
      .unwrap_err();
    assert!(matches!(err, LoadError::OpenFailure { .. }));
  }

  #[tokio::test]
  async fn garbage_and_wrong_abi_are_open_failures() {
    let dir = tempfile::TempDir::new().unwrap();
    let garbage = dir.path().join("garbage.unit");
    tokio::fs::write(&garbage, b"\x7fELF").await.unwrap();

    let mut unit = assemble(QUERY_UNIT).unwrap();
    unit.abi = ABI_VERSION + 1;
    let future = dir.path().join("future.unit");
    tokio::fs::write(&future, unit.to_json().unwrap()).await.unwrap();

    let loader = Loader::new(false);
    for path in [garbage, future] {
      let err = loader.load(&path, &[QUERY]).await.unwrap_err();
      assert!(err.is_corrupt_artifact(), "{err}");
    }
  }

  #[tokio::test]
  async fn unexported_symbol_is_missing() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = write(
      dir.path(),
      "q.unit",
      "unit query\nparams 0\ntable \"t\"\ndelete\nend\n",
    )
    .await;
    let err = Loader::new(false).load(&path, &[QUERY]).await.unwrap_err();
    assert!(matches!(err, LoadError::SymbolMissing { ref name, .. } if name == QUERY));

    // Exporting a symbol the program cannot back does not help.
    let path = write(dir.path(), "d.unit", "unit definition\nexport query\n").await;
    let err = Loader::new(false).load(&path, &[QUERY]).await.unwrap_err();
    assert!(matches!(err, LoadError::SymbolMissing { .. }));
  }

  #[tokio::test]
  async fn kept_units_are_reused_until_invalidated() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = write(dir.path(), "q.unit", QUERY_UNIT).await;
    let loader = Loader::new(true);

    loader.load(&path, &[QUERY]).await.unwrap().unload().unwrap();
    assert_eq!(loader.open_units(), 1);

    // The open handle survives the file going away.
    tokio::fs::remove_file(&path).await.unwrap();
    loader.load(&path, &[QUERY]).await.unwrap().unload().unwrap();

    loader.invalidate(&path);
    assert_eq!(loader.open_units(), 0);
    assert!(loader.load(&path, &[QUERY]).await.is_err());
  }

  #[tokio::test]
  async fn unresolved_units_are_not_kept_open() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = write(dir.path(), "db.unit", "unit definition\nexport make_database\n").await;
    let loader = Loader::new(true);

    let err = loader.load(&path, &[MAKE_DATABASE, GET_SIZE]).await.unwrap_err();
    assert!(matches!(err, LoadError::SymbolMissing { ref name, .. } if name == GET_SIZE));
    assert_eq!(loader.open_units(), 0);

    // A fixed artifact on disk is picked up without an explicit invalidate.
    write(
      dir.path(),
      "db.unit",
      "unit definition\nexport make_database\nexport get_size\n",
    )
    .await;
    loader
      .load(&path, &[MAKE_DATABASE, GET_SIZE])
      .await
      .unwrap()
      .unload()
      .unwrap();
    assert_eq!(loader.open_units(), 1);
  }

  #[tokio::test]
  async fn shutdown_reports_units_still_in_use() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = write(dir.path(), "q.unit", QUERY_UNIT).await;
    let loader = Loader::new(true);

    let held = loader.load(&path, &[QUERY]).await.unwrap();
    let err = loader.shutdown().unwrap_err();
    assert!(matches!(err, LoadError::UnloadFailure { outstanding: 1, .. }));
    held.unload().unwrap();

    loader.load(&path, &[QUERY]).await.unwrap().unload().unwrap();
    loader.shutdown().unwrap();
    assert_eq!(loader.open_units(), 0);
  }
}
