//! Pipeline configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Everything one [`crate::Pipeline`] needs to know about its environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
  /// Where sources and built units live. Outlives a single process run.
  pub work_dir:        PathBuf,
  /// Where `<relation>.tbl` files are read from when a database is opened.
  pub table_dir:       PathBuf,
  /// Artifact name of the storage definition; always rebuilt.
  pub definition_name: String,
  /// Keep loaded units open between invocations instead of unloading after
  /// each one.
  pub keep_units_open: bool,
  pub toolchain:       Toolchain,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      work_dir:        PathBuf::from("tmp/"),
      table_dir:       PathBuf::from("../tbl/"),
      definition_name: "db".into(),
      keep_units_open: false,
      toolchain:       Toolchain::default(),
    }
  }
}

impl PipelineConfig {
  /// Configuration rooted at `work_dir`, defaults elsewhere.
  pub fn in_dir(work_dir: impl AsRef<Path>) -> Self {
    Self {
      work_dir: work_dir.as_ref().to_path_buf(),
      ..Self::default()
    }
  }

  pub fn source_path(&self, name: &str) -> PathBuf {
    self.work_dir.join(format!("{name}.src"))
  }

  pub fn artifact_path(&self, name: &str) -> PathBuf {
    self.work_dir.join(format!("{name}.unit"))
  }
}

/// How generated source becomes a unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Toolchain {
  /// Assemble in the host process.
  #[default]
  InProcess,
  /// Run an external program. `{source}` and `{artifact}` in `args` are
  /// replaced with the paths of the listing and the unit to produce.
  Command { program: String, args: Vec<String> },
}
