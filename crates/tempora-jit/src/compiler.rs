//! The build capability: turn a listing on disk into a unit on disk.

use std::{future::Future, path::Path};

use tempora_codegen::assemble;
use tokio::process::Command;

use crate::{
  config::Toolchain,
  error::BuildError,
};

/// Turns the listing at `source` into a unit at `artifact`.
///
/// Implementations write only to `artifact`; the build cache hands them a
/// private temporary path and publishes it on success.
pub trait Compiler: Send + Sync {
  fn compile<'a>(
    &'a self,
    source: &'a Path,
    artifact: &'a Path,
  ) -> impl Future<Output = Result<(), BuildError>> + Send + 'a;
}

// ─── In-process ──────────────────────────────────────────────────────────────

/// Assembles listings in the host process.
#[derive(Debug, Default, Clone, Copy)]
pub struct InProcessCompiler;

impl Compiler for InProcessCompiler {
  async fn compile(&self, source: &Path, artifact: &Path) -> Result<(), BuildError> {
    let listing = tokio::fs::read_to_string(source)
      .await
      .map_err(BuildError::io(source))?;
    let unit = assemble(&listing).map_err(BuildError::Rejected)?;
    let bytes = unit.to_json().map_err(BuildError::Rejected)?;
    tokio::fs::write(artifact, bytes)
      .await
      .map_err(BuildError::io(artifact))
  }
}

// ─── External command ────────────────────────────────────────────────────────

/// Runs an external program, e.g. `tempora build-unit {source} {artifact}`.
#[derive(Debug, Clone)]
pub struct CommandCompiler {
  program: String,
  args:    Vec<String>,
}

impl CommandCompiler {
  pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
    Self {
      program: program.into(),
      args,
    }
  }

  fn expand(&self, source: &Path, artifact: &Path) -> Vec<String> {
    let source = source.to_string_lossy();
    let artifact = artifact.to_string_lossy();
    self
      .args
      .iter()
      .map(|a| a.replace("{source}", &source).replace("{artifact}", &artifact))
      .collect()
  }
}

impl Compiler for CommandCompiler {
  async fn compile(&self, source: &Path, artifact: &Path) -> Result<(), BuildError> {
    let args = self.expand(source, artifact);
    tracing::debug!(program = %self.program, ?args, "running toolchain");
    let output = Command::new(&self.program)
      .args(&args)
      .kill_on_drop(true)
      .output()
      .await
      .map_err(BuildError::io(&self.program))?;

    if !output.status.success() {
      return Err(BuildError::ToolchainFailure {
        status: output.status.code(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
      });
    }
    Ok(())
  }
}

// ─── Configured ──────────────────────────────────────────────────────────────

/// The compiler selected by [`Toolchain`].
#[derive(Debug, Clone)]
pub enum ConfiguredCompiler {
  InProcess(InProcessCompiler),
  Command(CommandCompiler),
}

impl From<&Toolchain> for ConfiguredCompiler {
  fn from(toolchain: &Toolchain) -> Self {
    match toolchain {
      Toolchain::InProcess => Self::InProcess(InProcessCompiler),
      Toolchain::Command { program, args } => {
        Self::Command(CommandCompiler::new(program, args.clone()))
      }
    }
  }
}

impl Compiler for ConfiguredCompiler {
  async fn compile(&self, source: &Path, artifact: &Path) -> Result<(), BuildError> {
    match self {
      Self::InProcess(c) => c.compile(source, artifact).await,
      Self::Command(c) => c.compile(source, artifact).await,
    }
  }
}
