//! Schema and query compilation and invocation.
//!
//! ```text
//!   schema text ── compile_schema ──► DefinitionHandle ── open_database ──► Database
//!   query text  ── compile_query  ──► ArtifactRef ─────── run_query ──────► QueryOutput
//! ```

use std::{path::PathBuf, sync::Arc};

use tempora_codegen::{
  QueryOutput, definition_source,
  program::{GET_SIZE, MAKE_DATABASE, QUERY},
  query_source,
};
use tempora_core::schema::Schema;
use tempora_storage::{Clock, Database, SystemClock};

use crate::{
  cache::{BuildCache, BuildStatus},
  compiler::{Compiler, ConfiguredCompiler},
  config::PipelineConfig,
  error::{LoadError, QueryError, Result, RunError, SchemaError},
  fingerprint::Fingerprint,
  loader::{ExecutionUnit, Loader},
};

/// A built storage definition.
#[derive(Debug, Clone)]
pub struct DefinitionHandle {
  pub artifact: PathBuf,
  pub schema:   Arc<Schema>,
  pub status:   BuildStatus,
}

/// A built (or cached) query unit.
#[derive(Debug, Clone)]
pub struct ArtifactRef {
  pub fingerprint: Fingerprint,
  pub name:        String,
  pub artifact:    PathBuf,
  pub status:      BuildStatus,
}

pub struct Pipeline<C = ConfiguredCompiler> {
  config: PipelineConfig,
  cache:  BuildCache<C>,
  loader: Loader,
  clock:  Arc<dyn Clock>,
}

impl Pipeline {
  /// A pipeline using the configured toolchain and the system clock.
  pub fn new(config: PipelineConfig) -> Self {
    let compiler = ConfiguredCompiler::from(&config.toolchain);
    Self::with_compiler(config, compiler, Arc::new(SystemClock))
  }
}

impl<C: Compiler> Pipeline<C> {
  pub fn with_compiler(config: PipelineConfig, compiler: C, clock: Arc<dyn Clock>) -> Self {
    Self {
      loader: Loader::new(config.keep_units_open),
      cache: BuildCache::new(config.clone(), compiler),
      config,
      clock,
    }
  }

  pub fn config(&self) -> &PipelineConfig { &self.config }

  pub fn cache(&self) -> &BuildCache<C> { &self.cache }

  pub fn loader(&self) -> &Loader { &self.loader }

  // ── Schema ──────────────────────────────────────────────────────────────

  /// Parse `schema_text` and build its storage definition.
  ///
  /// The definition is rebuilt on every call. Nothing is written when the
  /// text does not parse.
  pub async fn compile_schema(&self, schema_text: &str) -> Result<DefinitionHandle, SchemaError> {
    let schema = tempora_sql::parse_schema(schema_text).map_err(|e| SchemaError::ParseFailure {
      line:    e.line(),
      message: e.message(),
    })?;
    let source = definition_source(&schema);

    let name = &self.config.definition_name;
    let status = self
      .cache
      .build(&source.text, name)
      .await
      .map_err(SchemaError::CompileFailure)?;
    let artifact = self.cache.artifact_path(name);
    self.loader.invalidate(&artifact);

    Ok(DefinitionHandle {
      artifact,
      schema: Arc::new(schema),
      status,
    })
  }

  /// Build a database from the definition, loading table files from the
  /// configured table directory.
  pub async fn open_database(&self, definition: &DefinitionHandle) -> Result<Database, RunError> {
    let unit = self
      .loader
      .load(&definition.artifact, &[MAKE_DATABASE, GET_SIZE])
      .await?;
    let result = unit.make_database(&self.config.table_dir, self.clock.clone());
    finish(unit, result)
  }

  /// Stored row versions of `table`, through the definition's `get_size`.
  pub async fn get_size(
    &self,
    definition: &DefinitionHandle,
    db: &Database,
    table: &str,
  ) -> Result<usize, RunError> {
    let unit = self.loader.load(&definition.artifact, &[GET_SIZE]).await?;
    let result = unit.get_size(db, table);
    finish(unit, result)
  }

  // ── Queries ─────────────────────────────────────────────────────────────

  /// Build the unit for `query_text`, or return the cached one.
  ///
  /// The cache is keyed by the fingerprint of the exact text; on a hit the
  /// text is not even parsed.
  pub async fn compile_query(
    &self,
    query_text: &str,
    definition: &DefinitionHandle,
  ) -> Result<ArtifactRef, QueryError> {
    let fingerprint = Fingerprint::of(query_text);
    let name = fingerprint.artifact_name();

    if let Some(artifact) = self.cache.lookup(&name).await {
      tracing::debug!(%fingerprint, "query unit cached");
      return Ok(ArtifactRef {
        fingerprint,
        name,
        artifact,
        status: BuildStatus::Cached,
      });
    }

    let query = tempora_sql::parse_query(query_text).map_err(|e| QueryError::ParseFailure {
      line:    e.line(),
      message: e.message(),
    })?;
    let source = query_source(&query, &definition.schema).map_err(QueryError::Plan)?;

    let status = self
      .cache
      .build(&source.text, &name)
      .await
      .map_err(QueryError::CompileFailure)?;
    let artifact = self.cache.artifact_path(&name);
    if !status.is_cached() {
      self.loader.invalidate(&artifact);
    }

    Ok(ArtifactRef {
      fingerprint,
      name,
      artifact,
      status,
    })
  }

  /// Invoke a query unit. A unit that cannot be loaded is rebuilt once from
  /// its stored source before the failure is reported.
  pub async fn run_query(
    &self,
    artifact: &ArtifactRef,
    db: &mut Database,
    params: &[String],
    explain: bool,
  ) -> Result<QueryOutput, RunError> {
    let unit = match self.loader.load(&artifact.artifact, &[QUERY]).await {
      Ok(unit) => unit,
      Err(e) if e.is_corrupt_artifact() => {
        tracing::warn!(unit = %artifact.name, error = %e, "evicting unloadable unit and rebuilding");
        self.loader.invalidate(&artifact.artifact);
        self.cache.evict(&artifact.name).await?;
        self.cache.rebuild(&artifact.name).await?;
        self.loader.load(&artifact.artifact, &[QUERY]).await?
      }
      Err(e) => return Err(e.into()),
    };
    let result = unit.invoke_query(db, params, explain);
    finish(unit, result)
  }

  /// Compile and run `query_text` in one step.
  pub async fn execute(
    &self,
    query_text: &str,
    definition: &DefinitionHandle,
    db: &mut Database,
    params: &[String],
    explain: bool,
  ) -> Result<QueryOutput> {
    let artifact = self.compile_query(query_text, definition).await?;
    Ok(self.run_query(&artifact, db, params, explain).await?)
  }

  /// Release every unit still held open.
  pub fn shutdown(&self) -> Result<(), LoadError> { self.loader.shutdown() }
}

/// Unload `unit` whatever the invocation returned. An invocation error wins
/// over an unload error.
fn finish<T>(unit: ExecutionUnit, result: Result<T, RunError>) -> Result<T, RunError> {
  let unloaded = unit.unload();
  let value = result?;
  unloaded?;
  Ok(value)
}
