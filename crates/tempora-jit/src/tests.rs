//! End-to-end pipeline tests: compile, cache, load, run.

use std::{path::Path, sync::Arc};

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use tempora_codegen::QueryOutput;
use tempora_core::types::Value;
use tempora_storage::{Database, ManualClock};
use tempfile::TempDir;

use crate::{
  BuildError, BuildStatus, Compiler, DefinitionHandle, InProcessCompiler, LoadError,
  Pipeline, PipelineConfig, QueryError, RunError, SchemaError,
};

const SCHEMA: &str = "
CREATE TABLE warehouse (
  w_id   integer NOT NULL,
  w_city varchar(20),
  PRIMARY KEY (w_id)
) WITH SYSTEM VERSIONING;
CREATE TABLE warehouseold (
  w_id   integer PRIMARY KEY,
  w_city varchar(20)
);
";

const INSERT: &str = "INSERT INTO warehouse (w_id, w_city) VALUES (?,?)";
const UPDATE: &str = "UPDATE warehouse SET w_city=? WHERE w_id=?";

fn t(secs: i64) -> DateTime<Utc> {
  Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap() + TimeDelta::seconds(secs)
}

fn params(values: &[&str]) -> Vec<String> { values.iter().map(|v| v.to_string()).collect() }

fn config(dir: &Path, keep_units_open: bool) -> PipelineConfig {
  PipelineConfig {
    work_dir: dir.join("tmp"),
    table_dir: dir.join("tbl"),
    keep_units_open,
    ..PipelineConfig::default()
  }
}

struct Harness<C: Compiler> {
  dir:        TempDir,
  pipeline:   Pipeline<C>,
  clock:      Arc<ManualClock>,
  definition: DefinitionHandle,
  db:         Database,
}

async fn harness_with<C: Compiler>(compiler: C, keep_units_open: bool) -> Harness<C> {
  let dir = TempDir::new().unwrap();
  let clock = Arc::new(ManualClock::new(t(0)));
  let pipeline = Pipeline::with_compiler(
    config(dir.path(), keep_units_open),
    compiler,
    clock.clone(),
  );
  let definition = pipeline.compile_schema(SCHEMA).await.unwrap();
  let db = pipeline.open_database(&definition).await.unwrap();
  Harness {
    dir,
    pipeline,
    clock,
    definition,
    db,
  }
}

async fn harness() -> Harness<InProcessCompiler> { harness_with(InProcessCompiler, false).await }

impl<C: Compiler> Harness<C> {
  async fn exec(&mut self, sql: &str, values: &[&str]) -> QueryOutput {
    self
      .pipeline
      .execute(sql, &self.definition, &mut self.db, &params(values), false)
      .await
      .unwrap()
  }
}

// ─── Caching ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn identical_text_compiles_once() {
  let h = harness().await;
  let before = h.pipeline.cache().builds();

  let first = h.pipeline.compile_query(UPDATE, &h.definition).await.unwrap();
  assert!(matches!(first.status, BuildStatus::Compiled { .. }));
  let after_first = h.pipeline.cache().builds();
  assert_eq!(after_first - before, 1);

  let second = h.pipeline.compile_query(UPDATE, &h.definition).await.unwrap();
  assert_eq!(second.status, BuildStatus::Cached);
  assert_eq!(second.fingerprint, first.fingerprint);
  assert_eq!(second.artifact, first.artifact);
  assert_eq!(h.pipeline.cache().builds() - after_first, 0);
}

#[tokio::test]
async fn cache_survives_a_new_pipeline() {
  let h = harness().await;
  let first = h.pipeline.compile_query(UPDATE, &h.definition).await.unwrap();

  let restarted = Pipeline::with_compiler(
    config(h.dir.path(), false),
    InProcessCompiler,
    h.clock.clone(),
  );
  let again = restarted.compile_query(UPDATE, &h.definition).await.unwrap();
  assert_eq!(again.status, BuildStatus::Cached);
  assert_eq!(again.artifact, first.artifact);
  assert_eq!(restarted.cache().builds(), 0);
}

#[tokio::test]
async fn one_character_yields_independent_artifact() {
  let h = harness().await;
  let a = h
    .pipeline
    .compile_query("SELECT * FROM warehouse WHERE w_id = 1", &h.definition)
    .await
    .unwrap();
  let b = h
    .pipeline
    .compile_query("SELECT * FROM warehouse WHERE w_id = 2", &h.definition)
    .await
    .unwrap();
  assert_ne!(a.fingerprint, b.fingerprint);
  assert_ne!(a.artifact, b.artifact);
  assert!(a.artifact.exists() && b.artifact.exists());
  assert!(a.name.starts_with("query_"));
}

#[tokio::test]
async fn definition_is_rebuilt_every_time() {
  let h = harness().await;
  let again = h.pipeline.compile_schema(SCHEMA).await.unwrap();
  assert!(!again.status.is_cached());
  assert_eq!(again.artifact, h.definition.artifact);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_distinct_queries_build_independently() {
  let h = harness().await;
  let pipeline = Arc::new(h.pipeline);
  let definition = Arc::new(h.definition);
  let before = pipeline.cache().builds();

  let tasks: Vec<_> = (0..6)
    .map(|i| {
      let pipeline = pipeline.clone();
      let definition = definition.clone();
      tokio::spawn(async move {
        let sql = format!("SELECT * FROM warehouse WHERE w_id = {}", i % 3);
        pipeline.compile_query(&sql, &definition).await
      })
    })
    .collect();
  for task in tasks {
    task.await.unwrap().unwrap();
  }
  assert_eq!(pipeline.cache().builds() - before, 3);
}

// ─── End to end ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn insert_then_update_versions_the_row() {
  let mut h = harness().await;

  let out = h.exec(INSERT, &["1", "Paris"]).await;
  assert_eq!(out, QueryOutput::Affected(1));
  let table = h.db.table("warehouse").unwrap();
  assert_eq!(
    table.get(&[Value::Integer(1)], None),
    Some(&vec![Value::Integer(1), Value::Text("Paris".into())])
  );

  h.clock.advance(TimeDelta::seconds(30));
  let out = h.exec(UPDATE, &["Lyon", "1"]).await;
  assert_eq!(out, QueryOutput::Affected(1));

  let history = h
    .db
    .table("warehouse")
    .unwrap()
    .history(&[Value::Integer(1)])
    .unwrap();
  assert_eq!(history.len(), 2);
  assert_eq!(history[0].valid.to, Some(t(30)));
  assert_eq!(history[1].row[1], Value::Text("Lyon".into()));
  assert!(history[1].valid.is_open());

  let size = h
    .pipeline
    .get_size(&h.definition, &h.db, "warehouse")
    .await
    .unwrap();
  assert_eq!(size, 2);
}

#[tokio::test]
async fn temporal_and_conventional_twins_diverge_in_size() {
  let mut h = harness().await;
  for table in ["warehouse", "warehouseold"] {
    h.exec(&format!("INSERT INTO {table} VALUES (?, ?)"), &["1", "a"]).await;
    for city in ["b", "c", "d"] {
      h.clock.advance(TimeDelta::seconds(1));
      h.exec(&format!("UPDATE {table} SET w_city = ? WHERE w_id = ?"), &[city, "1"])
        .await;
    }
  }
  let temporal = h.pipeline.get_size(&h.definition, &h.db, "warehouse").await;
  let plain = h.pipeline.get_size(&h.definition, &h.db, "warehouseold").await;
  assert_eq!(temporal.unwrap(), 4);
  assert_eq!(plain.unwrap(), 1);
}

#[tokio::test]
async fn update_of_absent_row_is_a_no_op() {
  let mut h = harness().await;
  assert_eq!(h.exec(UPDATE, &["Lyon", "42"]).await, QueryOutput::Affected(0));
  assert_eq!(
    h.exec("DELETE FROM warehouse WHERE w_id = ?", &["42"]).await,
    QueryOutput::Affected(0)
  );
}

#[tokio::test]
async fn explain_does_not_execute() {
  let mut h = harness().await;
  let out = h.exec(&format!("EXPLAIN {INSERT}"), &["1", "Paris"]).await;
  let QueryOutput::Explained(text) = out else {
    panic!("expected explain output, got {out:?}");
  };
  assert!(text.contains("insert\n"));
  assert!(h.db.table("warehouse").unwrap().is_empty());

  let artifact = h.pipeline.compile_query(INSERT, &h.definition).await.unwrap();
  let out = h
    .pipeline
    .run_query(&artifact, &mut h.db, &[], true)
    .await
    .unwrap();
  assert!(matches!(out, QueryOutput::Explained(_)));
}

#[tokio::test]
async fn open_database_loads_table_files() {
  let dir = TempDir::new().unwrap();
  let cfg = config(dir.path(), false);
  std::fs::create_dir_all(&cfg.table_dir).unwrap();
  std::fs::write(cfg.table_dir.join("warehouseold.tbl"), "1|Paris\n2|Lyon\n").unwrap();

  let pipeline = Pipeline::with_compiler(cfg, InProcessCompiler, Arc::new(ManualClock::new(t(0))));
  let definition = pipeline.compile_schema(SCHEMA).await.unwrap();
  let mut db = pipeline.open_database(&definition).await.unwrap();

  let out = pipeline
    .execute("SELECT w_city FROM warehouseold", &definition, &mut db, &[], false)
    .await
    .unwrap();
  assert_eq!(out.to_string(), "w_city\nParis\nLyon\n");
}

// ─── Failures ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn schema_parse_failure_reports_line() {
  let dir = TempDir::new().unwrap();
  let pipeline = Pipeline::new(config(dir.path(), false));
  let err = pipeline
    .compile_schema("CREATE TABLE t (\n  a integer PRIMARY KEY,\n  b blob\n);")
    .await
    .unwrap_err();
  assert!(matches!(err, SchemaError::ParseFailure { line: 3, .. }));
  assert!(!pipeline.config().artifact_path("db").exists());
}

#[tokio::test]
async fn query_errors_leave_no_artifact() {
  let h = harness().await;

  let err = h
    .pipeline
    .compile_query("UPDATE warehouse SET\nw_city ? 1", &h.definition)
    .await
    .unwrap_err();
  assert!(matches!(err, QueryError::ParseFailure { line: 2, .. }));

  let sql = "UPDATE warehouse SET w_zip = ?";
  let err = h.pipeline.compile_query(sql, &h.definition).await.unwrap_err();
  assert!(matches!(err, QueryError::Plan(_)));
  let name = crate::Fingerprint::of(sql).artifact_name();
  assert!(h.pipeline.cache().lookup(&name).await.is_none());
  assert!(!h.pipeline.cache().source_path(&name).exists());
}

/// Builds definitions in process and refuses every query.
struct RejectQueries;

impl Compiler for RejectQueries {
  async fn compile(&self, source: &Path, artifact: &Path) -> Result<(), BuildError> {
    let is_query = source
      .file_name()
      .is_some_and(|n| n.to_string_lossy().starts_with("query_"));
    if is_query {
      return Err(BuildError::ToolchainFailure {
        status: Some(1),
        stderr: "refused".into(),
      });
    }
    InProcessCompiler.compile(source, artifact).await
  }
}

#[tokio::test]
async fn toolchain_failure_is_compile_failure() {
  let h = harness_with(RejectQueries, false).await;
  let err = h.pipeline.compile_query(INSERT, &h.definition).await.unwrap_err();
  assert!(matches!(
    err,
    QueryError::CompileFailure(BuildError::ToolchainFailure { status: Some(1), .. })
  ));
  let name = crate::Fingerprint::of(INSERT).artifact_name();
  assert!(h.pipeline.cache().lookup(&name).await.is_none());

  // A retry tries again rather than hitting a half-written cache entry.
  let before = h.pipeline.cache().builds();
  assert!(h.pipeline.compile_query(INSERT, &h.definition).await.is_err());
  assert_eq!(h.pipeline.cache().builds() - before, 1);
}

#[tokio::test]
async fn corrupt_artifact_is_rebuilt_once() {
  let mut h = harness().await;
  let artifact = h.pipeline.compile_query(INSERT, &h.definition).await.unwrap();
  tokio::fs::write(&artifact.artifact, b"not a unit").await.unwrap();

  let before = h.pipeline.cache().builds();
  let out = h
    .pipeline
    .run_query(&artifact, &mut h.db, &params(&["1", "Paris"]), false)
    .await
    .unwrap();
  assert_eq!(out, QueryOutput::Affected(1));
  assert_eq!(h.pipeline.cache().builds() - before, 1);
}

#[tokio::test]
async fn missing_symbol_is_rebuilt_and_then_reported() {
  let mut h = harness().await;
  let artifact = h.pipeline.compile_query(INSERT, &h.definition).await.unwrap();

  // A unit that lacks the query entry point.
  let stripped = tempora_codegen::assemble("unit query\nparams 0\ntable \"warehouse\"\ndelete\nend\n")
    .unwrap();
  tokio::fs::write(&artifact.artifact, stripped.to_json().unwrap())
    .await
    .unwrap();
  h.pipeline
    .run_query(&artifact, &mut h.db, &params(&["1", "Paris"]), false)
    .await
    .unwrap();

  // When the stored source itself lacks the entry point, rebuilding cannot
  // help and the load error surfaces.
  let source = h.pipeline.cache().source_path(&artifact.name);
  tokio::fs::write(&source, "unit query\nparams 0\ntable \"warehouse\"\ndelete\nend\n")
    .await
    .unwrap();
  tokio::fs::write(&artifact.artifact, stripped.to_json().unwrap())
    .await
    .unwrap();
  let err = h
    .pipeline
    .run_query(&artifact, &mut h.db, &params(&["2", "Lyon"]), false)
    .await
    .unwrap_err();
  assert!(matches!(err, RunError::Load(LoadError::SymbolMissing { .. })));
}

#[tokio::test]
async fn execution_errors_still_unload() {
  let mut h = harness_with(InProcessCompiler, true).await;
  h.exec(INSERT, &["1", "Paris"]).await;
  let err = h
    .pipeline
    .execute(INSERT, &h.definition, &mut h.db, &params(&["1", "Paris"]), false)
    .await
    .unwrap_err();
  assert!(matches!(err, crate::Error::Run(RunError::Exec(_))));

  // Every unit came back, so shutdown releases cleanly.
  assert!(h.pipeline.loader().open_units() > 0);
  h.pipeline.shutdown().unwrap();
  assert_eq!(h.pipeline.loader().open_units(), 0);
}
