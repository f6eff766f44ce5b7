//! tempora driver binary.
//!
//! Reads `tempora.toml` (or the path given with `--config`) layered under
//! `TEMPORA_*` environment variables, compiles a schema and runs one query
//! against a database populated from the table directory.
//!
//! ```text
//! tempora query --schema schema.sql "UPDATE warehouse SET w_city = ? WHERE w_id = ?" Lyon 1
//! ```
//!
//! `build-unit` assembles a listing into a unit and is what a `command`
//! toolchain points at:
//!
//! ```toml
//! [toolchain]
//! kind    = "command"
//! program = "tempora"
//! args    = ["build-unit", "{source}", "{artifact}"]
//! ```

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tempora_codegen::QueryOutput;
use tempora_jit::{Compiler, InProcessCompiler, Pipeline, PipelineConfig};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Bitemporal query compiler and runner")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "tempora.toml", global = true)]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Compile a schema and run one query against it.
  Query {
    /// File holding the CREATE TABLE statements.
    #[arg(long)]
    schema:    PathBuf,
    /// Print the compiled routine instead of running it.
    #[arg(long)]
    explain:   bool,
    /// Overrides `work_dir` from the configuration.
    #[arg(long)]
    work_dir:  Option<PathBuf>,
    /// Overrides `table_dir` from the configuration.
    #[arg(long)]
    table_dir: Option<PathBuf>,
    sql:       String,
    params:    Vec<String>,
  },
  /// Assemble a listing into a unit.
  BuildUnit { source: PathBuf, artifact: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  match cli.command {
    Command::BuildUnit { source, artifact } => InProcessCompiler
      .compile(&source, &artifact)
      .await
      .with_context(|| format!("failed to build {}", source.display())),
    Command::Query {
      schema,
      explain,
      work_dir,
      table_dir,
      sql,
      params,
    } => {
      let mut config = load_config(cli.config)?;
      if let Some(dir) = work_dir {
        config.work_dir = dir;
      }
      if let Some(dir) = table_dir {
        config.table_dir = dir;
      }
      run_query(config, schema, explain, &sql, &params).await
    }
  }
}

fn load_config(path: PathBuf) -> anyhow::Result<PipelineConfig> {
  config::Config::builder()
    .add_source(config::File::from(path).required(false))
    .add_source(config::Environment::with_prefix("TEMPORA"))
    .build()
    .context("failed to read config file")?
    .try_deserialize()
    .context("failed to deserialise PipelineConfig")
}

async fn run_query(
  config: PipelineConfig,
  schema: PathBuf,
  explain: bool,
  sql: &str,
  params: &[String],
) -> anyhow::Result<()> {
  let schema_text = tokio::fs::read_to_string(&schema)
    .await
    .with_context(|| format!("failed to read schema {}", schema.display()))?;

  let pipeline = Pipeline::new(config);
  let output = run_and_release(&pipeline, &schema_text, sql, params, explain).await?;
  print!("{output}");
  Ok(())
}

/// Run one query, then release every unit the pipeline still holds whether
/// or not the run succeeded. A run error is reported ahead of a release error.
async fn run_and_release<C: Compiler>(
  pipeline: &Pipeline<C>,
  schema_text: &str,
  sql: &str,
  params: &[String],
  explain: bool,
) -> anyhow::Result<QueryOutput> {
  let result = run(pipeline, schema_text, sql, params, explain).await;
  let released = pipeline.shutdown();
  match (result, released) {
    (Ok(output), released) => {
      released.context("failed to release units")?;
      Ok(output)
    }
    (Err(e), Ok(())) => Err(e),
    (Err(e), Err(release)) => {
      tracing::warn!(error = %release, "failed to release units");
      Err(e)
    }
  }
}

async fn run<C: Compiler>(
  pipeline: &Pipeline<C>,
  schema_text: &str,
  sql: &str,
  params: &[String],
  explain: bool,
) -> anyhow::Result<QueryOutput> {
  let definition = pipeline
    .compile_schema(schema_text)
    .await
    .context("failed to compile schema")?;
  let mut db = pipeline
    .open_database(&definition)
    .await
    .context("failed to open database")?;

  let artifact = pipeline
    .compile_query(sql, &definition)
    .await
    .context("failed to compile query")?;
  tracing::debug!(unit = %artifact.name, status = ?artifact.status, "query unit ready");

  pipeline
    .run_query(&artifact, &mut db, params, explain)
    .await
    .context("query failed")
}
