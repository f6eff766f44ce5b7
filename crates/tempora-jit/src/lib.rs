//! The tempora compilation pipeline.
//!
//! Schema text becomes a storage definition unit and each distinct query text
//! becomes a query unit. Units are built once into a content-addressed cache
//! in the configured work directory, loaded through a fixed entry-point ABI
//! (`make_database`, `get_size`, `query`) and run against a
//! [`tempora_storage::Database`].
//!
//! ```no_run
//! # async fn demo() -> tempora_jit::Result<()> {
//! use tempora_jit::{Pipeline, PipelineConfig};
//!
//! let pipeline = Pipeline::new(PipelineConfig::default());
//! let definition = pipeline
//!   .compile_schema("CREATE TABLE warehouse (w_id integer PRIMARY KEY, w_city varchar(20)) WITH SYSTEM VERSIONING;")
//!   .await?;
//! let mut db = pipeline.open_database(&definition).await?;
//! let params = vec!["1".to_owned(), "Paris".to_owned()];
//! pipeline
//!   .execute("INSERT INTO warehouse VALUES (?, ?)", &definition, &mut db, &params, false)
//!   .await?;
//! pipeline.shutdown().map_err(tempora_jit::RunError::from)?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod compiler;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod loader;
pub mod pipeline;

pub use cache::{BuildCache, BuildStatus};
pub use compiler::{CommandCompiler, Compiler, ConfiguredCompiler, InProcessCompiler};
pub use config::{PipelineConfig, Toolchain};
pub use error::{BuildError, Error, LoadError, QueryError, Result, RunError, SchemaError};
pub use fingerprint::Fingerprint;
pub use loader::{ExecutionUnit, Loader};
pub use pipeline::{ArtifactRef, DefinitionHandle, Pipeline};

#[cfg(test)]
mod tests;
