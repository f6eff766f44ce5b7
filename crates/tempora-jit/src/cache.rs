//! Content-addressed build cache.
//!
//! Each artifact name owns `<work_dir>/<name>.src` and `<work_dir>/<name>.unit`.
//! Both are published by writing a uniquely named temporary file and renaming
//! it into place, so a reader sees either nothing or a complete file. Builds
//! of the same name are serialised; builds of different names run freely.

use std::{
  collections::HashMap,
  path::{Path, PathBuf},
  sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  },
  time::{Duration, Instant},
};

use parking_lot::Mutex;
use tokio::fs;
use uuid::Uuid;

use crate::{compiler::Compiler, config::PipelineConfig, error::BuildError};

/// Outcome of a successful [`BuildCache::build`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStatus {
  /// A published artifact already existed; the toolchain did not run.
  Cached,
  /// The toolchain ran for `elapsed`.
  Compiled { elapsed: Duration },
}

impl BuildStatus {
  pub fn is_cached(&self) -> bool { matches!(self, Self::Cached) }
}

pub struct BuildCache<C> {
  config:   PipelineConfig,
  compiler: C,
  locks:    Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
  builds:   AtomicUsize,
}

impl<C: Compiler> BuildCache<C> {
  pub fn new(config: PipelineConfig, compiler: C) -> Self {
    Self {
      config,
      compiler,
      locks: Mutex::new(HashMap::new()),
      builds: AtomicUsize::new(0),
    }
  }

  /// Number of toolchain invocations so far, failed ones included.
  pub fn builds(&self) -> usize { self.builds.load(Ordering::SeqCst) }

  pub fn source_path(&self, name: &str) -> PathBuf { self.config.source_path(name) }

  pub fn artifact_path(&self, name: &str) -> PathBuf { self.config.artifact_path(name) }

  fn always_rebuilds(&self, name: &str) -> bool { name == self.config.definition_name }

  /// The published artifact for `name`, if any.
  pub async fn lookup(&self, name: &str) -> Option<PathBuf> {
    let path = self.artifact_path(name);
    match fs::try_exists(&path).await {
      Ok(true) => Some(path),
      _ => None,
    }
  }

  /// Publish `source` under `name` and build it, unless an artifact is
  /// already published and `name` is not the definition.
  pub async fn build(&self, source: &str, name: &str) -> Result<BuildStatus, BuildError> {
    self.build_with(Some(source), name, false).await
  }

  /// Discard the artifact for `name` and build it again from its stored
  /// source.
  pub async fn rebuild(&self, name: &str) -> Result<BuildStatus, BuildError> {
    self.build_with(None, name, true).await
  }

  async fn build_with(
    &self,
    source: Option<&str>,
    name: &str,
    force: bool,
  ) -> Result<BuildStatus, BuildError> {
    let lock = self.lock_for(name);
    let _guard = lock.lock().await;

    let artifact = self.artifact_path(name);
    if !force && !self.always_rebuilds(name) && self.lookup(name).await.is_some() {
      tracing::debug!(artifact = name, "build cache hit");
      return Ok(BuildStatus::Cached);
    }

    let work_dir = &self.config.work_dir;
    fs::create_dir_all(work_dir)
      .await
      .map_err(BuildError::io(work_dir))?;

    let source_path = self.source_path(name);
    if let Some(source) = source {
      publish(&source_path, source.as_bytes()).await?;
    }

    let tmp = temp_path(work_dir, name);
    self.builds.fetch_add(1, Ordering::SeqCst);
    let started = Instant::now();
    let result = self.compiler.compile(&source_path, &tmp).await;
    let elapsed = started.elapsed();

    let published = match result {
      Ok(()) => fs::rename(&tmp, &artifact)
        .await
        .map_err(BuildError::io(&artifact)),
      Err(e) => Err(e),
    };
    if let Err(e) = published {
      let _ = fs::remove_file(&tmp).await;
      // The stored source no longer matches whatever was published before.
      let _ = fs::remove_file(&artifact).await;
      tracing::warn!(artifact = name, error = %e, "build failed");
      return Err(e);
    }

    tracing::info!(artifact = name, ?elapsed, "built unit");
    Ok(BuildStatus::Compiled { elapsed })
  }

  /// Remove the published artifact for `name`. The source is kept.
  pub async fn evict(&self, name: &str) -> Result<(), BuildError> {
    let lock = self.lock_for(name);
    let _guard = lock.lock().await;
    let artifact = self.artifact_path(name);
    match fs::remove_file(&artifact).await {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(BuildError::io(artifact)(e)),
    }
  }

  fn lock_for(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
    self
      .locks
      .lock()
      .entry(name.to_owned())
      .or_default()
      .clone()
  }
}

fn temp_path(dir: &Path, name: &str) -> PathBuf {
  dir.join(format!(".{name}.{}.tmp", Uuid::new_v4()))
}

/// Write `bytes` to `path` via a temporary file and an atomic rename.
async fn publish(path: &Path, bytes: &[u8]) -> Result<(), BuildError> {
  let dir = path.parent().unwrap_or(Path::new("."));
  let name = path
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_default();
  let tmp = temp_path(dir, &name);
  if let Err(e) = fs::write(&tmp, bytes).await {
    let _ = fs::remove_file(&tmp).await;
    return Err(BuildError::io(&tmp)(e));
  }
  fs::rename(&tmp, path).await.map_err(BuildError::io(path))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::compiler::InProcessCompiler;

  const LISTING: &str = "unit query\nexport query\nparams 0\ntable \"t\"\ndelete\nend\n";

  fn cache(dir: &Path) -> BuildCache<InProcessCompiler> {
    BuildCache::new(PipelineConfig::in_dir(dir), InProcessCompiler)
  }

  #[tokio::test]
  async fn second_build_is_a_cache_hit() {
    let dir = tempfile::TempDir::new().unwrap();
    let cache = cache(dir.path());

    let first = cache.build(LISTING, "query_a").await.unwrap();
    assert!(matches!(first, BuildStatus::Compiled { .. }));
    let second = cache.build(LISTING, "query_a").await.unwrap();
    assert_eq!(second, BuildStatus::Cached);
    assert_eq!(cache.builds(), 1);
    assert!(cache.lookup("query_a").await.is_some());
  }

  #[tokio::test]
  async fn definition_is_always_rebuilt() {
    let dir = tempfile::TempDir::new().unwrap();
    let cache = cache(dir.path());
    let listing = "unit definition\nexport make_database\n";

    cache.build(listing, "db").await.unwrap();
    let again = cache.build(listing, "db").await.unwrap();
    assert!(!again.is_cached());
    assert_eq!(cache.builds(), 2);
  }

  #[tokio::test]
  async fn failed_build_leaves_nothing_behind() {
    let dir = tempfile::TempDir::new().unwrap();
    let cache = cache(dir.path());

    let err = cache.build("unit query\nparams x\n", "query_bad").await.unwrap_err();
    assert!(matches!(err, BuildError::Rejected(_)));
    assert!(cache.lookup("query_bad").await.is_none());

    let mut entries = fs::read_dir(dir.path()).await.unwrap();
    while let Some(entry) = entries.next_entry().await.unwrap() {
      let name = entry.file_name().to_string_lossy().into_owned();
      assert!(!name.ends_with(".tmp"), "left {name}");
      assert!(!name.ends_with(".unit"), "left {name}");
    }
  }

  #[tokio::test]
  async fn rebuild_uses_stored_source() {
    let dir = tempfile::TempDir::new().unwrap();
    let cache = cache(dir.path());
    cache.build(LISTING, "query_a").await.unwrap();

    cache.evict("query_a").await.unwrap();
    assert!(cache.lookup("query_a").await.is_none());
    let status = cache.rebuild("query_a").await.unwrap();
    assert!(!status.is_cached());
    assert!(cache.lookup("query_a").await.is_some());
    assert_eq!(cache.builds(), 2);
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn concurrent_builds_of_one_name_compile_once() {
    let dir = tempfile::TempDir::new().unwrap();
    let cache = Arc::new(cache(dir.path()));

    let tasks: Vec<_> = (0..8)
      .map(|_| {
        let cache = cache.clone();
        tokio::spawn(async move { cache.build(LISTING, "query_same").await })
      })
      .collect();
    let mut compiled = 0;
    for task in tasks {
      if !task.await.unwrap().unwrap().is_cached() {
        compiled += 1;
      }
    }
    assert_eq!(compiled, 1);
    assert_eq!(cache.builds(), 1);
  }
}
