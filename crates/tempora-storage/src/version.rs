//! Row versions and version chains.
//!
//! A chain is the full history of one row identity. Versions are appended,
//! never removed; the only in-place change is closing the current version.

use chrono::{DateTime, Utc};
use tempora_core::types::Row;

// ─── Valid time ──────────────────────────────────────────────────────────────

/// The half-open interval `[from, to)` during which a version is current.
/// `to == None` means the version is still current.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidTime {
  pub from: DateTime<Utc>,
  pub to:   Option<DateTime<Utc>>,
}

impl ValidTime {
  pub fn open(from: DateTime<Utc>) -> Self { Self { from, to: None } }

  pub fn is_open(&self) -> bool { self.to.is_none() }

  pub fn contains(&self, at: DateTime<Utc>) -> bool {
    self.from <= at && self.to.is_none_or(|to| at < to)
  }
}

/// One historical (or current) state of a row.
#[derive(Debug, Clone, PartialEq)]
pub struct RowVersion {
  pub row:   Row,
  pub valid: ValidTime,
}

// ─── Chain ───────────────────────────────────────────────────────────────────

/// Ordered versions of one identity. At most the last version is open, and
/// each version starts no earlier than its predecessor ended.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionChain {
  versions: Vec<RowVersion>,
}

impl VersionChain {
  pub(crate) fn new(row: Row, at: DateTime<Utc>) -> Self {
    Self {
      versions: vec![RowVersion {
        row,
        valid: ValidTime::open(at),
      }],
    }
  }

  pub fn versions(&self) -> &[RowVersion] { &self.versions }

  pub fn len(&self) -> usize { self.versions.len() }

  pub fn is_empty(&self) -> bool { self.versions.is_empty() }

  /// The open version, if the identity is not historical-only.
  pub fn current(&self) -> Option<&RowVersion> {
    self.versions.last().filter(|v| v.valid.is_open())
  }

  /// The version whose valid-time interval contains `at`.
  pub fn as_of(&self, at: DateTime<Utc>) -> Option<&RowVersion> {
    self.versions.iter().rev().find(|v| v.valid.contains(at))
  }

  /// The latest instant recorded in the chain; no later transition may
  /// precede it.
  fn last_boundary(&self) -> Option<DateTime<Utc>> {
    self.versions.last().map(|v| v.valid.to.unwrap_or(v.valid.from))
  }

  fn clamp(&self, at: DateTime<Utc>) -> DateTime<Utc> {
    self.last_boundary().map_or(at, |b| at.max(b))
  }

  /// Close the current version at `at` (clamped). Returns the instant used,
  /// or `None` when there is no current version.
  pub(crate) fn close(&mut self, at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let at = self.clamp(at);
    let current = self.versions.last_mut().filter(|v| v.valid.is_open())?;
    current.valid.to = Some(at);
    Some(at)
  }

  /// Append a new current version. The caller must have closed the previous
  /// one.
  pub(crate) fn open(&mut self, row: Row, at: DateTime<Utc>) {
    debug_assert!(self.current().is_none());
    let at = self.clamp(at);
    self.versions.push(RowVersion {
      row,
      valid: ValidTime::open(at),
    });
  }

  /// Close the current version and open its successor at the same instant.
  pub(crate) fn supersede(&mut self, row: Row, at: DateTime<Utc>) -> bool {
    match self.close(at) {
      Some(closed_at) => {
        self.open(row, closed_at);
        true
      }
      None => false,
    }
  }
}
