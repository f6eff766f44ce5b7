//! Query fingerprints.
//!
//! A fingerprint is the SHA-256 of the exact query text, hex encoded. It
//! depends on nothing but the text, so a cached unit stays valid across
//! process restarts.

use std::fmt;

use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
  pub fn of(query_text: &str) -> Self {
    Self(hex::encode(Sha256::digest(query_text.as_bytes())))
  }

  pub fn as_str(&self) -> &str { &self.0 }

  /// Logical artifact name, `query_<hex>`.
  pub fn artifact_name(&self) -> String { format!("query_{}", self.0) }
}

impl fmt::Display for Fingerprint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}
