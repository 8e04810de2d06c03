//! Hashing utilities for artifact verification and content manifests.
//!
//! Every checksum in airpack is a full, lowercase, 64-character SHA-256 hex
//! digest wrapped in [`ContentHash`].

use std::fs;
use std::io::{self, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Length of a hex-encoded SHA-256 digest.
pub const CHECKSUM_LEN: usize = 64;

/// A full 64-character SHA-256 hash for content verification.
///
/// # Format
///
/// The hash is a lowercase hexadecimal string (64 characters).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl ContentHash {
  /// The first 12 characters, for display and directory names.
  pub fn short(&self) -> &str {
    &self.0[..12.min(self.0.len())]
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Whether `s` looks like a lowercase hex SHA-256 digest.
pub fn is_valid_checksum(s: &str) -> bool {
  s.len() == CHECKSUM_LEN && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Hash a file's contents.
pub fn hash_file(path: &Path) -> io::Result<ContentHash> {
  let file = fs::File::open(path)?;
  let mut reader = HashingReader::new(file);
  io::copy(&mut reader, &mut io::sink())?;
  Ok(reader.finish().1)
}

/// Hash arbitrary bytes.
pub fn hash_bytes(data: &[u8]) -> ContentHash {
  let mut hasher = Sha256::new();
  hasher.update(data);
  ContentHash(hex::encode(hasher.finalize()))
}

/// A reader adapter that hashes and counts everything read through it.
///
/// Lets the packager stream a file into an archive and learn its size and
/// checksum in the same pass.
pub struct HashingReader<R> {
  inner: R,
  hasher: Sha256,
  bytes: u64,
}

impl<R: Read> HashingReader<R> {
  pub fn new(inner: R) -> Self {
    Self {
      inner,
      hasher: Sha256::new(),
      bytes: 0,
    }
  }

  /// Consume the reader, returning the byte count and digest of what was read.
  pub fn finish(self) -> (u64, ContentHash) {
    (self.bytes, ContentHash(hex::encode(self.hasher.finalize())))
  }
}

impl<R: Read> Read for HashingReader<R> {
  fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
    let n = self.inner.read(buf)?;
    self.hasher.update(&buf[..n]);
    self.bytes += n as u64;
    Ok(n)
  }
}
