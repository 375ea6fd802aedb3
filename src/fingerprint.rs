//! Per-line content fingerprints.
//!
//! A fingerprint ignores whitespace so that reindented lines still match across
//! versions. Blank lines fingerprint to the empty string.

use blake3::Hasher;
use once_cell::sync::Lazy;
use serde::{Serialize, Serializer};
use std::sync::Arc;

static EMPTY: Lazy<LineFingerprintSequence> = Lazy::new(|| LineFingerprintSequence {
    hashes: Arc::from(Vec::<String>::new()),
});

pub fn line_fingerprint(line: &str) -> String {
    let mut hasher = Hasher::new();
    let mut saw_content = false;
    let mut buf = [0u8; 4];
    for ch in line.chars().filter(|ch| !ch.is_whitespace()) {
        saw_content = true;
        hasher.update(ch.encode_utf8(&mut buf).as_bytes());
    }
    if !saw_content {
        return String::new();
    }
    hasher.finalize().to_hex().to_string()
}

/// Ordered fingerprints of one unit version; line `n` lives at index `n - 1`.
///
/// Immutable once built. Clones share storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineFingerprintSequence {
    hashes: Arc<[String]>,
}

impl LineFingerprintSequence {
    pub fn new(hashes: Vec<String>) -> Self {
        if hashes.is_empty() {
            return Self::empty();
        }
        Self {
            hashes: Arc::from(hashes),
        }
    }

    /// The shared zero-length sequence standing for "no reference content".
    pub fn empty() -> Self {
        EMPTY.clone()
    }

    pub fn from_source(source: &str) -> Self {
        Self::new(source.lines().map(line_fingerprint).collect())
    }

    /// True when this value is the shared empty instance, not merely zero-length.
    pub fn is_canonical_empty(&self) -> bool {
        Arc::ptr_eq(&self.hashes, &EMPTY.hashes)
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    pub fn has_line(&self, line: usize) -> bool {
        line >= 1 && line <= self.hashes.len()
    }

    /// Fingerprint of a 1-based line.
    pub fn hash_for_line(&self, line: usize) -> Option<&str> {
        if !self.has_line(line) {
            return None;
        }
        Some(self.hashes[line - 1].as_str())
    }

    /// All 1-based lines carrying `hash`, ascending.
    pub fn lines_for_hash(&self, hash: &str) -> Vec<usize> {
        self.hashes
            .iter()
            .enumerate()
            .filter(|(_, candidate)| candidate.as_str() == hash)
            .map(|(idx, _)| idx + 1)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.hashes.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.hashes
    }

    /// Newline-joined form used by the `file_sources` table.
    pub fn to_stored(&self) -> String {
        self.hashes.join("\n")
    }
}

impl Serialize for LineFingerprintSequence {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.hashes.iter())
    }
}

impl Default for LineFingerprintSequence {
    fn default() -> Self {
        Self::empty()
    }
}
