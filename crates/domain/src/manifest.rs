//! Checksum manifest parsing
//!
//! Manifest lines have the form `<checksum>  <relative path>` (two spaces).
//! Entries are filtered down to image files and sorted by path; that order
//! is what assigns page numbers, so it must not depend on line order.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use thiserror::Error;

use crate::model::{ChecksumMap, ManifestEntry, ManifestSource};

/// Separator between checksum and path
const SEPARATOR: &str = "  ";

/// Default image marker for scanned pages
pub const DEFAULT_IMAGE_MARKER: &str = "tif";

/// Error type for manifest parsing
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ManifestError {
    #[error("Malformed manifest line {line_number}: {line:?}")]
    MalformedLine { line_number: usize, line: String },
    #[error("Duplicate path in {algorithm} manifest: {path}")]
    DuplicatePath { algorithm: String, path: String },
    #[error("Conflicting {algorithm} checksums for {path}: {first} != {second}")]
    ChecksumConflict {
        algorithm: String,
        path: String,
        first: String,
        second: String,
    },
}

/// Split manifest text into `(checksum, path)` pairs in line order
fn parse_lines(content: &str) -> Result<Vec<(&str, &str)>, ManifestError> {
    let mut pairs = Vec::new();

    for (index, raw) in content.lines().enumerate() {
        let line = raw.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }

        let malformed = || ManifestError::MalformedLine {
            line_number: index + 1,
            line: line.to_string(),
        };

        let (checksum, path) = line.split_once(SEPARATOR).ok_or_else(malformed)?;
        let checksum = checksum.trim();
        if checksum.is_empty() || path.is_empty() {
            return Err(malformed());
        }

        pairs.push((checksum, path));
    }

    Ok(pairs)
}

fn is_image(path: &str, marker: &str) -> bool {
    path.to_lowercase().contains(&marker.to_lowercase())
}

/// Parse a single-algorithm manifest.
///
/// Only paths containing `marker` (case-insensitive) are kept; the result is
/// sorted by relative path. Checksum maps carry one entry keyed by `algorithm`.
pub fn parse(
    content: &str,
    algorithm: &str,
    marker: &str,
) -> Result<Vec<ManifestEntry>, ManifestError> {
    merge(&[ManifestSource::new(algorithm, content)], marker)
}

/// Parse several manifests and union their checksum maps by path.
///
/// Two manifests listing different digests for the same algorithm and path
/// are a [`ManifestError::ChecksumConflict`].
pub fn merge(sources: &[ManifestSource], marker: &str) -> Result<Vec<ManifestEntry>, ManifestError> {
    let mut by_path: BTreeMap<String, ChecksumMap> = BTreeMap::new();

    for source in sources {
        let algorithm = source.algorithm.to_lowercase();
        let mut seen = std::collections::HashSet::new();

        for (checksum, path) in parse_lines(&source.content)? {
            if !is_image(path, marker) {
                continue;
            }

            if !seen.insert(path) {
                return Err(ManifestError::DuplicatePath {
                    algorithm: algorithm.clone(),
                    path: path.to_string(),
                });
            }

            let checksums = by_path.entry(path.to_string()).or_default();
            match checksums.entry(algorithm.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(checksum.to_lowercase());
                }
                Entry::Occupied(existing) => {
                    if !existing.get().eq_ignore_ascii_case(checksum) {
                        return Err(ManifestError::ChecksumConflict {
                            algorithm: algorithm.clone(),
                            path: path.to_string(),
                            first: existing.get().clone(),
                            second: checksum.to_lowercase(),
                        });
                    }
                }
            }
        }
    }

    // BTreeMap iteration is already ordered by path (byte-wise)
    let entries: Vec<ManifestEntry> = by_path
        .into_iter()
        .map(|(path, checksums)| ManifestEntry { path, checksums })
        .collect();

    tracing::debug!(entries = entries.len(), sources = sources.len(), "Parsed manifests");

    Ok(entries)
}
