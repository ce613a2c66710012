//! Cookbook files: CSV batches describing one package per row
//!
//! Rows are keyed by the `MMS ID`, `Title` and `File name` headers. Other
//! columns are ignored. Rows missing any of the three are logged and skipped.

use recipe_writer_domain::CookbookEntry;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CookbookError {
    #[error("Failed to read cookbook {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Rows that were usable, plus the line numbers of the ones that were not
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cookbook {
    pub entries: Vec<CookbookEntry>,
    pub skipped: Vec<u64>,
}

#[derive(Debug, Deserialize)]
struct CookbookRow {
    #[serde(rename = "MMS ID", default)]
    mms_id: Option<String>,
    #[serde(rename = "Title", default)]
    title: Option<String>,
    #[serde(rename = "File name", default)]
    file_name: Option<String>,
}

impl CookbookRow {
    fn into_entry(self) -> Option<CookbookEntry> {
        Some(CookbookEntry {
            catalog_id: present(self.mms_id)?,
            title: present(self.title)?,
            package: present(self.file_name)?,
        })
    }
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Read a cookbook, skipping rows with missing details
pub fn read_cookbook(path: &Path) -> Result<Cookbook, CookbookError> {
    let read_error = |source| CookbookError::Read {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(read_error)?;
    let headers = reader.headers().map_err(read_error)?.clone();

    let mut cookbook = Cookbook::default();
    for record in reader.records() {
        let record = record.map_err(read_error)?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();

        let entry = match record.deserialize::<CookbookRow>(Some(&headers)) {
            Ok(row) => row.into_entry(),
            Err(e) => {
                tracing::warn!(line, error = %e, "Unreadable cookbook row");
                None
            }
        };

        match entry {
            Some(entry) => cookbook.entries.push(entry),
            None => {
                tracing::warn!(
                    line,
                    path = %path.display(),
                    "Cookbook row is missing an MMS ID, title or file name, skipping"
                );
                cookbook.skipped.push(line);
            }
        }
    }

    tracing::info!(
        path = %path.display(),
        rows = cookbook.entries.len(),
        skipped = cookbook.skipped.len(),
        "Read cookbook"
    );
    Ok(cookbook)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_csv(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("cookbook.csv");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_reads_rows_and_skips_incomplete_ones() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(
            &dir,
            "MMS ID,Title,File name,Notes\n\
             9911,Sidereus nuncius,Galileo_1610,first\n\
             9922,,Kepler_1609,no title\n\
             9933, De revolutionibus ,Copernicus_1543\n",
        );

        let cookbook = read_cookbook(&path).unwrap();

        assert_eq!(
            cookbook.entries,
            vec![
                CookbookEntry {
                    catalog_id: "9911".to_string(),
                    title: "Sidereus nuncius".to_string(),
                    package: "Galileo_1610".to_string(),
                },
                CookbookEntry {
                    catalog_id: "9933".to_string(),
                    title: "De revolutionibus".to_string(),
                    package: "Copernicus_1543".to_string(),
                },
            ]
        );
        assert_eq!(cookbook.skipped, vec![3]);
    }

    #[test]
    fn test_missing_column_skips_every_row() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(&dir, "MMS ID,Title\n9911,Sidereus nuncius\n");

        let cookbook = read_cookbook(&path).unwrap();

        assert!(cookbook.entries.is_empty());
        assert_eq!(cookbook.skipped, vec![2]);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = read_cookbook(&dir.path().join("absent.csv")).unwrap_err();
        assert!(err.to_string().contains("absent.csv"));
    }
}
