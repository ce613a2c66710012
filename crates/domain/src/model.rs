//! Domain models and value objects

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Checksum algorithm name (`md5`, `sha256`, ...) to lowercase hex digest
pub type ChecksumMap = BTreeMap<String, String>;

/// Recipe import type understood by the downstream importer
pub const IMPORT_TYPE_BOOK: &str = "book";

/// A single payload file listed in a package manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Path relative to the package root, e.g. `data/page1.tif`
    pub path: String,
    /// Digests of the file, one per manifest algorithm that lists it
    pub checksums: ChecksumMap,
}

/// Raw contents of one checksum manifest (e.g. `manifest-md5.txt`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestSource {
    pub algorithm: String,
    pub content: String,
}

impl ManifestSource {
    pub fn new(algorithm: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            algorithm: algorithm.into(),
            content: content.into(),
        }
    }
}

/// A derivative package (BagIt bag) on disk
#[derive(Debug, Clone)]
pub struct Package {
    /// Package name, used in URLs, storage keys and identifiers
    pub name: String,
    /// Package root directory
    pub path: PathBuf,
    /// `bag-info.txt` fields
    pub info: BTreeMap<String, String>,
    /// Payload manifests, one per checksum algorithm
    pub manifests: Vec<ManifestSource>,
}

impl Package {
    pub const DESCRIPTION_KEY: &'static str = "External-Description";
    pub const IDENTIFIER_KEY: &'static str = "External-Identifier";

    /// Name recorded in the bag info, falling back to the directory name
    pub fn resolve_name(path: &std::path::Path, info: &BTreeMap<String, String>) -> String {
        info.get(Self::DESCRIPTION_KEY)
            .filter(|name| !name.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| {
                path.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            })
    }
}

/// A file inside a package that is transferred to object storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageFile {
    /// Absolute path on the local filesystem
    pub local_path: PathBuf,
    /// Whether the file lives in the payload (`data/`) directory
    pub in_payload: bool,
}

impl PackageFile {
    /// Lower-cased file name, as used in storage keys
    pub fn key_name(&self) -> String {
        self.local_path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    }
}

/// Raw bibliographic record returned by the catalog API
#[derive(Debug, Clone)]
pub struct BibRecord {
    /// MMS ID the record was requested with
    pub catalog_id: String,
    /// XML body
    pub body: Vec<u8>,
}

/// Catalog entry for a package, kept as an opaque JSON object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CatalogRecord(pub serde_json::Map<String, serde_json::Value>);

/// Derivative sub-record merged into a catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivativeRecord {
    pub recipe: String,
    pub datetime: String,
    pub pages: Vec<String>,
}

impl CatalogRecord {
    /// Insert or replace `derivatives.<format>` in this record
    pub fn merge_derivative(&mut self, format: &str, derivative: &DerivativeRecord) {
        let derivatives = self
            .0
            .entry("derivatives")
            .or_insert_with(|| serde_json::Value::Object(Default::default()));

        if !derivatives.is_object() {
            *derivatives = serde_json::Value::Object(Default::default());
        }

        if let serde_json::Value::Object(map) = derivatives {
            map.insert(
                format.to_string(),
                serde_json::to_value(derivative).unwrap_or(serde_json::Value::Null),
            );
        }
    }
}

/// Builds the public URLs for files inside a derivative package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationTemplate {
    /// Public base URL of the derivative area, without trailing slash
    pub base_url: String,
    /// Derivative format parameters, inserted as a path segment when set
    pub format_params: Option<String>,
}

impl LocationTemplate {
    pub fn new(base_url: impl Into<String>, format_params: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            format_params: format_params.filter(|f| !f.trim().is_empty()),
        }
    }

    /// URL of a file inside the package, e.g. `{base}/{package}/{format}/{path}`
    pub fn file_url(&self, package: &str, relative_path: &str) -> String {
        match &self.format_params {
            Some(format) => format!("{}/{}/{}/{}", self.base_url, package, format, relative_path),
            None => format!("{}/{}/{}", self.base_url, package, relative_path),
        }
    }

    pub fn marc_url(&self, package: &str) -> String {
        self.file_url(package, crate::marc::MARC_FILE_NAME)
    }

    /// URL of the uploaded recipe (storage keys are lower-cased)
    pub fn recipe_url(&self, package: &str) -> String {
        self.file_url(package, &format!("{}.json", package.to_lowercase()))
    }
}

/// One page of a recipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub label: String,
    pub file: String,
    #[serde(flatten)]
    pub checksums: ChecksumMap,
    pub uuid: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exif: Option<String>,
}

/// Bibliographic metadata references
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeMetadata {
    pub marcxml: String,
}

/// The recipe body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub import: String,
    /// Serialized as the string `"false"`, which the importer expects
    pub update: String,
    pub uuid: Uuid,
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<RecipeMetadata>,
    pub pages: Vec<Page>,
}

/// Top-level recipe file: `{"recipe": {...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeDocument {
    pub recipe: Recipe,
}

/// `s3_bags` in a task input: one name, a list, or absent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BagList {
    One(String),
    Many(Vec<String>),
}

impl BagList {
    /// Flatten into package names; comma-separated values are split
    pub fn names(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            BagList::One(name) => vec![name.as_str()],
            BagList::Many(names) => names.iter().map(String::as_str).collect(),
        };

        raw.into_iter()
            .flat_map(|value| value.split(','))
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(String::from)
            .collect()
    }
}

/// Arguments handed over by the derivative generation step
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInput {
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub s3_bags: Option<BagList>,
    #[serde(default)]
    pub format_parameters: Option<String>,
}

/// One row of a cookbook: a package described with its own record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookbookEntry {
    /// MMS ID of the bibliographic record
    pub catalog_id: String,
    pub title: String,
    /// Package (derivative directory) name
    pub package: String,
}

/// How far a package got through the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageStage {
    Created,
    Bagged,
    RecipeWritten,
    Uploaded,
    CatalogUpdated,
    Done,
    Failed,
}

impl fmt::Display for PackageStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PackageStage::Created => "created",
            PackageStage::Bagged => "bagged",
            PackageStage::RecipeWritten => "recipe_written",
            PackageStage::Uploaded => "uploaded",
            PackageStage::CatalogUpdated => "catalog_updated",
            PackageStage::Done => "done",
            PackageStage::Failed => "failed",
        };
        f.write_str(name)
    }
}
