//! Port definitions (traits) for external dependencies
//!
//! These traits define the boundaries between the domain and external systems.
//! Adapters implement these traits to connect to real infrastructure.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use time::OffsetDateTime;

use crate::model::{BibRecord, CatalogRecord, Package, PackageFile};

/// Error type for package store operations
#[derive(Debug, Error)]
pub enum PackageError {
    #[error("Not a package: {0}")]
    NotAPackage(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid package {path}: {message}")]
    Invalid { path: String, message: String },
}

/// Port for the package (bag) library
#[async_trait]
pub trait PackageStore: Send + Sync {
    /// Directories in the derivative area of a task, sorted by name
    async fn derivative_dirs(&self, task_id: &str) -> Result<Vec<PathBuf>, PackageError>;

    /// Location of a named package in the derivative area of a task
    fn package_path(&self, task_id: &str, name: &str) -> PathBuf;

    /// Open an existing package; `NotAPackage` if the directory is not one
    async fn open(&self, path: &Path) -> Result<Package, PackageError>;

    /// Turn a plain directory into a package
    async fn create(&self, path: &Path) -> Result<Package, PackageError>;

    /// Persist package info and checksums, returning the refreshed package
    async fn save(&self, package: &Package, update_manifests: bool)
    -> Result<Package, PackageError>;

    /// Write a tag file (recipe, MARCXML) into the package root
    async fn write_file(
        &self,
        package: &Package,
        name: &str,
        contents: &[u8],
    ) -> Result<PathBuf, PackageError>;

    /// Files to transfer: top-level files and payload files
    async fn upload_files(&self, package: &Package) -> Result<Vec<PackageFile>, PackageError>;

    /// Delete the package from the local filesystem
    async fn remove(&self, package: &Package) -> Result<(), PackageError>;
}

/// Port for fetching bibliographic records.
///
/// Implementations never fail: credential, transport and HTTP errors are
/// logged and reported as `None`.
#[async_trait]
pub trait BibliographicSource: Send + Sync {
    async fn fetch_record(&self, catalog_id: &str) -> Option<BibRecord>;
}

/// Error type for object storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Upload of {key} failed: {message}")]
    Upload { key: String, message: String },
}

/// Port for object storage
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload a local file under `key`, overwriting any existing object
    async fn put(&self, key: &str, local_path: &Path) -> Result<(), StorageError>;

    /// Human-readable target, e.g. `s3://bucket`
    fn location(&self) -> String;
}

/// Error type for catalog operations
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Network error: {0}")]
    Transport(String),
    #[error("Invalid catalog response: {0}")]
    InvalidResponse(String),
    #[error("Catalog rejected update ({status}): {body}")]
    Conflict { status: u16, body: String },
}

/// Port for the package catalog
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Find the catalog entry for a package by name
    async fn find(&self, package: &str) -> Result<Option<CatalogRecord>, CatalogError>;

    /// Push an updated catalog entry
    async fn update(&self, record: &CatalogRecord) -> Result<(), CatalogError>;

    /// Check if catalog synchronisation is enabled
    fn is_enabled(&self) -> bool;
}

/// Port for time/clock operations (enables deterministic testing)
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> OffsetDateTime;
}

/// Real clock implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}
