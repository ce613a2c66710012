//! recipe-writer adapters crate
//!
//! This crate contains infrastructure adapters implementing the domain ports:
//! - `packages`: BagIt packages on the local filesystem
//! - `bibliographic`: Alma bib record lookups
//! - `storage`: S3 and in-memory object stores
//! - `catalog`: Package catalog REST client
//! - `cookbook`: CSV batches of packages with their bibliographic records

mod alma;
mod bag_fs;
mod catalog_http;
mod cookbook_csv;
mod storage_memory;
mod storage_s3;

/// Re-exports for package adapters
pub mod packages {
    pub use crate::bag_fs::{ChecksumAlgorithm, FsPackageStore};
}

/// Re-exports for bibliographic adapters
pub mod bibliographic {
    pub use crate::alma::{AlmaBibSource, BibliographicError, DEFAULT_API_KEY_PATH, DEFAULT_BASE_URL};
}

/// Re-exports for object storage adapters
pub mod storage {
    pub use crate::storage_memory::MemoryObjectStore;
    pub use crate::storage_s3::{DEFAULT_BUCKET, S3ObjectStore};
}

/// Re-exports for catalog adapters
pub mod catalog {
    pub use crate::catalog_http::HttpCatalog;
}

/// Re-exports for cookbook input
pub mod cookbook {
    pub use crate::cookbook_csv::{Cookbook, CookbookError, read_cookbook};
}
