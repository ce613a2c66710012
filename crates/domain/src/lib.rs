//! recipe-writer domain crate
//!
//! This crate contains the core domain logic following hexagonal architecture:
//! - `model`: Domain entities and value objects
//! - `identifier`: Deterministic name-based UUIDs rooted at the repository namespace
//! - `manifest`: Checksum manifest parsing and merging
//! - `recipe`: Recipe assembly and canonical serialization
//! - `marc`: Bibliographic record helpers (title, MARCXML)
//! - `ports`: Trait definitions for external dependencies (adapters)
//! - `usecases`: Application use cases / pipeline orchestration

pub mod identifier;
pub mod manifest;
pub mod marc;
pub mod model;
pub mod ports;
pub mod recipe;
pub mod usecases;

pub use identifier::{REPOSITORY_NAMESPACE, derive, verify_namespace};
pub use model::*;
pub use ports::*;
