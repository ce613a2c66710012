//! Deterministic identifiers
//!
//! Every identifier handed to the downstream importer is a version 5 UUID
//! derived from [`REPOSITORY_NAMESPACE`], so the same package and file path
//! always map to the same UUID regardless of which host generated the recipe.

use thiserror::Error;
use uuid::Uuid;

/// Domain string the repository namespace is derived from
pub const NAMESPACE_DOMAIN: &str = "repository.ou.edu";

/// Root namespace: `uuid5(NAMESPACE_DNS, "repository.ou.edu")`
pub const REPOSITORY_NAMESPACE: Uuid = Uuid::from_u128(0xeb0ecf41_a457_5220_893a_08b7604b7110);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("Repository namespace mismatch: expected {expected}, derived {derived}")]
    NamespaceMismatch { expected: Uuid, derived: Uuid },
}

/// Derive a namespace UUID from a domain name under the DNS namespace
pub fn derive_namespace(domain: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, domain.as_bytes())
}

/// Derive an identifier for `key` under the repository namespace
pub fn derive(key: &str) -> Uuid {
    Uuid::new_v5(&REPOSITORY_NAMESPACE, key.as_bytes())
}

/// Recompute the repository namespace and compare it with the constant.
///
/// Run once at startup; a mismatch means every identifier this process would
/// emit is wrong.
pub fn verify_namespace() -> Result<(), IdentifierError> {
    let derived = derive_namespace(NAMESPACE_DOMAIN);
    if derived != REPOSITORY_NAMESPACE {
        return Err(IdentifierError::NamespaceMismatch {
            expected: REPOSITORY_NAMESPACE,
            derived,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_fixture() {
        assert_eq!(
            derive_namespace("repository.ou.edu").to_string(),
            "eb0ecf41-a457-5220-893a-08b7604b7110"
        );
        assert_eq!(
            REPOSITORY_NAMESPACE.to_string(),
            "eb0ecf41-a457-5220-893a-08b7604b7110"
        );
    }

    #[test]
    fn test_verify_namespace_passes() {
        assert_eq!(verify_namespace(), Ok(()));
    }

    #[test]
    fn test_derive_is_pure() {
        assert_eq!(derive("bag1/data/page1.tif"), derive("bag1/data/page1.tif"));
        assert_eq!(derive("bag1").get_version_num(), 5);
    }

    #[test]
    fn test_derive_distinct_keys() {
        let keys = [
            "bag1",
            "bag2",
            "bag1/data/page1.tif",
            "bag1/data/page2.tif",
            "bag2/data/page1.tif",
        ];
        let mut ids: Vec<_> = keys.iter().map(|k| derive(k)).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), keys.len());
    }

    #[test]
    fn test_derive_differs_from_namespace_root() {
        assert_ne!(derive(NAMESPACE_DOMAIN), REPOSITORY_NAMESPACE);
    }
}
