//! Recipe assembly
//!
//! Builds the import recipe for one package from its sorted manifest entries
//! and serializes it in the canonical on-disk form (UTF-8, 4-space indent,
//! struct field order).

use serde::Serialize;

use crate::identifier;
use crate::model::{
    IMPORT_TYPE_BOOK, LocationTemplate, ManifestEntry, Page, Recipe, RecipeDocument,
    RecipeMetadata,
};

/// Suffix of the EXIF sidecar generated for each page image
pub const EXIF_SUFFIX: &str = ".exif.txt";

/// Configuration for the recipe assembler
#[derive(Debug, Clone)]
pub struct RecipeConfig {
    /// Where the package's files will be served from
    pub locations: LocationTemplate,
    /// Whether pages reference an EXIF sidecar file
    pub include_exif: bool,
}

/// What the bibliographic step produced for a package
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BibliographicOutcome {
    /// Title extracted from the record, if any
    pub title: Option<String>,
    /// Whether the MARCXML file was written next to the payload
    pub marc_persisted: bool,
}

/// Assembles recipe documents
pub struct RecipeAssembler {
    config: RecipeConfig,
}

impl RecipeAssembler {
    pub fn new(config: RecipeConfig) -> Self {
        Self { config }
    }

    /// Assemble the recipe for `package`.
    ///
    /// `entries` must already be in manifest-parser order; page N is the Nth
    /// entry. An explicit `title` wins over the bibliographic one, and the
    /// label is `null` when neither exists.
    pub fn assemble(
        &self,
        package: &str,
        title: Option<&str>,
        bibliographic: Option<&BibliographicOutcome>,
        entries: &[ManifestEntry],
    ) -> RecipeDocument {
        let label = title
            .filter(|t| !t.trim().is_empty())
            .map(String::from)
            .or_else(|| bibliographic.and_then(|b| b.title.clone()));

        let metadata = bibliographic
            .filter(|b| b.marc_persisted)
            .map(|_| RecipeMetadata {
                marcxml: self.config.locations.marc_url(package),
            });

        let pages = self.pages(package, entries);

        tracing::info!(
            package = %package,
            pages = pages.len(),
            has_label = label.is_some(),
            has_metadata = metadata.is_some(),
            "Assembled recipe"
        );

        RecipeDocument {
            recipe: Recipe {
                import: IMPORT_TYPE_BOOK.to_string(),
                update: "false".to_string(),
                uuid: identifier::derive(package),
                label,
                metadata,
                pages,
            },
        }
    }

    fn pages(&self, package: &str, entries: &[ManifestEntry]) -> Vec<Page> {
        entries
            .iter()
            .enumerate()
            .map(|(index, entry)| Page {
                label: format!("Image {}", index + 1),
                file: self.config.locations.file_url(package, &entry.path),
                checksums: entry.checksums.clone(),
                uuid: identifier::derive(&format!("{}/{}", package, entry.path)),
                exif: self.config.include_exif.then(|| exif_name(&entry.path)),
            })
            .collect()
    }
}

/// EXIF sidecar name for a payload path: `data/001.tif` -> `001.tif.exif.txt`
pub fn exif_name(relative_path: &str) -> String {
    let mut segments = relative_path.split('/');
    let first = segments.next().unwrap_or_default();
    let name = segments.next().unwrap_or(first);
    format!("{}{}", name, EXIF_SUFFIX)
}

impl RecipeDocument {
    /// Canonical serialization used for recipe files
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        self.serialize(&mut serializer)?;
        Ok(out)
    }

    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// File URLs of all pages, in page order
    pub fn page_urls(&self) -> Vec<String> {
        self.recipe.pages.iter().map(|p| p.file.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest;
    use crate::model::ManifestSource;

    fn assembler(include_exif: bool) -> RecipeAssembler {
        RecipeAssembler::new(RecipeConfig {
            locations: LocationTemplate::new("https://bag.ou.edu/derivative", None),
            include_exif,
        })
    }

    fn entries(content: &str) -> Vec<ManifestEntry> {
        manifest::parse(content, "md5", "tif").unwrap()
    }

    #[test]
    fn test_end_to_end_page_order() {
        let entries = entries("abc123  data/page2.tif\ndef456  data/page1.tif\n");
        let doc = assembler(false).assemble("bag1", None, None, &entries);
        let pages = &doc.recipe.pages;

        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].label, "Image 1");
        assert!(pages[0].file.ends_with("page1.tif"));
        assert_eq!(pages[0].checksums["md5"], "def456");
        assert_eq!(pages[1].label, "Image 2");
        assert!(pages[1].file.ends_with("page2.tif"));
        assert_eq!(pages[1].checksums["md5"], "abc123");
    }

    #[test]
    fn test_labels_have_no_gaps() {
        let content: String = (1..=12)
            .rev()
            .map(|i| format!("h{i}  data/{i:03}.tif\nx{i}  data/{i:03}.jpg\n"))
            .collect();
        let doc = assembler(false).assemble("bag1", None, None, &entries(&content));

        let labels: Vec<_> = doc.recipe.pages.iter().map(|p| p.label.as_str()).collect();
        let expected: Vec<_> = (1..=12).map(|i| format!("Image {i}")).collect();
        assert_eq!(labels, expected);
        assert!(doc.recipe.pages[0].file.ends_with("data/001.tif"));
    }

    #[test]
    fn test_identifiers_are_derived_from_package_and_path() {
        let doc = assembler(false).assemble("bag1", None, None, &entries("a  data/1.tif\n"));

        assert_eq!(doc.recipe.uuid, identifier::derive("bag1"));
        assert_eq!(
            doc.recipe.pages[0].uuid,
            identifier::derive("bag1/data/1.tif")
        );
    }

    #[test]
    fn test_title_resolution() {
        let entries = entries("a  data/1.tif\n");
        let bib = BibliographicOutcome {
            title: Some("From MARC".to_string()),
            marc_persisted: false,
        };
        let asm = assembler(false);

        let explicit = asm.assemble("bag1", Some("Explicit"), Some(&bib), &entries);
        assert_eq!(explicit.recipe.label.as_deref(), Some("Explicit"));

        let fallback = asm.assemble("bag1", None, Some(&bib), &entries);
        assert_eq!(fallback.recipe.label.as_deref(), Some("From MARC"));

        let blank = asm.assemble("bag1", Some(""), Some(&bib), &entries);
        assert_eq!(blank.recipe.label.as_deref(), Some("From MARC"));

        let none = asm.assemble("bag1", None, None, &entries);
        assert_eq!(none.recipe.label, None);
    }

    #[test]
    fn test_metadata_only_when_persisted() {
        let entries = entries("a  data/1.tif\n");
        let asm = assembler(false);

        let failed = BibliographicOutcome {
            title: Some("T".to_string()),
            marc_persisted: false,
        };
        let doc = asm.assemble("bag1", None, Some(&failed), &entries);
        let value: serde_json::Value =
            serde_json::from_slice(&doc.to_json_bytes().unwrap()).unwrap();
        assert!(value["recipe"].get("metadata").is_none());
        assert!(value["recipe"].get("label").is_some());

        let persisted = BibliographicOutcome {
            title: None,
            marc_persisted: true,
        };
        let doc = asm.assemble("bag1", None, Some(&persisted), &entries);
        assert_eq!(
            doc.recipe.metadata.unwrap().marcxml,
            "https://bag.ou.edu/derivative/bag1/marc.xml"
        );
    }

    #[test]
    fn test_exif_names() {
        assert_eq!(exif_name("data/001.tif"), "001.tif.exif.txt");
        assert_eq!(exif_name("data/sub/001.tif"), "sub.exif.txt");
        assert_eq!(exif_name("001.tif"), "001.tif.exif.txt");

        let doc = assembler(true).assemble("bag1", None, None, &entries("a  data/1.tif\n"));
        assert_eq!(doc.recipe.pages[0].exif.as_deref(), Some("1.tif.exif.txt"));

        let doc = assembler(false).assemble("bag1", None, None, &entries("a  data/1.tif\n"));
        assert!(doc.recipe.pages[0].exif.is_none());
    }

    #[test]
    fn test_canonical_serialization() {
        let entries = manifest::merge(
            &[
                ManifestSource::new("md5", "m1  data/1.tif\n"),
                ManifestSource::new("sha256", "s1  data/1.tif\n"),
            ],
            "tif",
        )
        .unwrap();
        let doc = assembler(true).assemble("bag1", Some("Café"), None, &entries);
        let json = String::from_utf8(doc.to_json_bytes().unwrap()).unwrap();

        let expected = format!(
            r#"{{
    "recipe": {{
        "import": "book",
        "update": "false",
        "uuid": "{}",
        "label": "Café",
        "pages": [
            {{
                "label": "Image 1",
                "file": "https://bag.ou.edu/derivative/bag1/data/1.tif",
                "md5": "m1",
                "sha256": "s1",
                "uuid": "{}",
                "exif": "1.tif.exif.txt"
            }}
        ]
    }}
}}"#,
            identifier::derive("bag1"),
            identifier::derive("bag1/data/1.tif"),
        );

        assert_eq!(json, expected);
    }

    #[test]
    fn test_serialization_is_stable() {
        let entries = entries("b  data/2.tif\na  data/1.tif\n");
        let asm = assembler(true);
        let first = asm.assemble("bag1", Some("T"), None, &entries).to_json_bytes().unwrap();
        let second = asm.assemble("bag1", Some("T"), None, &entries).to_json_bytes().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_round_trip_preserves_pages() {
        let entries = manifest::merge(
            &[
                ManifestSource::new("md5", "m2  data/2.tif\nm1  data/1.tif\n"),
                ManifestSource::new("sha256", "s1  data/1.tif\ns2  data/2.tif\n"),
            ],
            "tif",
        )
        .unwrap();
        let persisted = BibliographicOutcome {
            title: Some("T".to_string()),
            marc_persisted: true,
        };
        let doc = assembler(true).assemble("bag1", None, Some(&persisted), &entries);

        let parsed = RecipeDocument::from_json_slice(&doc.to_json_bytes().unwrap()).unwrap();

        assert_eq!(parsed, doc);
        assert_eq!(parsed.recipe.pages[1].checksums["sha256"], "s2");
    }
}
