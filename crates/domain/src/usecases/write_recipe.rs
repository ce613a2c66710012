//! Recipe writing use case - one package from manifest to recipe file

use std::path::PathBuf;

use crate::{
    manifest::{self, ManifestError},
    marc,
    model::{BibRecord, Package, RecipeDocument},
    ports::{BibliographicSource, PackageError, PackageStore},
    recipe::{BibliographicOutcome, RecipeAssembler, RecipeConfig},
};

/// Configuration for the recipe writer
#[derive(Debug, Clone)]
pub struct WriteRecipeConfig {
    /// Assembler settings (URLs, EXIF toggle)
    pub recipe: RecipeConfig,
    /// Substring identifying page images in manifests
    pub image_marker: String,
}

/// Errors that abort recipe generation for a single package
#[derive(Debug, thiserror::Error)]
pub enum WriteRecipeError {
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),
    #[error("Package error: {0}")]
    Package(#[from] PackageError),
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A recipe that has been written next to its package payload
#[derive(Debug, Clone)]
pub struct WrittenRecipe {
    pub document: RecipeDocument,
    pub path: PathBuf,
    /// Package as saved after the recipe was added
    pub package: Package,
}

/// Use case for generating and writing one package's recipe
pub struct WriteRecipeUseCase<'a, P: ?Sized, B: ?Sized> {
    packages: &'a P,
    bibliographic: &'a B,
    assembler: RecipeAssembler,
    image_marker: String,
}

impl<'a, P, B> WriteRecipeUseCase<'a, P, B>
where
    P: PackageStore + ?Sized,
    B: BibliographicSource + ?Sized,
{
    pub fn new(packages: &'a P, bibliographic: &'a B, config: WriteRecipeConfig) -> Self {
        Self {
            packages,
            bibliographic,
            assembler: RecipeAssembler::new(config.recipe),
            image_marker: config.image_marker,
        }
    }

    /// Generate the recipe for `package` and write it as `{name}.json`.
    ///
    /// With a `catalog_id`, the bibliographic record is fetched and stored as
    /// MARCXML; missing records only drop the metadata block and title.
    pub async fn write(
        &self,
        package: &Package,
        catalog_id: Option<&str>,
        title: Option<&str>,
    ) -> Result<WrittenRecipe, WriteRecipeError> {
        let entries = manifest::merge(&package.manifests, &self.image_marker)?;

        if entries.is_empty() {
            tracing::warn!(package = %package.name, marker = %self.image_marker, "No page images in manifest");
        }

        let bibliographic = match catalog_id {
            Some(catalog_id) => Some(self.bibliographic(package, catalog_id).await),
            None => None,
        };

        let document =
            self.assembler
                .assemble(&package.name, title, bibliographic.as_ref(), &entries);

        let bytes = document.to_json_bytes()?;
        let file_name = format!("{}.json", package.name);

        tracing::debug!(package = %package.name, file = %file_name, "Writing recipe");
        let path = self.packages.write_file(package, &file_name, &bytes).await?;

        // Re-save so the tag manifest covers the recipe and MARCXML
        let package = self.packages.save(package, false).await?;

        Ok(WrittenRecipe {
            document,
            path,
            package,
        })
    }

    async fn bibliographic(&self, package: &Package, catalog_id: &str) -> BibliographicOutcome {
        let Some(record) = self.bibliographic.fetch_record(catalog_id).await else {
            tracing::info!(package = %package.name, catalog_id = %catalog_id, "No bibliographic record");
            return BibliographicOutcome::default();
        };

        BibliographicOutcome {
            title: marc::extract_title(&record),
            marc_persisted: self.persist(package, &record).await,
        }
    }

    /// Write the record as MARCXML into the package; `false` on any failure
    async fn persist(&self, package: &Package, record: &BibRecord) -> bool {
        let xml = match marc::to_marcxml(record) {
            Ok(xml) => xml,
            Err(e) => {
                tracing::error!(package = %package.name, error = %e, "Failed to convert record to MARCXML");
                return false;
            }
        };

        match self
            .packages
            .write_file(package, marc::MARC_FILE_NAME, &xml)
            .await
        {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(package = %package.name, error = %e, "Failed to write MARCXML");
                false
            }
        }
    }
}
