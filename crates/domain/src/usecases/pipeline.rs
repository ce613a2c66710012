//! Pipeline use case - orchestrates bagging, recipe writing, upload and cataloging

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    manifest::DEFAULT_IMAGE_MARKER,
    model::{
        BagList, CookbookEntry, DerivativeRecord, LocationTemplate, Package, PackageFile, PackageStage,
        RecipeDocument, TaskInput,
    },
    ports::{
        BibliographicSource, CatalogClient, CatalogError, Clock, ObjectStore, PackageError,
        PackageStore,
    },
    recipe::RecipeConfig,
    usecases::write_recipe::{WriteRecipeConfig, WriteRecipeUseCase, WrittenRecipe},
};

/// Catalog key used when a run has no format parameters
pub const DEFAULT_FORMAT_KEY: &str = "default";

/// Configuration for the pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Whether pages reference an EXIF sidecar
    pub include_exif: bool,
    /// Derivative format, used as a URL and storage key segment
    pub format_params: Option<String>,
    /// Whether to push derivative records to the catalog
    pub sync_catalog: bool,
    /// Substring identifying page images in manifests
    pub image_marker: String,
    /// Regenerate payload manifests when bagging
    pub update_manifests: bool,
    /// `External-Identifier` stamped on every package
    pub owner_identifier: String,
    /// Public base URL of the derivative area
    pub base_url: String,
    /// Top-level storage prefix
    pub destination: String,
    /// Maximum concurrent uploads (and packages described at once)
    pub max_concurrent: usize,
    /// Delete local packages after a successful upload
    pub remove_local: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            include_exif: true,
            format_params: None,
            sync_catalog: true,
            image_marker: DEFAULT_IMAGE_MARKER.to_string(),
            update_manifests: true,
            owner_identifier: "University of Oklahoma Libraries".to_string(),
            base_url: "https://bag.ou.edu/derivative".to_string(),
            destination: "derivative".to_string(),
            max_concurrent: 4,
            remove_local: false,
        }
    }
}

impl PipelineConfig {
    pub fn locations(&self) -> LocationTemplate {
        LocationTemplate::new(self.base_url.clone(), self.format_params.clone())
    }
}

/// Result of describing one directory
#[derive(Debug, Clone)]
pub enum RecipeOutcome {
    Written(WrittenRecipe),
    Skipped { reason: String },
    Failed { error: String },
}

/// Per-package line of a task report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageReport {
    pub name: String,
    /// Last stage reached
    pub stage: PackageStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipe_url: Option<String>,
    pub catalog_updated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of a full task run
#[derive(Debug)]
pub struct TaskReport {
    pub task_id: String,
    /// Recipe URLs of the packages that completed, in request order
    pub recipe_urls: Vec<String>,
    pub packages: Vec<PackageReport>,
    /// First package failure, if any
    pub first_error: Option<PipelineError>,
}

impl TaskReport {
    pub fn into_result(self) -> Result<Vec<String>, PipelineError> {
        match self.first_error {
            Some(error) => Err(error),
            None => Ok(self.recipe_urls),
        }
    }
}

/// Errors from the pipeline
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid task input: {0}")]
    InvalidInput(String),
    #[error("Package store error: {0}")]
    Packages(String),
    #[error("Package {package} failed after {stage}: {message}")]
    Package {
        package: String,
        stage: PackageStage,
        message: String,
    },
}

/// Pipeline orchestrator
pub struct Pipeline<P, B, O, C, Cl>
where
    P: PackageStore + ?Sized,
    B: BibliographicSource + ?Sized,
    O: ObjectStore + ?Sized,
    C: CatalogClient + ?Sized,
    Cl: Clock + ?Sized,
{
    packages: Arc<P>,
    bibliographic: Arc<B>,
    objects: Arc<O>,
    catalog: Arc<C>,
    clock: Arc<Cl>,
    config: PipelineConfig,
    catalog_locks: Arc<KeyedLocks>,
}

impl<P, B, O, C, Cl> Clone for Pipeline<P, B, O, C, Cl>
where
    P: PackageStore + ?Sized,
    B: BibliographicSource + ?Sized,
    O: ObjectStore + ?Sized,
    C: CatalogClient + ?Sized,
    Cl: Clock + ?Sized,
{
    fn clone(&self) -> Self {
        Self {
            packages: Arc::clone(&self.packages),
            bibliographic: Arc::clone(&self.bibliographic),
            objects: Arc::clone(&self.objects),
            catalog: Arc::clone(&self.catalog),
            clock: Arc::clone(&self.clock),
            config: self.config.clone(),
            catalog_locks: Arc::clone(&self.catalog_locks),
        }
    }
}

impl<P, B, O, C, Cl> Pipeline<P, B, O, C, Cl>
where
    P: PackageStore + ?Sized,
    B: BibliographicSource + ?Sized,
    O: ObjectStore + ?Sized,
    C: CatalogClient + ?Sized,
    Cl: Clock + ?Sized,
{
    pub fn new(
        packages: Arc<P>,
        bibliographic: Arc<B>,
        objects: Arc<O>,
        catalog: Arc<C>,
        clock: Arc<Cl>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            packages,
            bibliographic,
            objects,
            catalog,
            clock,
            config,
            catalog_locks: Arc::new(KeyedLocks::default()),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Same pipeline with different format parameters; catalog locks are shared
    pub fn with_format_params(&self, format_params: Option<String>) -> Self {
        let mut pipeline = self.clone();
        pipeline.config.format_params = format_params;
        pipeline
    }

    /// Turn every directory of the task's derivative area into a package
    pub async fn bag_derivatives(
        &self,
        task_id: &str,
    ) -> Result<Vec<(String, Result<Package, PackageError>)>, PipelineError> {
        let dirs = self
            .packages
            .derivative_dirs(task_id)
            .await
            .map_err(|e| PipelineError::Packages(e.to_string()))?;

        tracing::info!(task_id = %task_id, count = dirs.len(), "Bagging derivatives");

        let results: Vec<_> = stream::iter(dirs)
            .map(|dir| async move {
                let name = dir_name(&dir);
                let result = self.bag_directory(&dir, &name).await;
                match &result {
                    Ok(_) => tracing::info!(package = %name, "Bagged"),
                    Err(e) => tracing::error!(package = %name, error = %e, "Failed to bag directory"),
                }
                (name, result)
            })
            .buffered(self.config.max_concurrent.max(1))
            .collect()
            .await;

        Ok(results)
    }

    async fn bag_directory(&self, dir: &Path, name: &str) -> Result<Package, PackageError> {
        let mut package = match self.packages.open(dir).await {
            Ok(package) => package,
            Err(PackageError::NotAPackage(_)) => {
                tracing::debug!(path = %dir.display(), "Creating package");
                self.packages.create(dir).await?
            }
            Err(e) => return Err(e),
        };

        package
            .info
            .insert(Package::DESCRIPTION_KEY.to_string(), name.to_string());
        package.info.insert(
            Package::IDENTIFIER_KEY.to_string(),
            self.config.owner_identifier.clone(),
        );
        package.name = name.to_string();

        self.packages
            .save(&package, self.config.update_manifests)
            .await
    }

    /// Write a recipe for every package of the task's derivative area
    pub async fn write_recipes(
        &self,
        task_id: &str,
        catalog_id: Option<&str>,
        title: Option<&str>,
    ) -> Result<Vec<(String, RecipeOutcome)>, PipelineError> {
        let dirs = self
            .packages
            .derivative_dirs(task_id)
            .await
            .map_err(|e| PipelineError::Packages(e.to_string()))?;

        let usecase = self.recipe_usecase();
        let usecase = &usecase;

        let results: Vec<_> = stream::iter(dirs)
            .map(|dir| async move {
                let name = dir_name(&dir);
                let outcome = self.write_recipe(usecase, &dir, catalog_id, title).await;
                (name, outcome)
            })
            .buffered(self.config.max_concurrent.max(1))
            .collect()
            .await;

        Ok(results)
    }

    /// Write one recipe per cookbook row, each with its own catalog id and title
    pub async fn write_cookbook(
        &self,
        task_id: &str,
        entries: &[CookbookEntry],
    ) -> Vec<(String, RecipeOutcome)> {
        tracing::info!(task_id = %task_id, rows = entries.len(), "Writing cookbook recipes");

        let usecase = self.recipe_usecase();
        let usecase = &usecase;

        stream::iter(entries)
            .map(|entry| async move {
                let dir = self.packages.package_path(task_id, &entry.package);
                let outcome = self
                    .write_recipe(usecase, &dir, Some(&entry.catalog_id), Some(&entry.title))
                    .await;
                (entry.package.clone(), outcome)
            })
            .buffered(self.config.max_concurrent.max(1))
            .collect()
            .await
    }

    fn recipe_usecase(&self) -> WriteRecipeUseCase<'_, P, B> {
        WriteRecipeUseCase::new(
            self.packages.as_ref(),
            self.bibliographic.as_ref(),
            WriteRecipeConfig {
                recipe: RecipeConfig {
                    locations: self.config.locations(),
                    include_exif: self.config.include_exif,
                },
                image_marker: self.config.image_marker.clone(),
            },
        )
    }

    async fn write_recipe(
        &self,
        usecase: &WriteRecipeUseCase<'_, P, B>,
        dir: &Path,
        catalog_id: Option<&str>,
        title: Option<&str>,
    ) -> RecipeOutcome {
        let package = match self.packages.open(dir).await {
            Ok(package) => package,
            Err(PackageError::NotAPackage(path)) => {
                tracing::debug!(path = %path, "Skipping directory, not a package");
                return RecipeOutcome::Skipped {
                    reason: format!("Not a package: {}", path),
                };
            }
            Err(e) => {
                tracing::error!(path = %dir.display(), error = %e, "Failed to open package");
                return RecipeOutcome::Failed {
                    error: e.to_string(),
                };
            }
        };

        match usecase.write(&package, catalog_id, title).await {
            Ok(written) => {
                tracing::info!(
                    package = %package.name,
                    pages = written.document.recipe.pages.len(),
                    "Wrote recipe"
                );
                RecipeOutcome::Written(written)
            }
            Err(e) => {
                tracing::error!(package = %package.name, error = %e, "Failed to write recipe");
                RecipeOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    /// Storage key for a package file:
    /// `{destination}/{package}/{format}/[data/]{lowercased name}`
    pub fn storage_key(&self, package: &str, file: &PackageFile) -> String {
        let mut parts = vec![self.config.destination.trim_matches('/'), package];
        if let Some(format) = self.config.format_params.as_deref() {
            parts.push(format);
        }
        if file.in_payload {
            parts.push("data");
        }
        parts.retain(|part| !part.is_empty());

        format!("{}/{}", parts.join("/"), file.key_name())
    }

    /// Upload a package's files, returning how many were transferred
    pub async fn upload(&self, package: &Package) -> Result<usize, PipelineError> {
        let failed = |message: String| PipelineError::Package {
            package: package.name.clone(),
            stage: PackageStage::RecipeWritten,
            message,
        };

        let files = self
            .packages
            .upload_files(package)
            .await
            .map_err(|e| failed(e.to_string()))?;

        tracing::info!(
            package = %package.name,
            files = files.len(),
            target = %self.objects.location(),
            "Uploading package"
        );

        let uploaded: Vec<()> = stream::iter(files.iter())
            .map(|file| {
                let key = self.storage_key(&package.name, file);
                async move {
                    tracing::debug!(key = %key, "Uploading file");
                    self.objects.put(&key, &file.local_path).await
                }
            })
            .buffer_unordered(self.config.max_concurrent.max(1))
            .try_collect()
            .await
            .map_err(|e| failed(e.to_string()))?;

        Ok(uploaded.len())
    }

    /// Record the derivative in the package's catalog entry.
    ///
    /// Returns `Ok(false)` when the catalog is disabled, has no entry for the
    /// package, or cannot be reached. Only a rejected update is an error.
    pub async fn sync_catalog(
        &self,
        package: &str,
        document: &RecipeDocument,
    ) -> Result<bool, CatalogError> {
        if !self.catalog.is_enabled() {
            tracing::debug!(package = %package, "Catalog disabled");
            return Ok(false);
        }

        let _guard = self.catalog_locks.lock(package).await;

        let mut record = match self.catalog.find(package).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::info!(package = %package, "No catalog entry for package");
                return Ok(false);
            }
            Err(e) => {
                tracing::warn!(package = %package, error = %e, "Catalog search failed, skipping");
                return Ok(false);
            }
        };

        let derivative = DerivativeRecord {
            recipe: self.config.locations().recipe_url(package),
            datetime: self.timestamp(),
            pages: document.page_urls(),
        };
        let format = self
            .config
            .format_params
            .as_deref()
            .unwrap_or(DEFAULT_FORMAT_KEY);

        record.merge_derivative(format, &derivative);
        match self.catalog.update(&record).await {
            Ok(()) => {
                tracing::info!(package = %package, format = %format, "Updated catalog entry");
                Ok(true)
            }
            Err(e @ CatalogError::Conflict { .. }) => Err(e),
            Err(e) => {
                tracing::warn!(package = %package, error = %e, "Catalog update failed, skipping");
                Ok(false)
            }
        }
    }

    fn timestamp(&self) -> String {
        let now = self.clock.now();
        now.format(&Rfc3339).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to format timestamp");
            now.unix_timestamp().to_string()
        })
    }

    /// Full run for a task: bag, describe, upload, catalog, clean up
    pub async fn process(
        &self,
        input: &TaskInput,
        catalog_id: Option<&str>,
        title: Option<&str>,
    ) -> Result<TaskReport, PipelineError> {
        let task_id = input
            .task_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| PipelineError::InvalidInput("missing task_id".to_string()))?;

        let bags = input
            .s3_bags
            .as_ref()
            .map(BagList::names)
            .unwrap_or_default();
        if bags.is_empty() {
            return Err(PipelineError::InvalidInput(
                "no packages listed in s3_bags".to_string(),
            ));
        }

        let format_params = input
            .format_parameters
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty());

        match format_params {
            Some(format) => {
                self.with_format_params(Some(format.to_string()))
                    .run(task_id, &bags, catalog_id, title)
                    .await
            }
            None => self.run(task_id, &bags, catalog_id, title).await,
        }
    }

    async fn run(
        &self,
        task_id: &str,
        bags: &[String],
        catalog_id: Option<&str>,
        title: Option<&str>,
    ) -> Result<TaskReport, PipelineError> {
        tracing::info!(
            task_id = %task_id,
            packages = ?bags,
            format = ?self.config.format_params,
            "Processing task"
        );

        let bagged = self.bag_derivatives(task_id).await?;
        let mut bag_errors: HashMap<String, String> = bagged
            .into_iter()
            .filter_map(|(name, result)| result.err().map(|e| (name, e.to_string())))
            .collect();

        let mut recipes: HashMap<String, RecipeOutcome> = self
            .write_recipes(task_id, catalog_id, title)
            .await?
            .into_iter()
            .collect();

        let mut report = TaskReport {
            task_id: task_id.to_string(),
            recipe_urls: Vec::new(),
            packages: Vec::with_capacity(bags.len()),
            first_error: None,
        };

        for name in bags {
            let outcome = recipes.remove(name);
            let bag_error = bag_errors.remove(name);
            let (package_report, error) = self.finish_package(name, outcome, bag_error).await;

            if let Some(url) = &package_report.recipe_url {
                report.recipe_urls.push(url.clone());
            }
            if report.first_error.is_none() {
                report.first_error = error;
            }
            report.packages.push(package_report);
        }

        tracing::info!(
            task_id = %task_id,
            completed = report.recipe_urls.len(),
            requested = bags.len(),
            "Task finished"
        );

        Ok(report)
    }

    async fn finish_package(
        &self,
        name: &str,
        outcome: Option<RecipeOutcome>,
        bag_error: Option<String>,
    ) -> (PackageReport, Option<PipelineError>) {
        let written = match outcome {
            Some(RecipeOutcome::Written(written)) => written,
            Some(RecipeOutcome::Failed { error }) => {
                let stage = if bag_error.is_some() {
                    PackageStage::Created
                } else {
                    PackageStage::Bagged
                };
                return failed_package(name, stage, error);
            }
            Some(RecipeOutcome::Skipped { reason }) => {
                return failed_package(name, PackageStage::Created, bag_error.unwrap_or(reason));
            }
            None => {
                return failed_package(
                    name,
                    PackageStage::Created,
                    format!("No derivative directory named {}", name),
                );
            }
        };

        if let Err(e) = self.upload(&written.package).await {
            tracing::error!(package = %name, error = %e, "Upload failed");
            return (
                report_line(name, PackageStage::Failed, Some(e.to_string())),
                Some(e),
            );
        }

        let mut catalog_updated = false;
        if self.config.sync_catalog {
            match self.sync_catalog(name, &written.document).await {
                Ok(updated) => catalog_updated = updated,
                Err(e) => {
                    tracing::error!(package = %name, error = %e, "Catalog update failed");
                    return failed_package(name, PackageStage::Uploaded, e.to_string());
                }
            }
        }

        if self.config.remove_local {
            match self.packages.remove(&written.package).await {
                Ok(()) => tracing::info!(package = %name, "Removed local package"),
                Err(e) => {
                    tracing::warn!(package = %name, error = %e, "Failed to remove local package")
                }
            }
        }

        let report = PackageReport {
            name: name.to_string(),
            stage: PackageStage::Done,
            recipe_url: Some(self.config.locations().recipe_url(name)),
            catalog_updated,
            error: None,
        };
        (report, None)
    }
}

fn report_line(name: &str, stage: PackageStage, error: Option<String>) -> PackageReport {
    PackageReport {
        name: name.to_string(),
        stage,
        recipe_url: None,
        catalog_updated: false,
        error,
    }
}

fn failed_package(
    name: &str,
    stage: PackageStage,
    message: String,
) -> (PackageReport, Option<PipelineError>) {
    let report = report_line(name, PackageStage::Failed, Some(message.clone()));
    let error = PipelineError::Package {
        package: name.to_string(),
        stage,
        message,
    };
    (report, Some(error))
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Async mutexes keyed by name, created on first use and dropped with the
/// last guard
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// Exclusive access to one key of a [`KeyedLocks`]
pub struct KeyedGuard<'a> {
    owner: &'a KeyedLocks,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyedLocks {
    /// Wait for exclusive access to `key`
    pub async fn lock(&self, key: &str) -> KeyedGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(key.to_string()).or_default())
        };
        KeyedGuard {
            owner: self,
            key: key.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Number of keys currently tracked
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for KeyedGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();

        // Waiters clone the entry under the map lock, so a lone reference
        // means nobody else holds or waits for this key.
        let mut locks = self
            .owner
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.key);
        }
    }
}
