//! Process command - full run for one task

use anyhow::{Context, Result, bail};
use recipe_writer_adapters::{
    bibliographic::AlmaBibSource,
    catalog::HttpCatalog,
    packages::FsPackageStore,
    storage::{MemoryObjectStore, S3ObjectStore},
};
use recipe_writer_domain::{
    BagList, ObjectStore, SystemClock, TaskInput,
    usecases::{PackageReport, Pipeline, PipelineConfig},
};
use secrecy::SecretString;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::args::ProcessArgs;
use crate::config::AppConfig;

/// Pipeline wired with the production adapters
pub(crate) type AppPipeline =
    Pipeline<FsPackageStore, AlmaBibSource, dyn ObjectStore, HttpCatalog, SystemClock>;

/// Per-run switches layered over the configuration
#[derive(Debug, Clone, Default)]
pub(crate) struct RunOptions {
    pub format_params: Option<String>,
    pub no_exif: bool,
    pub no_update_manifests: bool,
    pub remove_local: bool,
    pub dry_run: bool,
}

#[derive(Serialize)]
struct ProcessOutput<'a> {
    task_id: &'a str,
    recipe_urls: &'a [String],
    packages: &'a [PackageReport],
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub async fn execute(args: ProcessArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref())?;
    let input = task_input(&args)?;

    if args.dry_run && args.rm_local {
        tracing::warn!("Dry run: local packages are kept");
    }

    let pipeline = build_pipeline(
        &config,
        RunOptions {
            remove_local: args.rm_local && !args.dry_run,
            dry_run: args.dry_run,
            ..RunOptions::default()
        },
    )?;

    let report = pipeline
        .process(&input, args.mmsid.as_deref(), args.title.as_deref())
        .await
        .context("Task processing failed")?;

    let first_error = report.first_error.as_ref().map(|e| e.to_string());

    if args.json {
        let output = ProcessOutput {
            task_id: &report.task_id,
            recipe_urls: &report.recipe_urls,
            packages: &report.packages,
            error: first_error.clone(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("Task {}", report.task_id);
        for package in &report.packages {
            match &package.error {
                None => println!(
                    "✓ {} ({}){}",
                    package.name,
                    package.stage,
                    package
                        .recipe_url
                        .as_deref()
                        .map(|url| format!(": {}", url))
                        .unwrap_or_default()
                ),
                Some(error) => println!("✗ {} ({}): {}", package.name, package.stage, error),
            }
        }
    }

    let failed = report.packages.iter().filter(|p| p.error.is_some()).count();
    let total = report.packages.len();
    report
        .into_result()
        .with_context(|| format!("{} of {} packages failed", failed, total))?;

    Ok(())
}

/// Task input from `--input` or from the individual flags
fn task_input(args: &ProcessArgs) -> Result<TaskInput> {
    if let Some(path) = &args.input {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read task input: {}", path.display()))?;
        return serde_json::from_str(&content)
            .with_context(|| format!("Invalid task input: {}", path.display()));
    }

    Ok(TaskInput {
        task_id: args.task_id.clone(),
        s3_bags: args.bags.clone().map(BagList::One),
        format_parameters: args.format_params.clone(),
    })
}

/// Build the pipeline from configuration.
///
/// Dry runs record uploads in memory and never contact the catalog.
pub(crate) fn build_pipeline(config: &AppConfig, options: RunOptions) -> Result<AppPipeline> {
    let packages = Arc::new(FsPackageStore::new(&config.general.base_dir));

    let bibliographic = Arc::new(
        AlmaBibSource::with_base_url(
            &config.bibliographic.api_key_path,
            &config.bibliographic.base_url,
        )
        .context("Failed to create bibliographic client")?,
    );

    let objects: Arc<dyn ObjectStore> = if options.dry_run || !config.storage.enabled {
        if !options.dry_run {
            tracing::warn!("Object storage disabled; uploads are only recorded");
        }
        Arc::new(MemoryObjectStore::new())
    } else {
        let access_key = load_secret(&config.storage.access_key_env, "object storage")?;
        let secret_key = load_secret(&config.storage.secret_key_env, "object storage")?;
        Arc::new(S3ObjectStore::new(
            &config.storage.bucket,
            &config.storage.region,
            config.storage.endpoint.clone(),
            &access_key,
            &secret_key,
        ))
    };

    let sync_catalog = config.catalog.enabled && !options.dry_run;
    let catalog = if sync_catalog {
        let token = load_secret(&config.catalog.token_env, "catalog")?;
        HttpCatalog::new(config.catalog_base_url(), token)
            .context("Failed to create catalog client")?
    } else {
        HttpCatalog::disabled()
    };

    tracing::debug!(
        base_dir = %config.general.base_dir.display(),
        storage = %objects.location(),
        catalog = sync_catalog,
        "Pipeline configured"
    );

    let pipeline_config = PipelineConfig {
        include_exif: config.general.include_exif && !options.no_exif,
        format_params: options.format_params,
        sync_catalog,
        image_marker: config.general.image_marker.clone(),
        update_manifests: config.general.update_manifests && !options.no_update_manifests,
        owner_identifier: config.general.owner_identifier.clone(),
        base_url: config.general.derivative_base_url.clone(),
        destination: config.storage.destination.clone(),
        max_concurrent: config.general.max_concurrent,
        remove_local: options.remove_local,
    };

    Ok(Pipeline::new(
        packages,
        bibliographic,
        objects,
        Arc::new(catalog),
        Arc::new(SystemClock),
        pipeline_config,
    ))
}

/// Read a secret from an environment variable
pub(crate) fn load_secret(env_var: &str, purpose: &str) -> Result<SecretString> {
    if env_var.trim().is_empty() {
        bail!("No credential env var configured for {}", purpose);
    }

    let value = std::env::var(env_var)
        .with_context(|| format!("Missing env var {} for {}", env_var, purpose))?;

    if value.trim().is_empty() {
        bail!("Env var {} is empty for {}", env_var, purpose);
    }

    Ok(SecretString::new(value.into()))
}
