//! Bag command - turn derivative directories into packages

use anyhow::{Context, Result, bail};
use std::path::PathBuf;

use super::process::{RunOptions, build_pipeline};
use crate::args::BagArgs;
use crate::config::AppConfig;

pub async fn execute(args: BagArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref())?;
    let pipeline = build_pipeline(
        &config,
        RunOptions {
            no_update_manifests: args.no_update_manifests,
            dry_run: true,
            ..RunOptions::default()
        },
    )?;

    let results = pipeline
        .bag_derivatives(&args.task_id)
        .await
        .with_context(|| format!("Failed to bag task {}", args.task_id))?;

    let mut failed = 0;
    for (name, result) in &results {
        match result {
            Ok(package) => println!("✓ {}: {}", name, package.path.display()),
            Err(e) => {
                failed += 1;
                println!("✗ {}: {}", name, e);
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} directories failed to bag", failed, results.len());
    }

    println!("Bagged {} directories", results.len());
    Ok(())
}
