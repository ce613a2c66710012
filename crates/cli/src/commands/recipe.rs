//! Recipe command - write recipes for the packages of a task, or for the
//! rows of a cookbook

use anyhow::{Context, Result, bail};
use recipe_writer_adapters::cookbook::read_cookbook;
use recipe_writer_domain::usecases::RecipeOutcome;
use serde::Serialize;
use std::path::PathBuf;

use super::process::{RunOptions, build_pipeline};
use crate::args::RecipeArgs;
use crate::config::AppConfig;

#[derive(Debug, Serialize)]
struct RecipeLine {
    package: String,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pages: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl RecipeLine {
    fn from_outcome(package: String, outcome: RecipeOutcome) -> Self {
        let mut line = Self {
            package,
            status: "written",
            path: None,
            label: None,
            pages: None,
            message: None,
        };

        match outcome {
            RecipeOutcome::Written(written) => {
                line.path = Some(written.path);
                line.label = written.document.recipe.label;
                line.pages = Some(written.document.recipe.pages.len());
            }
            RecipeOutcome::Skipped { reason } => {
                line.status = "skipped";
                line.message = Some(reason);
            }
            RecipeOutcome::Failed { error } => {
                line.status = "failed";
                line.message = Some(error);
            }
        }

        line
    }
}

pub async fn execute(args: RecipeArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref())?;
    let pipeline = build_pipeline(
        &config,
        RunOptions {
            format_params: args.format_params.clone(),
            no_exif: args.no_exif,
            dry_run: true,
            ..RunOptions::default()
        },
    )?;

    let outcomes = match &args.cookbook {
        Some(path) => {
            let cookbook = read_cookbook(path)?;
            if !cookbook.skipped.is_empty() {
                eprintln!(
                    "Skipped {} cookbook rows with missing details (lines {})",
                    cookbook.skipped.len(),
                    cookbook
                        .skipped
                        .iter()
                        .map(u64::to_string)
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }
            pipeline
                .write_cookbook(&args.task_id, &cookbook.entries)
                .await
        }
        None => pipeline
            .write_recipes(&args.task_id, args.mmsid.as_deref(), args.title.as_deref())
            .await
            .with_context(|| format!("Failed to write recipes for task {}", args.task_id))?,
    };

    let lines: Vec<RecipeLine> = outcomes
        .into_iter()
        .map(|(name, outcome)| RecipeLine::from_outcome(name, outcome))
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&lines)?);
    } else {
        for line in &lines {
            match line.status {
                "written" => println!(
                    "✓ {}: {} pages, {}",
                    line.package,
                    line.pages.unwrap_or_default(),
                    line.path
                        .as_deref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_default()
                ),
                "skipped" => println!(
                    "- {}: {}",
                    line.package,
                    line.message.as_deref().unwrap_or_default()
                ),
                _ => println!(
                    "✗ {}: {}",
                    line.package,
                    line.message.as_deref().unwrap_or_default()
                ),
            }
        }
    }

    let failures: Vec<&RecipeLine> = lines.iter().filter(|l| l.status == "failed").collect();
    if let Some(first) = failures.first() {
        bail!(
            "{} of {} recipes failed; first: {}: {}",
            failures.len(),
            lines.len(),
            first.package,
            first.message.as_deref().unwrap_or_default()
        );
    }

    Ok(())
}
