//! CLI argument definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// recipe-writer: bag derivative packages and write their import recipes
#[derive(Parser, Debug)]
#[command(name = "recipe-writer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Turn every derivative directory of a task into a package
    Bag(BagArgs),

    /// Write recipes for every package of a task
    Recipe(RecipeArgs),

    /// Bag, describe, upload and catalog the listed packages of a task
    Process(ProcessArgs),

    /// Configuration management
    Config(ConfigArgs),

    /// Validate configuration and show status
    Doctor(DoctorArgs),
}

#[derive(Args, Debug)]
pub struct BagArgs {
    /// Task whose derivative area is bagged
    pub task_id: String,

    /// Keep existing payload manifests instead of regenerating them
    #[arg(long)]
    pub no_update_manifests: bool,
}

#[derive(Args, Debug)]
pub struct RecipeArgs {
    /// Task whose packages are described
    pub task_id: String,

    /// MMS ID of the bibliographic record
    #[arg(long)]
    pub mmsid: Option<String>,

    /// Recipe label, overriding the bibliographic title
    #[arg(long)]
    pub title: Option<String>,

    /// CSV with `MMS ID`, `Title` and `File name` columns, one package per row
    #[arg(long, conflicts_with_all = ["mmsid", "title"])]
    pub cookbook: Option<PathBuf>,

    /// Derivative format, e.g. jpeg_040_antialias
    #[arg(long)]
    pub format_params: Option<String>,

    /// Do not reference EXIF sidecars
    #[arg(long)]
    pub no_exif: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ProcessArgs {
    /// Task input file (`{"task_id", "s3_bags", "format_parameters"}`)
    #[arg(long, conflicts_with_all = ["task_id", "bags", "format_params"])]
    pub input: Option<PathBuf>,

    /// Task id
    #[arg(long)]
    pub task_id: Option<String>,

    /// Package names, comma-separated
    #[arg(long)]
    pub bags: Option<String>,

    /// Derivative format, e.g. jpeg_040_antialias
    #[arg(long)]
    pub format_params: Option<String>,

    /// MMS ID of the bibliographic record
    #[arg(long)]
    pub mmsid: Option<String>,

    /// Recipe label, overriding the bibliographic title
    #[arg(long)]
    pub title: Option<String>,

    /// Delete local packages after a successful upload
    #[arg(long)]
    pub rm_local: bool,

    /// Record uploads in memory and skip the catalog
    #[arg(long)]
    pub dry_run: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Generate example configuration file
    Init {
        /// Path to write config file
        #[arg(long, default_value = "./recipe-writer.toml")]
        path: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Debug)]
pub struct DoctorArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}
