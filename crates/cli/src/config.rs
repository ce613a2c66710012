//! Configuration loading and management

use anyhow::{Context, Result};
use recipe_writer_adapters::{bibliographic, storage};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default config file, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "./recipe-writer.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub bibliographic: BibliographicConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub catalog: CatalogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Root of the static data area holding `oulib_tasks/`
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    #[serde(default = "default_hostname")]
    pub hostname: String,

    #[serde(default = "default_derivative_base_url")]
    pub derivative_base_url: String,

    #[serde(default = "default_image_marker")]
    pub image_marker: String,

    #[serde(default = "default_true")]
    pub include_exif: bool,

    #[serde(default = "default_owner_identifier")]
    pub owner_identifier: String,

    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    #[serde(default = "default_true")]
    pub update_manifests: bool,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BibliographicConfig {
    #[serde(default = "default_bibliographic_base_url")]
    pub base_url: String,

    #[serde(default = "default_api_key_path")]
    pub api_key_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_bucket")]
    pub bucket: String,

    #[serde(default = "default_destination")]
    pub destination: String,

    #[serde(default = "default_region")]
    pub region: String,

    /// Custom endpoint for S3-compatible services
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_access_key_env")]
    pub access_key_env: String,

    #[serde(default = "default_secret_key_env")]
    pub secret_key_env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Catalog collection URL; empty means `{hostname}/api/catalog/data/catalog/digital_objects`
    #[serde(default)]
    pub base_url: String,

    #[serde(default = "default_catalog_token_env")]
    pub token_env: String,
}

// Default value functions
fn default_base_dir() -> PathBuf {
    PathBuf::from("/data/web_data/static")
}

fn default_hostname() -> String {
    "https://cc.lib.ou.edu".to_string()
}

fn default_derivative_base_url() -> String {
    "https://bag.ou.edu/derivative".to_string()
}

fn default_image_marker() -> String {
    recipe_writer_domain::manifest::DEFAULT_IMAGE_MARKER.to_string()
}

fn default_owner_identifier() -> String {
    "University of Oklahoma Libraries".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_concurrent() -> usize {
    4
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_bibliographic_base_url() -> String {
    bibliographic::DEFAULT_BASE_URL.to_string()
}

fn default_api_key_path() -> PathBuf {
    PathBuf::from(bibliographic::DEFAULT_API_KEY_PATH)
}

fn default_bucket() -> String {
    storage::DEFAULT_BUCKET.to_string()
}

fn default_destination() -> String {
    "derivative".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_access_key_env() -> String {
    "AWS_ACCESS_KEY_ID".to_string()
}

fn default_secret_key_env() -> String {
    "AWS_SECRET_ACCESS_KEY".to_string()
}

fn default_catalog_token_env() -> String {
    "CATALOG_TOKEN".to_string()
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            hostname: default_hostname(),
            derivative_base_url: default_derivative_base_url(),
            image_marker: default_image_marker(),
            include_exif: default_true(),
            owner_identifier: default_owner_identifier(),
            max_concurrent: default_max_concurrent(),
            update_manifests: default_true(),
            log_level: default_log_level(),
        }
    }
}

impl Default for BibliographicConfig {
    fn default() -> Self {
        Self {
            base_url: default_bibliographic_base_url(),
            api_key_path: default_api_key_path(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            bucket: default_bucket(),
            destination: default_destination(),
            region: default_region(),
            endpoint: None,
            access_key_env: default_access_key_env(),
            secret_key_env: default_secret_key_env(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: String::new(),
            token_env: default_catalog_token_env(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        // Try default config path if none specified
        let default_path = PathBuf::from(DEFAULT_CONFIG_PATH);
        let path = config_path.unwrap_or(&default_path);

        if path.exists() {
            builder = builder.add_source(config::File::from(path));
        } else if config_path.is_some() {
            // User specified a path that doesn't exist
            anyhow::bail!("Config file not found: {}", path.display());
        }

        // Add environment variable overrides
        builder = builder.add_source(
            config::Environment::with_prefix("RECIPE_WRITER")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Catalog collection URL, derived from the hostname when not set
    pub fn catalog_base_url(&self) -> String {
        if self.catalog.base_url.trim().is_empty() {
            format!(
                "{}/api/catalog/data/catalog/digital_objects",
                self.general.hostname.trim_end_matches('/')
            )
        } else {
            self.catalog.base_url.clone()
        }
    }

    /// Generate example configuration as TOML string
    pub fn example_toml() -> String {
        r#"# recipe-writer configuration
# Every key can be overridden with RECIPE_WRITER__<SECTION>__<KEY>

[general]
base_dir = "/data/web_data/static"
hostname = "https://cc.lib.ou.edu"
derivative_base_url = "https://bag.ou.edu/derivative"
image_marker = "tif"
include_exif = true
owner_identifier = "University of Oklahoma Libraries"
max_concurrent = 4
update_manifests = true
log_level = "info"

[bibliographic]
base_url = "https://api-na.hosted.exlibrisgroup.com/almaws/v1"
api_key_path = "/code/alma_api_key"

[storage]
enabled = true
bucket = "ul-bagit"
destination = "derivative"
region = "us-east-1"
# endpoint = "http://localhost:9000"
access_key_env = "AWS_ACCESS_KEY_ID"
secret_key_env = "AWS_SECRET_ACCESS_KEY"

[catalog]
enabled = false
# base_url = "https://cc.lib.ou.edu/api/catalog/data/catalog/digital_objects"
token_env = "CATALOG_TOKEN"
"#
        .to_string()
    }
}
