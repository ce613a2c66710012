//! Alma bibliographic record adapter

use async_trait::async_trait;
use recipe_writer_domain::{BibRecord, BibliographicSource};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Alma REST API base URL (North America)
pub const DEFAULT_BASE_URL: &str = "https://api-na.hosted.exlibrisgroup.com/almaws/v1";

/// Default location of the API key file
pub const DEFAULT_API_KEY_PATH: &str = "/code/alma_api_key";

/// Errors raised while fetching a record; never leave the adapter
#[derive(Debug, Error)]
pub enum BibliographicError {
    #[error("API key unavailable at {path}: {message}")]
    CredentialUnavailable { path: String, message: String },
    #[error("Network error: {0}")]
    Transport(String),
    #[error("Alma returned HTTP {0}")]
    Status(u16),
}

/// Fetches bib records from Alma by MMS ID
pub struct AlmaBibSource {
    client: Client,
    base_url: String,
    api_key_path: PathBuf,
}

impl AlmaBibSource {
    pub fn new(api_key_path: impl Into<PathBuf>) -> Result<Self, BibliographicError> {
        Self::with_base_url(api_key_path, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(
        api_key_path: impl Into<PathBuf>,
        base_url: impl Into<String>,
    ) -> Result<Self, BibliographicError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| BibliographicError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key_path: api_key_path.into(),
        })
    }

    pub fn api_key_path(&self) -> &Path {
        &self.api_key_path
    }

    /// Read the API key; it is re-read for every request so rotations apply
    pub fn api_key(&self) -> Result<SecretString, BibliographicError> {
        let unavailable = |message: String| BibliographicError::CredentialUnavailable {
            path: self.api_key_path.display().to_string(),
            message,
        };

        let key = std::fs::read_to_string(&self.api_key_path).map_err(|e| unavailable(e.to_string()))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(unavailable("empty key file".to_string()));
        }

        Ok(SecretString::new(key.into()))
    }

    async fn request(&self, catalog_id: &str) -> Result<BibRecord, BibliographicError> {
        let api_key = self.api_key()?;
        let url = format!("{}/bibs/{}", self.base_url, catalog_id);

        let response = self
            .client
            .get(&url)
            .query(&[("expand", "None"), ("apikey", api_key.expose_secret())])
            .send()
            .await
            .map_err(|e| BibliographicError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BibliographicError::Status(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| BibliographicError::Transport(e.without_url().to_string()))?;

        Ok(BibRecord {
            catalog_id: catalog_id.to_string(),
            body: body.to_vec(),
        })
    }
}

#[async_trait]
impl BibliographicSource for AlmaBibSource {
    async fn fetch_record(&self, catalog_id: &str) -> Option<BibRecord> {
        tracing::info!(catalog_id = %catalog_id, "Fetching bibliographic record");

        match self.request(catalog_id).await {
            Ok(record) => {
                tracing::debug!(catalog_id = %catalog_id, bytes = record.body.len(), "Fetched bibliographic record");
                Some(record)
            }
            Err(e) => {
                tracing::error!(catalog_id = %catalog_id, error = %e, "Failed to fetch bibliographic record");
                None
            }
        }
    }
}
