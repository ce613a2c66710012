//! Package catalog adapter (REST API with token auth)

use async_trait::async_trait;
use recipe_writer_domain::{CatalogClient, CatalogError, CatalogRecord};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

/// Catalog client speaking the catalog's JSON query API
pub struct HttpCatalog {
    client: Option<Client>,
    base_url: String,
    token: SecretString,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    count: u64,
    #[serde(default)]
    results: Vec<CatalogRecord>,
}

impl HttpCatalog {
    pub fn new(base_url: impl Into<String>, token: SecretString) -> Result<Self, CatalogError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CatalogError::Transport(e.to_string()))?;

        Ok(Self {
            client: Some(client),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Catalog that is never contacted
    pub fn disabled() -> Self {
        Self {
            client: None,
            base_url: String::new(),
            token: SecretString::new("".into()),
        }
    }

    fn client(&self) -> Result<&Client, CatalogError> {
        self.client
            .as_ref()
            .ok_or_else(|| CatalogError::Transport("Catalog is disabled".to_string()))
    }

    fn authorization(&self) -> String {
        format!("Token {}", self.token.expose_secret())
    }
}

#[async_trait]
impl CatalogClient for HttpCatalog {
    async fn find(&self, package: &str) -> Result<Option<CatalogRecord>, CatalogError> {
        let client = self.client()?;
        let url = format!("{}/", self.base_url);
        let query = serde_json::json!({ "filter": { "bag": package } }).to_string();

        tracing::debug!(package = %package, "Searching catalog");

        let response = client
            .get(&url)
            .query(&[("query", query.as_str()), ("format", "json")])
            .header("Authorization", self.authorization())
            .send()
            .await
            .map_err(|e| CatalogError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::InvalidResponse(format!(
                "search returned {}: {}",
                status.as_u16(),
                body
            )));
        }

        let search: SearchResponse = response
            .json()
            .await
            .map_err(|e| CatalogError::InvalidResponse(e.to_string()))?;

        if search.count > 1 || search.results.len() > 1 {
            tracing::warn!(package = %package, count = search.count, "Several catalog entries, using the first");
        }

        Ok(search.results.into_iter().next())
    }

    async fn update(&self, record: &CatalogRecord) -> Result<(), CatalogError> {
        let client = self.client()?;
        let url = format!("{}/", self.base_url);

        let response = client
            .post(&url)
            .query(&[("format", "json")])
            .header("Authorization", self.authorization())
            .json(record)
            .send()
            .await
            .map_err(|e| CatalogError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::Conflict {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.client.is_some()
    }
}
