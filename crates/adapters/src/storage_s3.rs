//! S3-compatible object store
//!
//! Credentials are passed in explicitly (read from the environment by the
//! CLI). Path-style addressing keeps MinIO and other S3-compatible services
//! working with a custom endpoint.

use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Credentials, Region, retry::RetryConfig},
    error::DisplayErrorContext,
    primitives::ByteStream,
};
use recipe_writer_domain::{ObjectStore, StorageError};
use secrecy::{ExposeSecret, SecretString};
use std::path::Path;

/// Bucket used for derivative packages
pub const DEFAULT_BUCKET: &str = "ul-bagit";

/// Object store writing to a single S3 bucket
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(
        bucket: impl Into<String>,
        region: impl Into<String>,
        endpoint: Option<String>,
        access_key: &SecretString,
        secret_key: &SecretString,
    ) -> Self {
        let credentials = Credentials::new(
            access_key.expose_secret(),
            secret_key.expose_secret(),
            None,
            None,
            "recipe-writer-config",
        );
        let mut config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(region.into()))
            // 1 initial attempt + 3 retries with exponential backoff
            .retry_config(RetryConfig::standard().with_max_attempts(4))
            .force_path_style(true);
        if let Some(endpoint_url) = endpoint {
            config_builder = config_builder.endpoint_url(endpoint_url);
        }

        Self {
            client: Client::from_conf(config_builder.build()),
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, key: &str, local_path: &Path) -> Result<(), StorageError> {
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| StorageError::Upload {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| StorageError::Upload {
                key: key.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        tracing::debug!(bucket = %self.bucket, key = %key, "Uploaded object");
        Ok(())
    }

    fn location(&self) -> String {
        format!("s3://{}", self.bucket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store(endpoint: Option<String>) -> S3ObjectStore {
        S3ObjectStore::new(
            DEFAULT_BUCKET,
            "us-east-1",
            endpoint,
            &SecretString::new("access".into()),
            &SecretString::new("secret".into()),
        )
    }

    #[test]
    fn test_location() {
        assert_eq!(store(None).location(), "s3://ul-bagit");
    }

    #[tokio::test]
    async fn test_put_uses_path_style_key() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/ul-bagit/derivative/bag1/data/001.tif"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"image").unwrap();

        store(Some(mock_server.uri()))
            .put("derivative/bag1/data/001.tif", file.path())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_put_missing_file() {
        let result = store(None)
            .put("derivative/bag1/x.tif", Path::new("/nonexistent/x.tif"))
            .await;

        assert!(matches!(result, Err(StorageError::Upload { .. })));
    }
}
