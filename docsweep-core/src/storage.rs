//! Storage-bucket label reads.
//!
//! [`HttpStorageClient`] implements the [`BucketStore`] contract over the
//! cloud storage JSON API, fetching only the label mapping of a bucket.
//! Labels are read once per event and never cached; the read-then-act race
//! against a concurrent label change is accepted.

use std::collections::HashMap;
use std::env;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{error, info};

use crate::contract::{BucketStore, ClientError, ACCESS_TOKEN_ENV};

pub const STORAGE_API_BASE: &str = "https://storage.googleapis.com/storage/v1";

/// Informational label read by the standalone checker.
pub const PII_LABEL: &str = "pii";

#[derive(Debug, Deserialize)]
struct BucketResource {
    #[serde(default)]
    labels: HashMap<String, String>,
}

/// Real [`BucketStore`] over the storage JSON API.
pub struct HttpStorageClient {
    http: reqwest::Client,
    token: String,
    base_url: String,
}

impl HttpStorageClient {
    /// Construct from the environment (bearer token).
    pub fn new_from_env() -> Result<Self, ClientError> {
        match env::var(ACCESS_TOKEN_ENV) {
            Ok(token) => Ok(Self::new(token, STORAGE_API_BASE.to_string())),
            Err(e) => {
                error!(error = ?e, var = ACCESS_TOKEN_ENV, "Access token missing in environment");
                Err(Box::new(e))
            }
        }
    }

    pub fn new(token: String, base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            token,
            base_url,
        }
    }
}

#[async_trait]
impl BucketStore for HttpStorageClient {
    async fn bucket_labels(
        &self,
        bucket_name: &str,
    ) -> Result<HashMap<String, String>, ClientError> {
        let url = format!("{}/b/{}?fields=labels", self.base_url, bucket_name);
        info!(bucket = %bucket_name, "Fetching bucket labels");

        let response = self.http.get(&url).bearer_auth(&self.token).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(bucket = %bucket_name, status = %status, body = %body, "Bucket metadata fetch failed");
            return Err(format!("storage API error for bucket '{bucket_name}': {status}").into());
        }

        let resource = response.json::<BucketResource>().await?;
        info!(bucket = %bucket_name, labels = resource.labels.len(), "Fetched bucket labels");
        Ok(resource.labels)
    }
}
