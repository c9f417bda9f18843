//! Cloud Storage access for batch results.
//!
//! Batch processing writes one or more `Document` JSON files per input under
//! a `gs://` prefix; this module lists and downloads them through the JSON API.

use std::sync::{Arc, OnceLock};

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::TokenProvider;

const STORAGE_BASE_URL: &str = "https://storage.googleapis.com";

/// Split `gs://bucket/prefix` into bucket and prefix.
pub fn parse_gcs_uri(uri: &str) -> Option<(String, String)> {
    static GCS_URI: OnceLock<Regex> = OnceLock::new();
    let re = GCS_URI.get_or_init(|| Regex::new(r"^gs://(.*?)/(.*)$").expect("valid gs:// regex"));

    let caps = re.captures(uri)?;
    let bucket = caps.get(1)?.as_str();
    if bucket.is_empty() {
        return None;
    }
    Some((bucket.to_string(), caps.get(2)?.as_str().to_string()))
}

/// Listing entry for a stored object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// uint64 encoded as a string by the JSON API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}

impl ObjectInfo {
    /// Document AI only writes JSON, but anything else under the prefix is skipped.
    pub fn is_json(&self) -> bool {
        self.name.contains(".json")
    }
}

/// Object listing and download.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectInfo>>;
    async fn download(&self, bucket: &str, name: &str) -> Result<Vec<u8>>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    items: Vec<ObjectInfo>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// Cloud Storage JSON API client.
#[derive(Clone)]
pub struct GcsClient {
    http: reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
    base_url: String,
}

impl GcsClient {
    pub fn new(http: reqwest::Client, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            http,
            tokens,
            base_url: STORAGE_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn object_url(&self, bucket: &str, name: Option<&str>) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .with_context(|| format!("Invalid storage base URL: {}", self.base_url))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| anyhow::anyhow!("Storage base URL cannot be a base: {}", self.base_url))?;
            segments
                .pop_if_empty()
                .extend(["storage", "v1", "b", bucket, "o"]);
            if let Some(name) = name {
                // Pushed as one segment so `/` in object names is percent-encoded.
                segments.push(name);
            }
        }
        Ok(url)
    }
}

#[async_trait::async_trait]
impl ObjectStore for GcsClient {
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectInfo>> {
        let url = self.object_url(bucket, None)?;
        let token = self.tokens.access_token().await?;

        let mut objects = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http
                .get(url.clone())
                .bearer_auth(&token)
                .query(&[("prefix", prefix)]);
            if let Some(ref pt) = page_token {
                request = request.query(&[("pageToken", pt.as_str())]);
            }

            let resp = request
                .send()
                .await
                .with_context(|| format!("Failed to list gs://{}/{}", bucket, prefix))?;

            let status = resp.status();
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                anyhow::bail!("Cloud Storage list error ({}): {}", status, text);
            }

            let page: ListResponse = resp
                .json()
                .await
                .context("Failed to parse Cloud Storage listing")?;

            debug!(
                "Listed {} object(s) under gs://{}/{}",
                page.items.len(),
                bucket,
                prefix
            );
            objects.extend(page.items);

            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }

        Ok(objects)
    }

    async fn download(&self, bucket: &str, name: &str) -> Result<Vec<u8>> {
        let url = self.object_url(bucket, Some(name))?;
        let token = self.tokens.access_token().await?;

        let resp = self
            .http
            .get(url)
            .bearer_auth(&token)
            .query(&[("alt", "media")])
            .send()
            .await
            .with_context(|| format!("Failed to download gs://{}/{}", bucket, name))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Cloud Storage download error ({}): {}", status, text);
        }

        Ok(resp.bytes().await?.to_vec())
    }
}
