//! Client for the managed face-collection service.
//!
//! The service owns embedding storage and similarity search behind a named
//! collection: faces are registered under an external image id (the
//! identity key) and searched by image, returning matches with a similarity
//! percentage in [0, 100] that is treated as authoritative.

use crate::error::{error_for_response, Error, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default per-request timeout; collection calls cross a process boundary
/// and must not hang a match request indefinitely.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Face-collection client configuration.
#[derive(Debug, Clone)]
pub struct CollectionConfig {
    pub base_url: String,
    pub api_key: String,
    pub collection_id: String,
    pub timeout: Duration,
}

/// One match returned by a search-by-image call.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectionMatch {
    /// The external image id the face was registered under (the identity key).
    pub external_image_id: String,
    /// Similarity percentage in [0, 100], as reported by the service.
    pub similarity: f32,
}

#[derive(Deserialize)]
struct ListCollectionsResponse {
    #[serde(default)]
    collection_ids: Vec<String>,
}

#[derive(Serialize)]
struct CreateCollectionRequest<'a> {
    collection_id: &'a str,
}

#[derive(Serialize)]
struct IndexFaceRequest<'a> {
    external_image_id: &'a str,
    image: String,
}

#[derive(Serialize)]
struct SearchRequest {
    image: String,
    max_matches: u32,
    min_similarity: f32,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    matches: Vec<CollectionMatch>,
}

/// Client for the face-collection service.
#[derive(Debug)]
pub struct FaceCollectionClient {
    http: reqwest::Client,
    config: CollectionConfig,
}

impl FaceCollectionClient {
    /// Create a client. Fails on empty credentials or collection id so
    /// misconfiguration surfaces at startup, not mid-request.
    pub fn new(config: CollectionConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(Error::Config("face collection api_key must be non-empty".into()));
        }
        if config.collection_id.is_empty() {
            return Err(Error::Config("face collection id must be non-empty".into()));
        }
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { http, config })
    }

    pub fn collection_id(&self) -> &str {
        &self.config.collection_id
    }

    /// Ensure the named collection exists, creating it if absent.
    ///
    /// Idempotent: an already-exists conflict (e.g. another process won the
    /// creation race between our list and create calls) is success.
    pub async fn ensure_collection(&self) -> Result<()> {
        let url = format!("{}/v1/collections", self.config.base_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.config.api_key)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error_for_response(response).await);
        }
        let listing: ListCollectionsResponse = response.json().await?;

        if listing.collection_ids.iter().any(|id| id == &self.config.collection_id) {
            tracing::debug!(collection = %self.config.collection_id, "collection already exists");
            return Ok(());
        }

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&CreateCollectionRequest {
                collection_id: &self.config.collection_id,
            })
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::CONFLICT {
            tracing::debug!(collection = %self.config.collection_id, "collection created concurrently");
            return Ok(());
        }
        if !response.status().is_success() {
            return Err(error_for_response(response).await);
        }

        tracing::info!(collection = %self.config.collection_id, "created face collection");
        Ok(())
    }

    /// Register a face image under the given external id. Re-registering an
    /// id replaces the face the service associates with it.
    pub async fn index_face(&self, external_image_id: &str, image: &[u8]) -> Result<()> {
        let url = format!(
            "{}/v1/collections/{}/faces",
            self.config.base_url, self.config.collection_id
        );
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&IndexFaceRequest {
                external_image_id,
                image: BASE64.encode(image),
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_for_response(response).await);
        }
        tracing::debug!(external_image_id, "indexed face in collection");
        Ok(())
    }

    /// Search the collection by image, returning up to `max_matches` faces
    /// at or above `min_similarity` percent, best first.
    pub async fn search_by_image(
        &self,
        image: &[u8],
        max_matches: u32,
        min_similarity: f32,
    ) -> Result<Vec<CollectionMatch>> {
        let url = format!(
            "{}/v1/collections/{}/search",
            self.config.base_url, self.config.collection_id
        );
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&SearchRequest {
                image: BASE64.encode(image),
                max_matches,
                min_similarity,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_for_response(response).await);
        }
        let result: SearchResponse = response.json().await?;
        Ok(result.matches)
    }
}
