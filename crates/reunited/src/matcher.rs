//! Matching strategies.
//!
//! One polymorphic capability with two interchangeable implementations,
//! selected once at startup: [`LocalMatcher`] scans the registry's stored
//! embeddings exhaustively, [`RemoteMatcher`] delegates storage and
//! nearest-neighbor search to the managed face-collection service. Callers
//! depend only on the [`Matcher`] trait.

use reunite_core::{CandidateSource, Embedding};
use reunite_providers::FaceCollectionClient;
use reunite_registry::Registry;
use thiserror::Error;

pub const DEFAULT_DISTANCE_CUTOFF: f32 = 0.6;
pub const DEFAULT_REMOTE_MAX_MATCHES: u32 = 5;
pub const DEFAULT_REMOTE_MIN_SIMILARITY: f32 = 80.0;

/// The backing store or service could not be searched. Distinct from an
/// empty match list: callers must be able to tell "no matches" apart from
/// "could not search".
#[derive(Error, Debug)]
pub enum MatcherError {
    #[error("match backend unavailable: {0}")]
    Unavailable(String),
}

/// A new identity to index, produced by a validated enrollment.
pub struct NewEnrollment<'a> {
    pub key: &'a str,
    pub display_name: &'a str,
    pub reference_image: &'a str,
    pub image: &'a [u8],
    pub embedding: &'a Embedding,
}

/// One match query. Carries both forms a strategy may need: the query
/// embedding (local scan) and the original image bytes (the remote service
/// searches by image).
pub struct MatchQuery<'a> {
    pub embedding: &'a Embedding,
    pub image: &'a [u8],
}

/// A qualifying match from a strategy, ranked best-first.
#[derive(Debug, Clone)]
pub struct ScoredMatch {
    pub key: String,
    /// Confidence in [0, 100], rounded to 2 decimals.
    pub confidence: f32,
    pub source: CandidateSource,
}

/// Given a query, return scored candidates above the configured threshold.
pub trait Matcher {
    /// Short strategy label for status reporting.
    fn describe(&self) -> &'static str;

    /// Index a newly enrolled identity. Upsert semantics: re-indexing a key
    /// replaces what it previously mapped to.
    async fn index(&self, enrollment: &NewEnrollment<'_>) -> Result<(), MatcherError>;

    /// Search for identities matching the query, best first.
    async fn search(&self, query: MatchQuery<'_>) -> Result<Vec<ScoredMatch>, MatcherError>;
}

/// Round a percentage to 2 decimals for presentation.
fn round2(pct: f32) -> f32 {
    (pct * 100.0).round() / 100.0
}

/// Convert a Euclidean distance into a confidence percentage.
///
/// Meaningful because embeddings are L2-normalized by the encoder: distance
/// 0 means identical, and same-identity pairs sit well below 1.0. Distances
/// past 1.0 (possible up to 2.0 for opposed unit vectors) clamp to 0 rather
/// than going negative.
pub fn distance_to_confidence(distance: f32) -> f32 {
    round2(((1.0 - distance) * 100.0).clamp(0.0, 100.0))
}

/// Exhaustive scan over the registry's stored embeddings.
pub struct LocalMatcher {
    registry: Registry,
    distance_cutoff: f32,
}

impl LocalMatcher {
    pub fn new(registry: Registry, distance_cutoff: f32) -> Self {
        Self { registry, distance_cutoff }
    }
}

impl Matcher for LocalMatcher {
    fn describe(&self) -> &'static str {
        "local"
    }

    async fn index(&self, enrollment: &NewEnrollment<'_>) -> Result<(), MatcherError> {
        self.registry
            .enroll(
                enrollment.key,
                enrollment.display_name,
                enrollment.reference_image,
                Some(enrollment.embedding),
            )
            .await
            .map_err(|e| MatcherError::Unavailable(e.to_string()))
    }

    async fn search(&self, query: MatchQuery<'_>) -> Result<Vec<ScoredMatch>, MatcherError> {
        let snapshot = self
            .registry
            .all()
            .await
            .map_err(|e| MatcherError::Unavailable(e.to_string()))?;

        let mut matches = Vec::new();
        for identity in snapshot {
            let Some(embedding) = identity.embedding else {
                tracing::warn!(key = %identity.key, "identity has no stored embedding; skipping");
                continue;
            };
            let distance = embedding.euclidean_distance(query.embedding);
            // Strictly below the cutoff qualifies; at or above is excluded
            // entirely, not ranked lower.
            if distance < self.distance_cutoff {
                matches.push(ScoredMatch {
                    key: identity.key,
                    confidence: distance_to_confidence(distance),
                    source: CandidateSource::Registry,
                });
            }
        }

        // Stable sort over the key-ordered snapshot keeps results
        // deterministic for a fixed snapshot and query.
        matches.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(matches)
    }
}

/// Delegates storage and search to the managed face-collection service; the
/// registry holds only the display metadata, keyed identically.
pub struct RemoteMatcher {
    client: FaceCollectionClient,
    registry: Registry,
    max_matches: u32,
    min_similarity: f32,
}

impl RemoteMatcher {
    pub fn new(
        client: FaceCollectionClient,
        registry: Registry,
        max_matches: u32,
        min_similarity: f32,
    ) -> Self {
        Self { client, registry, max_matches, min_similarity }
    }
}

impl Matcher for RemoteMatcher {
    fn describe(&self) -> &'static str {
        "remote"
    }

    async fn index(&self, enrollment: &NewEnrollment<'_>) -> Result<(), MatcherError> {
        self.client
            .index_face(enrollment.key, enrollment.image)
            .await
            .map_err(|e| MatcherError::Unavailable(e.to_string()))?;

        // Side-table row only: the collection owns the vector.
        self.registry
            .enroll(
                enrollment.key,
                enrollment.display_name,
                enrollment.reference_image,
                None,
            )
            .await
            .map_err(|e| MatcherError::Unavailable(e.to_string()))
    }

    async fn search(&self, query: MatchQuery<'_>) -> Result<Vec<ScoredMatch>, MatcherError> {
        let matches = self
            .client
            .search_by_image(query.image, self.max_matches, self.min_similarity)
            .await
            .map_err(|e| MatcherError::Unavailable(e.to_string()))?;

        // The service's similarity percentage is authoritative; no local
        // recomputation, just clamp-and-round for presentation.
        Ok(matches
            .into_iter()
            .map(|m| ScoredMatch {
                key: m.external_image_id,
                confidence: round2(m.similarity.clamp(0.0, 100.0)),
                source: CandidateSource::RemoteCollection,
            })
            .collect())
    }
}

/// Strategy chosen at startup from configuration.
pub enum AnyMatcher {
    Local(LocalMatcher),
    Remote(RemoteMatcher),
}

impl Matcher for AnyMatcher {
    fn describe(&self) -> &'static str {
        match self {
            AnyMatcher::Local(m) => m.describe(),
            AnyMatcher::Remote(m) => m.describe(),
        }
    }

    async fn index(&self, enrollment: &NewEnrollment<'_>) -> Result<(), MatcherError> {
        match self {
            AnyMatcher::Local(m) => m.index(enrollment).await,
            AnyMatcher::Remote(m) => m.index(enrollment).await,
        }
    }

    async fn search(&self, query: MatchQuery<'_>) -> Result<Vec<ScoredMatch>, MatcherError> {
        match self {
            AnyMatcher::Local(m) => m.search(query).await,
            AnyMatcher::Remote(m) => m.search(query).await,
        }
    }
}
