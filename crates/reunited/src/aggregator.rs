//! Cross-source match aggregation.
//!
//! Single entry point for both operations the daemon exposes: enrolling a
//! missing person and matching a found photo. A match request fans out to
//! the configured matcher strategy and (policy permitting) the external
//! feed, then merges, dedupes, and ranks the combined candidate list.
//! Failures of the optional feed source never fail the request; they become
//! advisories the caller can show alongside whatever the registry produced.

use crate::engine::{EngineError, EngineHandle};
use crate::matcher::{MatchQuery, Matcher, MatcherError, NewEnrollment};
use reunite_core::{CandidateSource, EncodeError, EncodedFace, MatchCandidate};
use reunite_providers::{Error as ProviderError, FeedPost};
use reunite_registry::{derive_key, Registry};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// Label assigned to unscored external-feed candidates.
const FEED_LABEL: &str = "unknown";

/// When to consult the external feed during a match request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedPolicy {
    /// Always search the feed and merge its results.
    Always,
    /// Only when the matcher produced no candidates (legacy behavior).
    Fallback,
    /// Never.
    Off,
}

impl FeedPolicy {
    /// Parse a policy name; unknown values fall back to `Always` with a warning.
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "always" => FeedPolicy::Always,
            "fallback" => FeedPolicy::Fallback,
            "off" => FeedPolicy::Off,
            other => {
                tracing::warn!(value = other, "unknown feed policy, defaulting to 'always'");
                FeedPolicy::Always
            }
        }
    }
}

/// Feed query configuration.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub query: String,
    pub page_size: u32,
    pub policy: FeedPolicy,
}

/// Source of unscored external candidates. Implemented by the provider
/// client; stubbed in tests.
pub trait FeedSource {
    async fn search_recent(
        &self,
        query: &str,
        page_size: u32,
    ) -> Result<Vec<FeedPost>, ProviderError>;
}

impl FeedSource for reunite_providers::FeedClient {
    async fn search_recent(
        &self,
        query: &str,
        page_size: u32,
    ) -> Result<Vec<FeedPost>, ProviderError> {
        reunite_providers::FeedClient::search_recent(self, query, page_size).await
    }
}

#[derive(Error, Debug)]
pub enum EnrollError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error(transparent)]
    Encode(#[from] EngineError),
    #[error("failed to store reference image: {0}")]
    SaveImage(#[source] std::io::Error),
    /// Indexing failed. Enrollment fails loudly rather than leaving an
    /// identity that can never match.
    #[error("indexing failed: {0}")]
    Index(#[from] MatcherError),
}

/// Outcome of an enrollment request.
#[derive(Debug)]
pub enum EnrollOutcome {
    Enrolled {
        key: String,
        display_name: String,
        reference_image: String,
    },
    /// The submitted image holds no usable face; nothing was stored.
    NoFaceDetected,
}

/// Outcome of a match request.
pub enum MatchOutcome {
    /// The query image holds no usable face; no partial results.
    NoFaceDetected,
    Ranked(MatchReport),
}

/// Ranked, source-tagged candidates plus any non-fatal degradations
/// encountered while assembling them.
pub struct MatchReport {
    pub candidates: Vec<MatchCandidate>,
    pub advisories: Vec<String>,
}

/// Orchestrates encoder, matcher, registry, and feed for one request.
pub struct Aggregator<M, F> {
    engine: EngineHandle,
    matcher: M,
    registry: Registry,
    feed: Option<F>,
    feed_settings: FeedSettings,
    image_dir: PathBuf,
}

impl<M: Matcher, F: FeedSource> Aggregator<M, F> {
    pub fn new(
        engine: EngineHandle,
        matcher: M,
        registry: Registry,
        feed: Option<F>,
        feed_settings: FeedSettings,
        image_dir: PathBuf,
    ) -> Self {
        Self { engine, matcher, registry, feed, feed_settings, image_dir }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn matcher_kind(&self) -> &'static str {
        self.matcher.describe()
    }

    /// Encode the image, folding "no face" into `Ok(None)` so callers
    /// branch on it instead of pattern-matching error internals.
    async fn encode(&self, image: &[u8]) -> Result<Option<EncodedFace>, EngineError> {
        match self.engine.encode(image.to_vec()).await {
            Ok(encoded) => Ok(Some(encoded)),
            Err(EngineError::Encode(EncodeError::NoFaceDetected)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Enroll a missing person from a display name and a photo.
    pub async fn enroll(&self, name: &str, image: &[u8]) -> Result<EnrollOutcome, EnrollError> {
        let display_name = name.trim();
        if display_name.is_empty() {
            return Err(EnrollError::Validation("name must not be empty".into()));
        }
        let key = derive_key(display_name);
        if key.is_empty() {
            return Err(EnrollError::Validation(
                "name contains no usable characters".into(),
            ));
        }

        let Some(encoded) = self.encode(image).await? else {
            tracing::info!(key = %key, "enrollment rejected: no face detected");
            return Ok(EnrollOutcome::NoFaceDetected);
        };

        tokio::fs::create_dir_all(&self.image_dir)
            .await
            .map_err(EnrollError::SaveImage)?;
        let reference_path = self.image_dir.join(format!("{key}.jpg"));
        tokio::fs::write(&reference_path, image)
            .await
            .map_err(EnrollError::SaveImage)?;
        let reference_image = reference_path.to_string_lossy().into_owned();

        self.matcher
            .index(&NewEnrollment {
                key: &key,
                display_name,
                reference_image: &reference_image,
                image,
                embedding: &encoded.embedding,
            })
            .await?;

        tracing::info!(
            key = %key,
            faces_detected = encoded.faces_detected,
            "enrolled identity"
        );
        Ok(EnrollOutcome::Enrolled {
            key,
            display_name: display_name.to_string(),
            reference_image,
        })
    }

    /// Match a found photo against every configured source.
    pub async fn find(&self, image: &[u8]) -> Result<MatchOutcome, EngineError> {
        let Some(encoded) = self.encode(image).await? else {
            return Ok(MatchOutcome::NoFaceDetected);
        };

        let mut advisories = Vec::new();

        let scored = match self
            .matcher
            .search(MatchQuery { embedding: &encoded.embedding, image })
            .await
        {
            Ok(scored) => scored,
            Err(MatcherError::Unavailable(cause)) => {
                tracing::warn!(error = %cause, "matcher unavailable, continuing without registry candidates");
                advisories.push(format!("identity search unavailable: {cause}"));
                Vec::new()
            }
        };

        // Resolve display metadata; a key the registry cannot resolve is a
        // data inconsistency and must never surface as a match.
        let mut candidates = Vec::new();
        for m in scored {
            match self.registry.lookup(&m.key).await {
                Ok(Some(identity)) => candidates.push(MatchCandidate {
                    label: m.key,
                    display_name: Some(identity.display_name),
                    confidence: Some(m.confidence),
                    source: m.source,
                    evidence: identity.reference_image,
                    posted_at: None,
                }),
                Ok(None) => {
                    tracing::warn!(key = %m.key, "candidate key has no registry identity; dropping");
                }
                Err(e) => {
                    tracing::warn!(key = %m.key, error = %e, "candidate identity unreadable; dropping");
                }
            }
        }

        let consult_feed = match self.feed_settings.policy {
            FeedPolicy::Always => true,
            FeedPolicy::Fallback => candidates.is_empty(),
            FeedPolicy::Off => false,
        };

        if consult_feed {
            if let Some(feed) = &self.feed {
                match feed
                    .search_recent(&self.feed_settings.query, self.feed_settings.page_size)
                    .await
                {
                    Ok(posts) => candidates.extend(posts.into_iter().map(|p| MatchCandidate {
                        label: FEED_LABEL.to_string(),
                        display_name: None,
                        confidence: None,
                        source: CandidateSource::ExternalFeed,
                        evidence: p.media_url,
                        posted_at: p.posted_at,
                    })),
                    Err(e) if e.is_rate_limited() => {
                        tracing::warn!("feed provider rate limit reached");
                        advisories.push(
                            "feed provider rate limit reached — showing registry matches only"
                                .to_string(),
                        );
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "feed search failed");
                        advisories.push(format!("feed search failed: {e}"));
                    }
                }
            }
        }

        let candidates = rank(dedup(candidates));
        Ok(MatchOutcome::Ranked(MatchReport { candidates, advisories }))
    }
}

/// Collapse duplicates: keyed candidates dedup by identity key, feed
/// candidates by media URL (distinct unscored posts must all survive).
/// The higher-confidence entry wins; the survivor keeps the first-seen
/// position and source.
fn dedup(candidates: Vec<MatchCandidate>) -> Vec<MatchCandidate> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<MatchCandidate> = Vec::new();

    for candidate in candidates {
        let dedup_key = match candidate.source {
            CandidateSource::ExternalFeed => format!("feed:{}", candidate.evidence),
            _ => format!("id:{}", candidate.label),
        };
        match seen.get(&dedup_key) {
            Some(&i) => {
                let existing = out[i].confidence.unwrap_or(f32::NEG_INFINITY);
                let incoming = candidate.confidence.unwrap_or(f32::NEG_INFINITY);
                if incoming > existing {
                    out[i] = candidate;
                }
            }
            None => {
                seen.insert(dedup_key, out.len());
                out.push(candidate);
            }
        }
    }
    out
}

/// Stable sort: descending confidence, unscored candidates after all scored
/// ones, provider order preserved among ties.
fn rank(mut candidates: Vec<MatchCandidate>) -> Vec<MatchCandidate> {
    candidates.sort_by(|a, b| match (a.confidence, b.confidence) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(std::cmp::Ordering::Equal),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::spawn_engine;
    use crate::matcher::{LocalMatcher, ScoredMatch, DEFAULT_DISTANCE_CUTOFF};
    use reunite_core::{BoundingBox, Embedding, EncodeError, ImageEncoder};

    struct StubEncoder {
        values: Option<Vec<f32>>,
    }

    impl ImageEncoder for StubEncoder {
        fn encode(&mut self, _image_bytes: &[u8]) -> Result<EncodedFace, EncodeError> {
            match &self.values {
                Some(values) => Ok(EncodedFace {
                    embedding: Embedding { values: values.clone(), model_version: None },
                    face: BoundingBox {
                        x: 0.0, y: 0.0, width: 10.0, height: 10.0,
                        confidence: 0.9, landmarks: None,
                    },
                    faces_detected: 1,
                }),
                None => Err(EncodeError::NoFaceDetected),
            }
        }
    }

    struct StubMatcher {
        results: Vec<ScoredMatch>,
        fail: bool,
    }

    impl Matcher for StubMatcher {
        fn describe(&self) -> &'static str {
            "stub"
        }

        async fn index(&self, _enrollment: &NewEnrollment<'_>) -> Result<(), MatcherError> {
            if self.fail {
                Err(MatcherError::Unavailable("stub backend down".into()))
            } else {
                Ok(())
            }
        }

        async fn search(&self, _query: MatchQuery<'_>) -> Result<Vec<ScoredMatch>, MatcherError> {
            if self.fail {
                Err(MatcherError::Unavailable("stub backend down".into()))
            } else {
                Ok(self.results.clone())
            }
        }
    }

    #[derive(Clone)]
    enum StubFeed {
        Posts(Vec<FeedPost>),
        RateLimited,
        Broken,
    }

    impl FeedSource for StubFeed {
        async fn search_recent(
            &self,
            _query: &str,
            _page_size: u32,
        ) -> Result<Vec<FeedPost>, ProviderError> {
            match self {
                StubFeed::Posts(posts) => Ok(posts.clone()),
                StubFeed::RateLimited => {
                    Err(ProviderError::RateLimited { retry_after_secs: Some(900) })
                }
                StubFeed::Broken => Err(ProviderError::Api {
                    status: 500,
                    message: "upstream exploded".into(),
                }),
            }
        }
    }

    fn feed_settings(policy: FeedPolicy) -> FeedSettings {
        FeedSettings {
            query: "missing person OR lost person".into(),
            page_size: 10,
            policy,
        }
    }

    fn test_image_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("reunite-aggregator-{tag}-{}", std::process::id()))
    }

    fn posts() -> Vec<FeedPost> {
        vec![
            FeedPost { media_url: "https://img.example.com/a.jpg".into(), posted_at: None },
            FeedPost { media_url: "https://img.example.com/b.jpg".into(), posted_at: None },
        ]
    }

    fn candidate(label: &str, confidence: Option<f32>, source: CandidateSource) -> MatchCandidate {
        MatchCandidate {
            label: label.to_string(),
            display_name: None,
            confidence,
            source,
            evidence: format!("evidence/{label}"),
            posted_at: None,
        }
    }

    #[test]
    fn test_rank_scored_before_unscored_stable() {
        let ranked = rank(vec![
            candidate("feed1", None, CandidateSource::ExternalFeed),
            candidate("low", Some(45.0), CandidateSource::Registry),
            candidate("feed2", None, CandidateSource::ExternalFeed),
            candidate("high", Some(99.0), CandidateSource::Registry),
        ]);
        let labels: Vec<&str> = ranked.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["high", "low", "feed1", "feed2"]);
    }

    #[test]
    fn test_dedup_keeps_higher_confidence_for_same_key() {
        let deduped = dedup(vec![
            candidate("jane_doe", Some(90.0), CandidateSource::Registry),
            candidate("jane_doe", Some(95.5), CandidateSource::RemoteCollection),
        ]);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].confidence, Some(95.5));
    }

    #[test]
    fn test_dedup_preserves_distinct_feed_posts() {
        let mut a = candidate("unknown", None, CandidateSource::ExternalFeed);
        a.evidence = "https://img.example.com/a.jpg".into();
        let mut b = candidate("unknown", None, CandidateSource::ExternalFeed);
        b.evidence = "https://img.example.com/b.jpg".into();

        let deduped = dedup(vec![a, b]);
        assert_eq!(deduped.len(), 2, "unscored posts with distinct media must all survive");
    }

    #[test]
    fn test_dedup_collapses_repeated_feed_url() {
        let mut a = candidate("unknown", None, CandidateSource::ExternalFeed);
        a.evidence = "https://img.example.com/same.jpg".into();
        let b = a.clone();
        let deduped = dedup(vec![a, b]);
        assert_eq!(deduped.len(), 1);
    }

    #[test]
    fn test_feed_policy_parse() {
        assert_eq!(FeedPolicy::parse("always"), FeedPolicy::Always);
        assert_eq!(FeedPolicy::parse("Fallback"), FeedPolicy::Fallback);
        assert_eq!(FeedPolicy::parse("OFF"), FeedPolicy::Off);
        assert_eq!(FeedPolicy::parse("bogus"), FeedPolicy::Always);
    }

    #[tokio::test]
    async fn test_find_no_face_short_circuits() {
        let engine = spawn_engine(Box::new(StubEncoder { values: None }));
        let registry = Registry::open_in_memory().await.unwrap();
        let aggregator = Aggregator::new(
            engine,
            StubMatcher { results: vec![], fail: false },
            registry,
            Some(StubFeed::Posts(posts())),
            feed_settings(FeedPolicy::Always),
            test_image_dir("noface"),
        );

        let outcome = aggregator.find(&[0u8; 4]).await.unwrap();
        assert!(matches!(outcome, MatchOutcome::NoFaceDetected), "no partial results on no-face");
    }

    #[tokio::test]
    async fn test_find_exact_match_scores_100() {
        // Registry contains jane_doe with embedding E; the query encodes to
        // E exactly.
        let e = vec![0.6, 0.8, 0.0];
        let registry = Registry::open_in_memory().await.unwrap();
        registry
            .enroll(
                "jane_doe",
                "Jane Doe",
                "images/jane_doe.jpg",
                Some(&Embedding { values: e.clone(), model_version: None }),
            )
            .await
            .unwrap();

        let engine = spawn_engine(Box::new(StubEncoder { values: Some(e) }));
        let matcher = LocalMatcher::new(registry.clone(), DEFAULT_DISTANCE_CUTOFF);
        let aggregator = Aggregator::new(
            engine,
            matcher,
            registry,
            Some(StubFeed::Posts(vec![])),
            feed_settings(FeedPolicy::Always),
            test_image_dir("exact"),
        );

        let MatchOutcome::Ranked(report) = aggregator.find(&[0u8; 4]).await.unwrap() else {
            panic!("expected ranked outcome");
        };
        assert_eq!(report.candidates.len(), 1);
        let c = &report.candidates[0];
        assert_eq!(c.label, "jane_doe");
        assert_eq!(c.display_name.as_deref(), Some("Jane Doe"));
        assert_eq!(c.confidence, Some(100.0));
        assert_eq!(c.source, CandidateSource::Registry);
        assert_eq!(c.evidence, "images/jane_doe.jpg");
        assert!(report.advisories.is_empty());
    }

    #[tokio::test]
    async fn test_find_empty_registry_returns_feed_posts_in_order() {
        let engine = spawn_engine(Box::new(StubEncoder { values: Some(vec![1.0, 0.0]) }));
        let registry = Registry::open_in_memory().await.unwrap();
        let aggregator = Aggregator::new(
            engine,
            LocalMatcher::new(registry.clone(), DEFAULT_DISTANCE_CUTOFF),
            registry,
            Some(StubFeed::Posts(posts())),
            feed_settings(FeedPolicy::Always),
            test_image_dir("feedonly"),
        );

        let MatchOutcome::Ranked(report) = aggregator.find(&[0u8; 4]).await.unwrap() else {
            panic!("expected ranked outcome");
        };
        assert_eq!(report.candidates.len(), 2);
        assert_eq!(report.candidates[0].evidence, "https://img.example.com/a.jpg");
        assert_eq!(report.candidates[1].evidence, "https://img.example.com/b.jpg");
        for c in &report.candidates {
            assert_eq!(c.confidence, None);
            assert_eq!(c.source, CandidateSource::ExternalFeed);
            assert_eq!(c.label, "unknown");
        }
    }

    #[tokio::test]
    async fn test_find_rate_limited_feed_degrades_with_advisory() {
        let e = vec![0.0, 1.0];
        let registry = Registry::open_in_memory().await.unwrap();
        registry
            .enroll(
                "jane_doe",
                "Jane Doe",
                "images/jane_doe.jpg",
                Some(&Embedding { values: e.clone(), model_version: None }),
            )
            .await
            .unwrap();

        let engine = spawn_engine(Box::new(StubEncoder { values: Some(e) }));
        let aggregator = Aggregator::new(
            engine,
            LocalMatcher::new(registry.clone(), DEFAULT_DISTANCE_CUTOFF),
            registry,
            Some(StubFeed::RateLimited),
            feed_settings(FeedPolicy::Always),
            test_image_dir("ratelimit"),
        );

        let MatchOutcome::Ranked(report) = aggregator.find(&[0u8; 4]).await.unwrap() else {
            panic!("expected ranked outcome");
        };
        assert_eq!(report.candidates.len(), 1, "registry candidates must survive feed rate limiting");
        assert_eq!(report.candidates[0].label, "jane_doe");
        assert_eq!(report.advisories.len(), 1);
        assert!(report.advisories[0].contains("rate limit"));
    }

    #[tokio::test]
    async fn test_find_feed_provider_error_is_advisory() {
        let engine = spawn_engine(Box::new(StubEncoder { values: Some(vec![1.0]) }));
        let registry = Registry::open_in_memory().await.unwrap();
        let aggregator = Aggregator::new(
            engine,
            StubMatcher { results: vec![], fail: false },
            registry,
            Some(StubFeed::Broken),
            feed_settings(FeedPolicy::Always),
            test_image_dir("feederr"),
        );

        let MatchOutcome::Ranked(report) = aggregator.find(&[0u8; 4]).await.unwrap() else {
            panic!("expected ranked outcome");
        };
        assert!(report.candidates.is_empty());
        assert_eq!(report.advisories.len(), 1);
        assert!(report.advisories[0].contains("upstream exploded"));
    }

    #[tokio::test]
    async fn test_find_matcher_unavailable_degrades_and_feed_still_runs() {
        let engine = spawn_engine(Box::new(StubEncoder { values: Some(vec![1.0]) }));
        let registry = Registry::open_in_memory().await.unwrap();
        let aggregator = Aggregator::new(
            engine,
            StubMatcher { results: vec![], fail: true },
            registry,
            Some(StubFeed::Posts(posts())),
            feed_settings(FeedPolicy::Always),
            test_image_dir("matcherdown"),
        );

        let MatchOutcome::Ranked(report) = aggregator.find(&[0u8; 4]).await.unwrap() else {
            panic!("expected ranked outcome");
        };
        assert_eq!(report.candidates.len(), 2, "feed candidates still appended");
        assert_eq!(report.advisories.len(), 1);
        assert!(report.advisories[0].contains("unavailable"));
    }

    #[tokio::test]
    async fn test_find_drops_unresolvable_candidate_keys() {
        let engine = spawn_engine(Box::new(StubEncoder { values: Some(vec![1.0]) }));
        let registry = Registry::open_in_memory().await.unwrap();
        let aggregator = Aggregator::new(
            engine,
            StubMatcher {
                results: vec![ScoredMatch {
                    key: "ghost".into(),
                    confidence: 99.0,
                    source: CandidateSource::RemoteCollection,
                }],
                fail: false,
            },
            registry,
            Some(StubFeed::Posts(vec![])),
            feed_settings(FeedPolicy::Always),
            test_image_dir("ghost"),
        );

        let MatchOutcome::Ranked(report) = aggregator.find(&[0u8; 4]).await.unwrap() else {
            panic!("expected ranked outcome");
        };
        assert!(report.candidates.is_empty(), "a key with no identity must never surface");
    }

    #[tokio::test]
    async fn test_find_dedups_repeated_key_from_backend() {
        let registry = Registry::open_in_memory().await.unwrap();
        registry
            .enroll("jane_doe", "Jane Doe", "images/jane_doe.jpg", None)
            .await
            .unwrap();

        let engine = spawn_engine(Box::new(StubEncoder { values: Some(vec![1.0]) }));
        let aggregator = Aggregator::new(
            engine,
            StubMatcher {
                results: vec![
                    ScoredMatch {
                        key: "jane_doe".into(),
                        confidence: 90.0,
                        source: CandidateSource::RemoteCollection,
                    },
                    ScoredMatch {
                        key: "jane_doe".into(),
                        confidence: 95.5,
                        source: CandidateSource::RemoteCollection,
                    },
                ],
                fail: false,
            },
            registry,
            Some(StubFeed::Posts(vec![])),
            feed_settings(FeedPolicy::Always),
            test_image_dir("dedup"),
        );

        let MatchOutcome::Ranked(report) = aggregator.find(&[0u8; 4]).await.unwrap() else {
            panic!("expected ranked outcome");
        };
        assert_eq!(report.candidates.len(), 1);
        assert_eq!(report.candidates[0].confidence, Some(95.5));
    }

    #[tokio::test]
    async fn test_find_fallback_policy_skips_feed_when_registry_matches() {
        let e = vec![0.5, 0.5];
        let registry = Registry::open_in_memory().await.unwrap();
        registry
            .enroll(
                "jane_doe",
                "Jane Doe",
                "images/jane_doe.jpg",
                Some(&Embedding { values: e.clone(), model_version: None }),
            )
            .await
            .unwrap();

        let engine = spawn_engine(Box::new(StubEncoder { values: Some(e) }));
        let aggregator = Aggregator::new(
            engine,
            LocalMatcher::new(registry.clone(), DEFAULT_DISTANCE_CUTOFF),
            registry,
            Some(StubFeed::Posts(posts())),
            feed_settings(FeedPolicy::Fallback),
            test_image_dir("fallback"),
        );

        let MatchOutcome::Ranked(report) = aggregator.find(&[0u8; 4]).await.unwrap() else {
            panic!("expected ranked outcome");
        };
        assert_eq!(report.candidates.len(), 1);
        assert_eq!(report.candidates[0].source, CandidateSource::Registry);
    }

    #[tokio::test]
    async fn test_enroll_no_face_leaves_registry_unchanged() {
        let engine = spawn_engine(Box::new(StubEncoder { values: None }));
        let registry = Registry::open_in_memory().await.unwrap();
        let aggregator = Aggregator::new(
            engine,
            LocalMatcher::new(registry.clone(), DEFAULT_DISTANCE_CUTOFF),
            registry.clone(),
            Some(StubFeed::Posts(vec![])),
            feed_settings(FeedPolicy::Always),
            test_image_dir("enroll-noface"),
        );

        let outcome = aggregator.enroll("Jane Doe", &[0u8; 4]).await.unwrap();
        assert!(matches!(outcome, EnrollOutcome::NoFaceDetected));
        assert_eq!(registry.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_enroll_rejects_blank_name() {
        let engine = spawn_engine(Box::new(StubEncoder { values: Some(vec![1.0]) }));
        let registry = Registry::open_in_memory().await.unwrap();
        let aggregator = Aggregator::new(
            engine,
            LocalMatcher::new(registry.clone(), DEFAULT_DISTANCE_CUTOFF),
            registry,
            Some(StubFeed::Posts(vec![])),
            feed_settings(FeedPolicy::Always),
            test_image_dir("enroll-blank"),
        );

        let err = aggregator.enroll("   ", &[0u8; 4]).await.unwrap_err();
        assert!(matches!(err, EnrollError::Validation(_)));
    }

    #[tokio::test]
    async fn test_enroll_stores_identity_and_reference_image() {
        let e = vec![0.25, 0.75];
        let engine = spawn_engine(Box::new(StubEncoder { values: Some(e.clone()) }));
        let registry = Registry::open_in_memory().await.unwrap();
        let image_dir = test_image_dir("enroll-ok");
        let aggregator = Aggregator::new(
            engine,
            LocalMatcher::new(registry.clone(), DEFAULT_DISTANCE_CUTOFF),
            registry.clone(),
            Some(StubFeed::Posts(vec![])),
            feed_settings(FeedPolicy::Always),
            image_dir.clone(),
        );

        let outcome = aggregator.enroll("Jane Doe", &[9u8, 8, 7]).await.unwrap();
        let EnrollOutcome::Enrolled { key, reference_image, .. } = outcome else {
            panic!("expected enrolled outcome");
        };
        assert_eq!(key, "jane_doe");

        let identity = registry.lookup("jane_doe").await.unwrap().unwrap();
        assert_eq!(identity.embedding.unwrap().values, e);
        assert_eq!(identity.reference_image, reference_image);
        assert_eq!(std::fs::read(&reference_image).unwrap(), vec![9u8, 8, 7]);

        let _ = std::fs::remove_dir_all(&image_dir);
    }

    #[tokio::test]
    async fn test_enroll_fails_loudly_when_indexing_unavailable() {
        let engine = spawn_engine(Box::new(StubEncoder { values: Some(vec![1.0]) }));
        let registry = Registry::open_in_memory().await.unwrap();
        let image_dir = test_image_dir("enroll-down");
        let aggregator = Aggregator::new(
            engine,
            StubMatcher { results: vec![], fail: true },
            registry,
            Some(StubFeed::Posts(vec![])),
            feed_settings(FeedPolicy::Always),
            image_dir.clone(),
        );

        let err = aggregator.enroll("Jane Doe", &[0u8; 4]).await.unwrap_err();
        assert!(matches!(err, EnrollError::Index(MatcherError::Unavailable(_))));

        let _ = std::fs::remove_dir_all(&image_dir);
    }
}
