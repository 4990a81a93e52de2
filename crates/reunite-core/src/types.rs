use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

/// Face embedding vector (512-dimensional for ArcFace), L2-normalized
/// by the embedder so same-identity pairs sit well below distance 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    /// Compute Euclidean distance to another embedding.
    ///
    /// Always processes all dimensions; mismatched lengths compare only the
    /// common prefix, which for a fixed-dimensionality backend never occurs.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// L2 norm of the vector.
    pub fn norm(&self) -> f32 {
        self.values.iter().map(|x| x * x).sum::<f32>().sqrt()
    }
}

/// Provenance of a match candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    Registry,
    RemoteCollection,
    ExternalFeed,
}

/// A single proposed match returned to the caller.
///
/// Candidates from the registry or the remote collection carry a resolved
/// identity key and a confidence in [0, 100]; external-feed candidates are
/// unscored (`confidence: None`) and labeled by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCandidate {
    /// Identity key, or a provider-assigned label (e.g. "unknown") for feed items.
    pub label: String,
    pub display_name: Option<String>,
    /// Normalized score in [0, 100], rounded to 2 decimals. Absent for
    /// sources that provide no numeric score.
    pub confidence: Option<f32>,
    pub source: CandidateSource,
    /// Reference image path (registry matches) or external media URL (feed matches).
    pub evidence: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posted_at: Option<DateTime<Utc>>,
}
