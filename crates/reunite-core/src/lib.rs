//! reunite-core — Face encoding pipeline and shared match types.
//!
//! Turns a submitted photograph into a fixed-length face embedding using
//! SCRFD for detection and ArcFace for embedding extraction, both running
//! via ONNX Runtime on CPU. Also defines the candidate types every match
//! source (registry, remote collection, external feed) reports in.

pub mod alignment;
pub mod detector;
pub mod embedder;
pub mod encoder;
pub mod types;

use std::path::PathBuf;

pub use detector::{DetectorError, FaceDetector};
pub use embedder::{EmbedderError, FaceEmbedder};
pub use encoder::{EncodeError, EncodedFace, ImageEncoder, OnnxEncoder};
pub use types::{BoundingBox, CandidateSource, Embedding, MatchCandidate};

/// Default directory for the ONNX model files.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("reunite/models")
}
