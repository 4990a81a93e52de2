//! Image-to-embedding encoding.
//!
//! The [`ImageEncoder`] trait is the single leaf contract the rest of the
//! system builds on: raw image bytes in, one face embedding out, with
//! "no face" as a distinguishable outcome rather than a generic error.

use crate::detector::{DetectorError, FaceDetector};
use crate::embedder::{EmbedderError, FaceEmbedder};
use crate::types::{BoundingBox, Embedding};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EncodeError {
    /// Zero faces found. Callers branch on this: enrollment rejects the
    /// image without mutating the registry, a search short-circuits with a
    /// "no query embedding" result.
    #[error("no face detected in the submitted image")]
    NoFaceDetected,
    #[error("image decode failed: {0}")]
    InvalidImage(#[from] image::ImageError),
    #[error(transparent)]
    Detector(#[from] DetectorError),
    #[error(transparent)]
    Embedder(#[from] EmbedderError),
}

/// A successfully encoded query or enrollment face.
#[derive(Debug, Clone)]
pub struct EncodedFace {
    pub embedding: Embedding,
    /// The face the deterministic selection rule picked.
    pub face: BoundingBox,
    /// Total faces the detector found in the image.
    pub faces_detected: usize,
}

/// Converts raw image bytes into exactly one face embedding.
///
/// `&mut self` only because ONNX session handles require it; implementations
/// hold no state that couples independent inputs, so repeated calls on the
/// same bytes yield the same embedding.
pub trait ImageEncoder: Send {
    fn encode(&mut self, image_bytes: &[u8]) -> Result<EncodedFace, EncodeError>;
}

/// Pick exactly one face when an image contains several.
///
/// Rule (stable across runs on the same bytes): largest bounding-box area
/// wins; area ties break toward higher detector confidence, then toward the
/// earlier detection.
pub fn select_primary_face(faces: &[BoundingBox]) -> Option<&BoundingBox> {
    let mut best: Option<&BoundingBox> = None;
    for face in faces {
        let better = match best {
            None => true,
            Some(b) => {
                face.area() > b.area()
                    || (face.area() == b.area() && face.confidence > b.confidence)
            }
        };
        if better {
            best = Some(face);
        }
    }
    best
}

/// SCRFD + ArcFace encoder running via ONNX Runtime.
pub struct OnnxEncoder {
    detector: FaceDetector,
    embedder: FaceEmbedder,
}

impl OnnxEncoder {
    /// Load both ONNX models. Fails fast if either file is missing.
    pub fn load(detector_path: &str, embedder_path: &str) -> Result<Self, EncodeError> {
        let detector = FaceDetector::load(detector_path)?;
        let embedder = FaceEmbedder::load(embedder_path)?;
        Ok(Self { detector, embedder })
    }
}

impl ImageEncoder for OnnxEncoder {
    fn encode(&mut self, image_bytes: &[u8]) -> Result<EncodedFace, EncodeError> {
        let photo = image::load_from_memory(image_bytes)?.to_luma8();

        let faces = self.detector.detect(&photo)?;
        let faces_detected = faces.len();

        let face = select_primary_face(&faces)
            .cloned()
            .ok_or(EncodeError::NoFaceDetected)?;

        tracing::debug!(
            faces_detected,
            confidence = face.confidence,
            "selected primary face"
        );

        let embedding = self.embedder.embed(&photo, &face)?;

        Ok(EncodedFace {
            embedding,
            face,
            faces_detected,
        })
    }
}
