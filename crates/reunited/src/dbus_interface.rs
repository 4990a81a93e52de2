use crate::aggregator::{Aggregator, EnrollError, EnrollOutcome, MatchOutcome};
use crate::matcher::AnyMatcher;
use reunite_providers::FeedClient;
use std::sync::Arc;
use zbus::interface;

/// The concrete aggregator the daemon serves.
pub type DaemonAggregator = Aggregator<AnyMatcher, FeedClient>;

/// D-Bus interface for the Reunite daemon.
///
/// Bus name: org.reunite.Reunite1
/// Object path: /org/reunite/Reunite1
///
/// Methods return JSON documents with an `outcome` field so that
/// user-correctable conditions (no face, validation) stay out of the D-Bus
/// error channel; infrastructure failures map to D-Bus errors.
pub struct ReuniteService {
    aggregator: Arc<DaemonAggregator>,
}

impl ReuniteService {
    pub fn new(aggregator: Arc<DaemonAggregator>) -> Self {
        Self { aggregator }
    }
}

#[interface(name = "org.reunite.Reunite1")]
impl ReuniteService {
    /// Enroll a missing person from a display name and a photo.
    async fn enroll(&self, name: &str, image: Vec<u8>) -> zbus::fdo::Result<String> {
        tracing::info!(name, bytes = image.len(), "enroll requested");
        match self.aggregator.enroll(name, &image).await {
            Ok(EnrollOutcome::Enrolled { key, display_name, reference_image }) => {
                Ok(serde_json::json!({
                    "outcome": "enrolled",
                    "key": key,
                    "display_name": display_name,
                    "reference_image": reference_image,
                })
                .to_string())
            }
            Ok(EnrollOutcome::NoFaceDetected) => Ok(serde_json::json!({
                "outcome": "no_face_detected",
                "message": "no usable face found in the submitted photo; nothing was stored",
            })
            .to_string()),
            Err(EnrollError::Validation(msg)) => Err(zbus::fdo::Error::InvalidArgs(msg)),
            Err(e) => {
                tracing::error!(error = %e, "enrollment failed");
                Err(zbus::fdo::Error::Failed(e.to_string()))
            }
        }
    }

    /// Match a found photo against the registry and the external feed.
    async fn find_matches(&self, image: Vec<u8>) -> zbus::fdo::Result<String> {
        tracing::info!(bytes = image.len(), "match requested");
        match self.aggregator.find(&image).await {
            Ok(MatchOutcome::Ranked(report)) => Ok(serde_json::json!({
                "outcome": "ranked",
                "candidates": report.candidates,
                "advisories": report.advisories,
            })
            .to_string()),
            Ok(MatchOutcome::NoFaceDetected) => Ok(serde_json::json!({
                "outcome": "no_face_detected",
                "message": "no usable face found in the submitted photo",
            })
            .to_string()),
            Err(e) => {
                tracing::error!(error = %e, "match request failed");
                Err(zbus::fdo::Error::Failed(e.to_string()))
            }
        }
    }

    /// List enrolled identities (metadata only, no embeddings).
    async fn list_identities(&self) -> zbus::fdo::Result<String> {
        let identities = self
            .aggregator
            .registry()
            .all()
            .await
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;

        let entries: Vec<serde_json::Value> = identities
            .iter()
            .map(|i| {
                serde_json::json!({
                    "key": i.key,
                    "display_name": i.display_name,
                    "reference_image": i.reference_image,
                    "updated_at": i.updated_at,
                })
            })
            .collect();
        Ok(serde_json::Value::Array(entries).to_string())
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let enrolled = self
            .aggregator
            .registry()
            .count()
            .await
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;

        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "matcher": self.aggregator.matcher_kind(),
            "enrolled": enrolled,
        })
        .to_string())
    }
}
