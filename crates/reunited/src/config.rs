use crate::aggregator::FeedPolicy;
use crate::matcher::{
    DEFAULT_DISTANCE_CUTOFF, DEFAULT_REMOTE_MAX_MATCHES, DEFAULT_REMOTE_MIN_SIMILARITY,
};
use std::path::PathBuf;

/// Matching strategy, selected once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatcherStrategy {
    /// Exhaustive scan over registry embeddings.
    Local,
    /// Delegate storage and search to the managed face-collection service.
    Remote,
}

impl MatcherStrategy {
    fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "remote" => MatcherStrategy::Remote,
            "local" => MatcherStrategy::Local,
            other => {
                tracing::warn!(value = other, "unknown matcher strategy, defaulting to 'local'");
                MatcherStrategy::Local
            }
        }
    }
}

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Path to the SQLite registry database.
    pub db_path: PathBuf,
    /// Directory where enrollment reference images are stored.
    pub image_dir: PathBuf,
    /// Which matcher strategy to run.
    pub matcher_strategy: MatcherStrategy,
    /// Euclidean distance below which a local match qualifies.
    pub distance_cutoff: f32,
    /// Base URL of the face-collection service (remote strategy).
    pub collection_url: String,
    /// API key for the face-collection service.
    pub collection_api_key: String,
    /// Name of the face collection to search and index into.
    pub collection_id: String,
    /// Upper bound on matches requested from the collection service.
    pub remote_max_matches: u32,
    /// Minimum similarity percentage for remote matches.
    pub remote_min_similarity: f32,
    /// Timeout in seconds for collection-service calls.
    pub remote_timeout_secs: u64,
    /// Base URL of the feed search provider.
    pub feed_url: String,
    /// Bearer token for the feed provider; empty disables feed search.
    pub feed_token: String,
    /// Search query sent to the feed provider.
    pub feed_query: String,
    /// Page size for feed searches.
    pub feed_page_size: u32,
    /// Timeout in seconds for feed calls.
    pub feed_timeout_secs: u64,
    /// When to consult the feed during a match request.
    pub feed_policy: FeedPolicy,
}

impl Config {
    /// Load configuration from `REUNITE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("reunite");

        let model_dir = std::env::var("REUNITE_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| reunite_core::default_model_dir());

        let db_path = std::env::var("REUNITE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("registry.db"));

        let image_dir = std::env::var("REUNITE_IMAGE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("images"));

        Self {
            model_dir,
            db_path,
            image_dir,
            matcher_strategy: MatcherStrategy::parse(&env_str("REUNITE_MATCHER", "local")),
            distance_cutoff: env_f32("REUNITE_DISTANCE_CUTOFF", DEFAULT_DISTANCE_CUTOFF),
            collection_url: env_str("REUNITE_COLLECTION_URL", "http://127.0.0.1:8081"),
            collection_api_key: env_str("REUNITE_COLLECTION_API_KEY", ""),
            collection_id: env_str("REUNITE_COLLECTION_ID", "missing-persons"),
            remote_max_matches: env_u32("REUNITE_REMOTE_MAX_MATCHES", DEFAULT_REMOTE_MAX_MATCHES),
            remote_min_similarity: env_f32(
                "REUNITE_REMOTE_MIN_SIMILARITY",
                DEFAULT_REMOTE_MIN_SIMILARITY,
            ),
            remote_timeout_secs: env_u64("REUNITE_REMOTE_TIMEOUT_SECS", 10),
            feed_url: env_str("REUNITE_FEED_URL", "https://api.x.com"),
            feed_token: env_str("REUNITE_FEED_TOKEN", ""),
            feed_query: env_str(
                "REUNITE_FEED_QUERY",
                "missing person OR lost person OR found child -is:retweet",
            ),
            feed_page_size: env_u32("REUNITE_FEED_PAGE_SIZE", 10),
            feed_timeout_secs: env_u64("REUNITE_FEED_TIMEOUT_SECS", 10),
            feed_policy: FeedPolicy::parse(&env_str("REUNITE_FEED_POLICY", "always")),
        }
    }

    /// Path to the SCRFD detection model.
    pub fn detector_model_path(&self) -> String {
        self.model_dir
            .join("det_10g.onnx")
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the ArcFace embedding model.
    pub fn embedder_model_path(&self) -> String {
        self.model_dir
            .join("w600k_r50.onnx")
            .to_string_lossy()
            .into_owned()
    }
}

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
