use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use reunite_core::OnnxEncoder;
use reunite_providers::{CollectionConfig, FaceCollectionClient, FeedClient, FeedConfig};
use reunite_registry::Registry;

mod aggregator;
mod config;
mod dbus_interface;
mod engine;
mod matcher;

use aggregator::{Aggregator, FeedSettings};
use config::{Config, MatcherStrategy};
use dbus_interface::ReuniteService;
use matcher::{AnyMatcher, LocalMatcher, RemoteMatcher};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("reunited starting");

    let config = Config::from_env();

    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating data dir {}", parent.display()))?;
    }
    std::fs::create_dir_all(&config.image_dir)
        .with_context(|| format!("creating image dir {}", config.image_dir.display()))?;

    let registry = Registry::open(&config.db_path)
        .await
        .with_context(|| format!("opening registry at {}", config.db_path.display()))?;
    tracing::info!(path = %config.db_path.display(), "registry opened");

    // Load models synchronously before serving anything (fail-fast).
    let encoder = OnnxEncoder::load(
        &config.detector_model_path(),
        &config.embedder_model_path(),
    )
    .context("loading ONNX models")?;
    let engine = engine::spawn_engine(Box::new(encoder));

    let matcher = match config.matcher_strategy {
        MatcherStrategy::Local => {
            tracing::info!(cutoff = config.distance_cutoff, "using local matcher");
            AnyMatcher::Local(LocalMatcher::new(registry.clone(), config.distance_cutoff))
        }
        MatcherStrategy::Remote => {
            let client = FaceCollectionClient::new(CollectionConfig {
                base_url: config.collection_url.clone(),
                api_key: config.collection_api_key.clone(),
                collection_id: config.collection_id.clone(),
                timeout: Duration::from_secs(config.remote_timeout_secs),
            })
            .context("configuring face-collection client")?;

            client
                .ensure_collection()
                .await
                .context("bootstrapping face collection")?;
            tracing::info!(collection = %config.collection_id, "using remote matcher");

            AnyMatcher::Remote(RemoteMatcher::new(
                client,
                registry.clone(),
                config.remote_max_matches,
                config.remote_min_similarity,
            ))
        }
    };

    let feed = if config.feed_token.is_empty() {
        tracing::warn!("no feed token configured; external feed search disabled");
        None
    } else {
        Some(
            FeedClient::new(FeedConfig {
                base_url: config.feed_url.clone(),
                bearer_token: config.feed_token.clone(),
                timeout: Duration::from_secs(config.feed_timeout_secs),
            })
            .context("configuring feed client")?,
        )
    };

    let aggregator = Arc::new(Aggregator::new(
        engine,
        matcher,
        registry,
        feed,
        FeedSettings {
            query: config.feed_query.clone(),
            page_size: config.feed_page_size,
            policy: config.feed_policy,
        },
        config.image_dir.clone(),
    ));

    let _connection = zbus::connection::Builder::session()?
        .name("org.reunite.Reunite1")?
        .serve_at("/org/reunite/Reunite1", ReuniteService::new(aggregator))?
        .build()
        .await
        .context("registering on the session bus")?;

    tracing::info!("reunited ready on org.reunite.Reunite1");

    tokio::signal::ctrl_c().await?;
    tracing::info!("reunited shutting down");

    Ok(())
}
