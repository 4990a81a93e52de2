//! reunite-providers — Typed clients for the two external services.
//!
//! [`collection::FaceCollectionClient`] talks to a managed face-matching
//! service that owns embedding storage and nearest-neighbor search behind a
//! named collection. [`feed::FeedClient`] queries a social-feed search API
//! for recent photo-bearing posts. Both surface rate limiting and provider
//! failures as first-class [`Error`] variants so callers can degrade
//! instead of aborting.

pub mod collection;
pub mod error;
pub mod feed;

pub use collection::{CollectionConfig, CollectionMatch, FaceCollectionClient};
pub use error::{Error, Result};
pub use feed::{FeedClient, FeedConfig, FeedPost};
