//! reunite-registry — Durable store of enrolled identities.
//!
//! Each identity holds a key derived from its display name, a reference
//! image locator, and (for the local matching strategy) one embedding.
//! Re-enrolling a key replaces the record in place; the store never holds
//! two rows for the same key.

pub mod identity;
pub mod store;

pub use identity::{decode_embedding, derive_key, encode_embedding, Identity};
pub use store::{Registry, StoreError};
