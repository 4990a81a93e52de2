use reunite_core::Embedding;
use serde::{Deserialize, Serialize};

/// An enrolled missing person.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    /// Unique key derived from the display name via [`derive_key`].
    pub key: String,
    pub display_name: String,
    /// Opaque locator (path) of the canonical photo.
    pub reference_image: String,
    /// Present for locally matched identities; `None` when a remote
    /// collection owns the vector and this row is only a side-table entry.
    pub embedding: Option<Embedding>,
    /// RFC 3339 timestamp of the last (re-)enrollment.
    pub updated_at: String,
}

/// Derive a stable registry key from a display name.
///
/// Trims, lowercases, and replaces every character outside `[a-z0-9_.:-]`
/// with `_` — the character set the remote collection service accepts for
/// external image ids, so the same key addresses both stores.
///
/// Returns an empty string for an all-whitespace name; callers treat that
/// as a validation failure.
pub fn derive_key(display_name: &str) -> String {
    display_name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '.' | '-' | ':') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Serialize an embedding as a little-endian f32 blob.
///
/// The inverse of [`decode_embedding`]; the pair must round-trip
/// byte-identically.
pub fn encode_embedding(embedding: &Embedding) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.values.len() * 4);
    for v in &embedding.values {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Deserialize a little-endian f32 blob back into embedding values.
///
/// A blob whose length is not a multiple of 4 cannot have been written by
/// [`encode_embedding`] and is reported as corrupt.
pub fn decode_embedding(bytes: &[u8]) -> Result<Vec<f32>, String> {
    if bytes.len() % 4 != 0 {
        return Err(format!("blob length {} is not a multiple of 4", bytes.len()));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}
