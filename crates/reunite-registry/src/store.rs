//! SQLite-backed identity registry.
//!
//! One row per identity key; enrollment is a single-statement upsert, so
//! concurrent enrollments can never leave a torn record and re-enrolling a
//! key replaces its embedding and reference image in place. Reads return
//! snapshots and hold no lock across a matching scan.

use crate::identity::{decode_embedding, encode_embedding, Identity};
use reunite_core::Embedding;
use std::path::Path;
use thiserror::Error;
use tokio_rusqlite::Connection;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS identities (
    key             TEXT PRIMARY KEY,
    display_name    TEXT NOT NULL,
    reference_image TEXT NOT NULL,
    embedding       BLOB,
    model_version   TEXT,
    updated_at      TEXT NOT NULL
);
";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("registry database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),
    #[error("stored embedding for '{key}' is corrupt: {reason}")]
    CorruptEmbedding { key: String, reason: String },
}

/// Raw row shape moved out of the blocking closure before embedding decode.
type RawRow = (String, String, String, Option<Vec<u8>>, Option<String>, String);

/// Handle to the identity store. Cloning shares the underlying connection.
#[derive(Clone)]
pub struct Registry {
    conn: Connection,
}

impl Registry {
    /// Open (and migrate) the registry database at the given path.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path.to_path_buf()).await?;
        Self::init(conn).await
    }

    /// In-memory registry, used by tests.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }

    /// Upsert an identity. A duplicate key is an update, not an error:
    /// last writer wins on display name, reference image, and embedding.
    pub async fn enroll(
        &self,
        key: &str,
        display_name: &str,
        reference_image: &str,
        embedding: Option<&Embedding>,
    ) -> Result<(), StoreError> {
        let key = key.to_string();
        let display_name = display_name.to_string();
        let reference_image = reference_image.to_string();
        let blob = embedding.map(encode_embedding);
        let model_version = embedding.and_then(|e| e.model_version.clone());
        let updated_at = chrono::Utc::now().to_rfc3339();

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO identities
                         (key, display_name, reference_image, embedding, model_version, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(key) DO UPDATE SET
                         display_name    = excluded.display_name,
                         reference_image = excluded.reference_image,
                         embedding       = excluded.embedding,
                         model_version   = excluded.model_version,
                         updated_at      = excluded.updated_at",
                    rusqlite::params![
                        key,
                        display_name,
                        reference_image,
                        blob,
                        model_version,
                        updated_at
                    ],
                )?;
                Ok(())
            })
            .await?;

        Ok(())
    }

    /// Snapshot of every enrolled identity, ordered by key for deterministic
    /// scans. Staleness relative to concurrent enrollments is acceptable.
    pub async fn all(&self) -> Result<Vec<Identity>, StoreError> {
        let rows: Vec<RawRow> = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT key, display_name, reference_image, embedding, model_version, updated_at
                     FROM identities ORDER BY key",
                )?;
                let rows = stmt
                    .query_map([], row_to_raw)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter().map(raw_to_identity).collect()
    }

    /// Look up one identity by key.
    pub async fn lookup(&self, key: &str) -> Result<Option<Identity>, StoreError> {
        let key = key.to_string();
        let row: Option<RawRow> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT key, display_name, reference_image, embedding, model_version, updated_at
                     FROM identities WHERE key = ?1",
                )?;
                let mut rows = stmt.query_map([key], row_to_raw)?;
                match rows.next() {
                    Some(row) => Ok(Some(row?)),
                    None => Ok(None),
                }
            })
            .await?;

        row.map(raw_to_identity).transpose()
    }

    /// Number of enrolled identities.
    pub async fn count(&self) -> Result<u64, StoreError> {
        let n: i64 = self
            .conn
            .call(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM identities", [], |row| row.get(0))?)
            })
            .await?;
        Ok(n as u64)
    }
}

fn row_to_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn raw_to_identity(raw: RawRow) -> Result<Identity, StoreError> {
    let (key, display_name, reference_image, blob, model_version, updated_at) = raw;
    let embedding = match blob {
        Some(bytes) => {
            let values = decode_embedding(&bytes).map_err(|reason| StoreError::CorruptEmbedding {
                key: key.clone(),
                reason,
            })?;
            Some(Embedding { values, model_version })
        }
        None => None,
    };
    Ok(Identity {
        key,
        display_name,
        reference_image,
        embedding,
        updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(values: Vec<f32>) -> Embedding {
        Embedding { values, model_version: Some("w600k_r50".into()) }
    }

    #[tokio::test]
    async fn test_enroll_and_lookup() {
        let registry = Registry::open_in_memory().await.unwrap();
        registry
            .enroll("jane_doe", "Jane Doe", "images/jane_doe.jpg", Some(&emb(vec![0.1, 0.2])))
            .await
            .unwrap();

        let id = registry.lookup("jane_doe").await.unwrap().unwrap();
        assert_eq!(id.display_name, "Jane Doe");
        assert_eq!(id.reference_image, "images/jane_doe.jpg");
        assert_eq!(id.embedding.as_ref().unwrap().model_version.as_deref(), Some("w600k_r50"));
    }

    #[tokio::test]
    async fn test_lookup_missing_returns_none() {
        let registry = Registry::open_in_memory().await.unwrap();
        assert!(registry.lookup("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reenroll_replaces_never_duplicates() {
        let registry = Registry::open_in_memory().await.unwrap();
        registry
            .enroll("jane_doe", "Jane Doe", "images/old.jpg", Some(&emb(vec![1.0])))
            .await
            .unwrap();
        registry
            .enroll("jane_doe", "Jane A. Doe", "images/new.jpg", Some(&emb(vec![2.0])))
            .await
            .unwrap();

        assert_eq!(registry.count().await.unwrap(), 1);
        let id = registry.lookup("jane_doe").await.unwrap().unwrap();
        assert_eq!(id.display_name, "Jane A. Doe");
        assert_eq!(id.reference_image, "images/new.jpg");
        assert_eq!(id.embedding.unwrap().values, vec![2.0]);
    }

    #[tokio::test]
    async fn test_embedding_roundtrip_byte_identical() {
        let registry = Registry::open_in_memory().await.unwrap();
        let original = emb(vec![0.123456789, -0.987654321, 1.0e-20, 0.0]);
        registry
            .enroll("k", "K", "images/k.jpg", Some(&original))
            .await
            .unwrap();

        let stored = registry.lookup("k").await.unwrap().unwrap().embedding.unwrap();
        let orig_bits: Vec<u32> = original.values.iter().map(|v| v.to_bits()).collect();
        let back_bits: Vec<u32> = stored.values.iter().map(|v| v.to_bits()).collect();
        assert_eq!(orig_bits, back_bits);
    }

    #[tokio::test]
    async fn test_enroll_without_embedding_is_side_table_row() {
        let registry = Registry::open_in_memory().await.unwrap();
        registry
            .enroll("remote_only", "Remote Only", "images/r.jpg", None)
            .await
            .unwrap();

        let id = registry.lookup("remote_only").await.unwrap().unwrap();
        assert!(id.embedding.is_none());
    }

    #[tokio::test]
    async fn test_all_is_ordered_by_key() {
        let registry = Registry::open_in_memory().await.unwrap();
        for key in ["charlie", "alice", "bob"] {
            registry
                .enroll(key, key, "images/x.jpg", Some(&emb(vec![0.5])))
                .await
                .unwrap();
        }

        let keys: Vec<String> = registry
            .all()
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.key)
            .collect();
        assert_eq!(keys, vec!["alice", "bob", "charlie"]);
    }

    #[tokio::test]
    async fn test_concurrent_enrolls_on_distinct_keys() {
        let registry = Registry::open_in_memory().await.unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry
                    .enroll(
                        &format!("person_{i}"),
                        &format!("Person {i}"),
                        &format!("images/person_{i}.jpg"),
                        Some(&emb(vec![i as f32])),
                    )
                    .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        assert_eq!(registry.count().await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_corrupt_blob_is_reported_not_garbled() {
        let registry = Registry::open_in_memory().await.unwrap();
        registry
            .conn
            .call(|conn| {
                conn.execute(
                    "INSERT INTO identities
                         (key, display_name, reference_image, embedding, model_version, updated_at)
                     VALUES ('bad', 'Bad', 'images/bad.jpg', X'010203', NULL, '2026-01-01T00:00:00Z')",
                    [],
                )?;
                Ok(())
            })
            .await
            .unwrap();

        let err = registry.lookup("bad").await.unwrap_err();
        match err {
            StoreError::CorruptEmbedding { key, .. } => assert_eq!(key, "bad"),
            other => panic!("expected CorruptEmbedding, got {other}"),
        }
    }
}
