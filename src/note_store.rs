//! Durable archive for canonical protocol documents
//!
//! Notes and grant documents are generated once, at the Signed stage, and
//! persisted verbatim under a stable identifier. Later stages (broadcast,
//! protocol retrieval) read the stored bytes back rather than regenerating
//! them, so a document can never drift from what was signed. Writing a
//! different payload under an existing identifier is an integrity error,
//! not an overwrite.

use crate::error::{LaurelError, Result};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Length of the derived note key (hex characters)
const NOTE_KEY_LEN: usize = 16;

/// Result of persisting a document
#[derive(Debug, Clone)]
pub struct StoredDocument {
    /// Identifier the document is stored under
    pub key: String,
    /// Fingerprint of the stored bytes
    pub fingerprint: String,
    /// Size in bytes
    pub size_bytes: u64,
    /// Whether an identical document was already present
    pub already_existed: bool,
}

/// Document archive rooted at a directory
pub struct NoteStore {
    root_dir: PathBuf,
}

impl NoteStore {
    /// Create a document archive at the given directory
    pub async fn new<P: AsRef<Path>>(root_dir: P) -> Result<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();

        fs::create_dir_all(root_dir.join("notes")).await?;
        fs::create_dir_all(root_dir.join("grants")).await?;

        info!(path = %root_dir.display(), "Initialized document archive");

        Ok(Self { root_dir })
    }

    /// Derive the stable note key for a grant
    ///
    /// The key is a digest prefix over the issuing actor's URI and the grant
    /// id, so the same grant always maps to the same note identifier.
    pub fn derive_note_key(actor_uri: &str, grant_id: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(actor_uri.as_bytes());
        hasher.update(b"/grants/");
        hasher.update(grant_id.to_string().as_bytes());
        let digest = hex::encode(hasher.finalize());
        digest[..NOTE_KEY_LEN].to_string()
    }

    /// Compute the fingerprint of a document
    pub fn fingerprint(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        format!("sha256-{}", hex::encode(hasher.finalize()))
    }

    fn note_path(&self, key: &str) -> PathBuf {
        self.root_dir.join("notes").join(format!("{}.json", key))
    }

    fn grant_path(&self, grant_id: i64) -> PathBuf {
        self.root_dir.join("grants").join(format!("{}.json", grant_id))
    }

    /// Persist a note document under its key, write-once
    ///
    /// Re-storing identical bytes is an idempotent no-op. Re-storing
    /// different bytes under the same key fails with a fingerprint mismatch.
    pub async fn put_note(&self, key: &str, document: &[u8]) -> Result<StoredDocument> {
        self.put(self.note_path(key), key, document).await
    }

    /// Persist the public grant document for protocol retrieval
    pub async fn put_grant_document(&self, grant_id: i64, document: &[u8]) -> Result<StoredDocument> {
        self.put(self.grant_path(grant_id), &grant_id.to_string(), document)
            .await
    }

    async fn put(&self, path: PathBuf, key: &str, document: &[u8]) -> Result<StoredDocument> {
        let fingerprint = Self::fingerprint(document);

        if fs::metadata(&path).await.is_ok() {
            let existing = fs::read(&path).await?;
            let existing_fingerprint = Self::fingerprint(&existing);

            if existing_fingerprint != fingerprint {
                return Err(LaurelError::Integrity {
                    expected: existing_fingerprint,
                    actual: fingerprint,
                });
            }

            debug!(key = %key, "Document already archived");
            return Ok(StoredDocument {
                key: key.to_string(),
                fingerprint,
                size_bytes: document.len() as u64,
                already_existed: true,
            });
        }

        fs::write(&path, document).await?;

        info!(key = %key, size = document.len(), "Archived document");

        Ok(StoredDocument {
            key: key.to_string(),
            fingerprint,
            size_bytes: document.len() as u64,
            already_existed: false,
        })
    }

    /// Read a note document back, verbatim
    pub async fn get_note(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.note_path(key);

        if fs::metadata(&path).await.is_err() {
            return Err(LaurelError::NotFound(format!("note {}", key)));
        }

        Ok(fs::read(&path).await?)
    }

    /// Read a grant document back, verbatim
    pub async fn get_grant_document(&self, grant_id: i64) -> Result<Vec<u8>> {
        let path = self.grant_path(grant_id);

        if fs::metadata(&path).await.is_err() {
            return Err(LaurelError::NotFound(format!("grant document {}", grant_id)));
        }

        Ok(fs::read(&path).await?)
    }

    /// Check whether a note document exists
    pub async fn note_exists(&self, key: &str) -> bool {
        fs::metadata(self.note_path(key)).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_and_get_note() {
        let temp_dir = TempDir::new().unwrap();
        let store = NoteStore::new(temp_dir.path()).await.unwrap();

        let document = br#"{"type":"Note","content":"badge"}"#;
        let result = store.put_note("abcd1234abcd1234", document).await.unwrap();

        assert!(result.fingerprint.starts_with("sha256-"));
        assert!(!result.already_existed);

        let read_back = store.get_note("abcd1234abcd1234").await.unwrap();
        assert_eq!(read_back, document);
    }

    #[tokio::test]
    async fn test_rewrite_identical_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let store = NoteStore::new(temp_dir.path()).await.unwrap();

        let document = br#"{"type":"Note"}"#;
        let first = store.put_note("aaaa", document).await.unwrap();
        let second = store.put_note("aaaa", document).await.unwrap();

        assert_eq!(first.fingerprint, second.fingerprint);
        assert!(!first.already_existed);
        assert!(second.already_existed);
    }

    #[tokio::test]
    async fn test_rewrite_different_content_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let store = NoteStore::new(temp_dir.path()).await.unwrap();

        store.put_note("aaaa", br#"{"v":1}"#).await.unwrap();
        let result = store.put_note("aaaa", br#"{"v":2}"#).await;

        assert!(matches!(result, Err(LaurelError::Integrity { .. })));
    }

    #[tokio::test]
    async fn test_missing_note_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let store = NoteStore::new(temp_dir.path()).await.unwrap();

        let result = store.get_note("ffff").await;
        assert!(matches!(result, Err(LaurelError::NotFound(_))));
        assert!(!store.note_exists("ffff").await);
    }

    #[tokio::test]
    async fn test_note_key_is_stable() {
        let a = NoteStore::derive_note_key("https://badges.example.org/actors/issuer", 42);
        let b = NoteStore::derive_note_key("https://badges.example.org/actors/issuer", 42);
        let c = NoteStore::derive_note_key("https://badges.example.org/actors/issuer", 43);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_grant_document_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let store = NoteStore::new(temp_dir.path()).await.unwrap();

        let document = br#"{"id":"https://badges.example.org/grants/7"}"#;
        store.put_grant_document(7, document).await.unwrap();

        let read_back = store.get_grant_document(7).await.unwrap();
        assert_eq!(read_back, document);

        let missing = store.get_grant_document(8).await;
        assert!(matches!(missing, Err(LaurelError::NotFound(_))));
    }
}
