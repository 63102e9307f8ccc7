//! BlobStore - temporary references to uploaded image bytes
//!
//! Each uploaded image gets a short-lived id served at `/api/images/<id>`
//! while it is the active source. Revocation is immediate; created/revoked
//! counters make leaked references visible in the session snapshot.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use uuid::Uuid;

use crate::error::{Error, Result};

/// One submitted file
#[derive(Debug, Clone)]
pub struct ImageFile {
    pub file_name: Option<String>,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl ImageFile {
    pub fn new(content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: None,
            content_type: content_type.into(),
            bytes,
        }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// MIME must be `image/*`; size must not exceed `max_bytes`
    pub fn validate(&self, max_bytes: u64) -> Result<()> {
        let mime = self.content_type.trim().to_ascii_lowercase();
        if !mime.starts_with("image/") {
            return Err(Error::UnsupportedFileType(if mime.is_empty() {
                "unknown".to_string()
            } else {
                mime
            }));
        }

        if self.size() > max_bytes {
            return Err(Error::FileTooLarge {
                size: self.size(),
                limit: max_bytes,
            });
        }

        Ok(())
    }
}

/// Live reference to an uploaded image
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageReference {
    pub id: Uuid,
    pub content_type: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

impl ImageReference {
    pub fn url(&self) -> String {
        format!("/api/images/{}", self.id)
    }
}

/// Reference counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BlobStats {
    pub created: u64,
    pub revoked: u64,
    pub live: usize,
}

struct BlobEntry {
    content_type: String,
    data: Arc<[u8]>,
}

/// In-memory blob references
pub struct BlobStore {
    blobs: RwLock<HashMap<Uuid, BlobEntry>>,
    created: AtomicU64,
    revoked: AtomicU64,
}

impl BlobStore {
    pub fn new() -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
            created: AtomicU64::new(0),
            revoked: AtomicU64::new(0),
        }
    }

    /// Store the bytes and hand out a fresh reference
    pub fn create(&self, file: ImageFile) -> ImageReference {
        let reference = ImageReference {
            id: Uuid::new_v4(),
            content_type: file.content_type,
            size: file.bytes.len() as u64,
            created_at: Utc::now(),
        };

        let entry = BlobEntry {
            content_type: reference.content_type.clone(),
            data: file.bytes.into(),
        };

        self.blobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(reference.id, entry);
        self.created.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            blob_id = %reference.id,
            size = reference.size,
            content_type = %reference.content_type,
            "Image reference created"
        );

        reference
    }

    /// Content type and bytes of a live reference
    pub fn get(&self, id: &Uuid) -> Option<(String, Arc<[u8]>)> {
        self.blobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .map(|entry| (entry.content_type.clone(), Arc::clone(&entry.data)))
    }

    /// Returns false if the reference was already revoked
    pub fn revoke(&self, id: &Uuid) -> bool {
        let removed = self
            .blobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some();

        if removed {
            self.revoked.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(blob_id = %id, "Image reference revoked");
        }
        removed
    }

    pub fn stats(&self) -> BlobStats {
        BlobStats {
            created: self.created.load(Ordering::Relaxed),
            revoked: self.revoked.load(Ordering::Relaxed),
            live: self
                .blobs
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
        }
    }
}

impl Default for BlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn test_validate_rejects_non_images() {
        let file = ImageFile::new("text/plain", b"hello".to_vec());
        assert!(matches!(
            file.validate(10 * MIB),
            Err(Error::UnsupportedFileType(_))
        ));

        let file = ImageFile::new("", vec![1, 2, 3]);
        assert!(matches!(
            file.validate(10 * MIB),
            Err(Error::UnsupportedFileType(_))
        ));
    }

    #[test]
    fn test_validate_size_ceiling() {
        let at_limit = ImageFile::new("image/png", vec![0; 1024]);
        assert!(at_limit.validate(1024).is_ok());

        let over = ImageFile::new("image/png", vec![0; 1025]);
        assert!(matches!(
            over.validate(1024),
            Err(Error::FileTooLarge {
                size: 1025,
                limit: 1024
            })
        ));
    }

    #[test]
    fn test_validate_accepts_mixed_case_mime() {
        let file = ImageFile::new("Image/JPEG", vec![0; 4]);
        assert!(file.validate(10 * MIB).is_ok());
    }

    #[test]
    fn test_create_get_revoke() {
        let store = BlobStore::new();
        let reference = store.create(ImageFile::new("image/png", vec![1, 2, 3]));
        assert_eq!(reference.url(), format!("/api/images/{}", reference.id));

        let (content_type, data) = store.get(&reference.id).unwrap();
        assert_eq!(content_type, "image/png");
        assert_eq!(&data[..], &[1, 2, 3]);

        assert!(store.revoke(&reference.id));
        assert!(store.get(&reference.id).is_none());
        // second revoke is a no-op
        assert!(!store.revoke(&reference.id));

        assert_eq!(
            store.stats(),
            BlobStats {
                created: 1,
                revoked: 1,
                live: 0
            }
        );
    }
}
