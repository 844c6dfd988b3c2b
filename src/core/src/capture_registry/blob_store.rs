//! Transient binary storage for recordings awaiting upload.
//!
//! Every recording handed to the registry is parked here under an opaque
//! [`ObjectUrl`]. The URL stays valid until it is revoked, which the registry
//! does when the owning recording is removed or the session is superseded.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, trace};
use uuid::Uuid;

/// Handle to a blob parked in a [`BlobStore`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectUrl(String);

impl ObjectUrl {
    fn generate() -> Self {
        ObjectUrl(format!("blob:capture-sync/{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug)]
struct StoredBlob {
    bytes: Vec<u8>,
    mime_type: String,
}

#[derive(Debug, Default)]
pub struct BlobStore {
    blobs: Mutex<HashMap<ObjectUrl, StoredBlob>>,
}

impl BlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn blobs(&self) -> MutexGuard<'_, HashMap<ObjectUrl, StoredBlob>> {
        self.blobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Parks `bytes` and returns the URL that now owns them.
    pub fn create_object_url(&self, bytes: Vec<u8>, mime_type: &str) -> ObjectUrl {
        let url = ObjectUrl::generate();
        trace!("[{}] parked {} byte(s) ({})", url, bytes.len(), mime_type);
        self.blobs().insert(
            url.clone(),
            StoredBlob {
                bytes,
                mime_type: mime_type.to_string(),
            },
        );
        url
    }

    /// Returns a copy of the blob bytes and its MIME type, if the URL is still live.
    pub fn read(&self, url: &ObjectUrl) -> Option<(Vec<u8>, String)> {
        self.blobs()
            .get(url)
            .map(|blob| (blob.bytes.clone(), blob.mime_type.clone()))
    }

    /// Releases the blob behind `url`. Returns `false` if it was already revoked.
    pub fn revoke(&self, url: &ObjectUrl) -> bool {
        let released = self.blobs().remove(url);
        match released {
            Some(blob) => {
                debug!("[{}] revoked ({} byte(s) released)", url, blob.bytes.len());
                true
            }
            None => false,
        }
    }

    pub fn live_count(&self) -> usize {
        self.blobs().len()
    }

    pub fn live_bytes(&self) -> usize {
        self.blobs().values().map(|b| b.bytes.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_url_lifecycle() {
        let store = BlobStore::new();
        let url = store.create_object_url(vec![1, 2, 3], "video/webm");
        assert!(url.as_str().starts_with("blob:"));
        assert_eq!(store.live_count(), 1);
        assert_eq!(store.live_bytes(), 3);

        let (bytes, mime) = store.read(&url).unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
        assert_eq!(mime, "video/webm");

        assert!(store.revoke(&url));
        assert!(!store.revoke(&url));
        assert!(store.read(&url).is_none());
        assert_eq!(store.live_count(), 0);
    }
}
