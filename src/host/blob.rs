use std::collections::HashMap;
#[cfg(test)]
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;

#[derive(Debug, Clone)]
pub struct BlobEntry {
    pub bytes: Bytes,
    pub mime_type: String,
}

/// In-memory object URLs (`blob:<origin>/<n>`).
#[derive(Debug, Clone, Default)]
pub struct BlobStore {
    entries: Arc<Mutex<HashMap<String, BlobEntry>>>,
    #[cfg(test)]
    next: Arc<AtomicU64>,
}

impl BlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn create_object_url(&self, origin: &str, bytes: Bytes, mime_type: &str) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        let url = format!("blob:{}/{}", origin.trim_end_matches('/'), n);
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                url.clone(),
                BlobEntry {
                    bytes,
                    mime_type: mime_type.to_string(),
                },
            );
        }
        url
    }

    pub fn get(&self, url: &str) -> Option<BlobEntry> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(url).cloned())
    }

    #[cfg(test)]
    pub fn revoke_object_url(&self, url: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(url);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_url_lifecycle() {
        let store = BlobStore::new();
        let url = store.create_object_url(
            "https://www.tokyomotion.net/",
            Bytes::from_static(b"abc"),
            "video/mp4",
        );
        assert_eq!(url, "blob:https://www.tokyomotion.net/1");
        assert_eq!(store.get(&url).unwrap().bytes, Bytes::from_static(b"abc"));

        store.revoke_object_url(&url);
        assert!(store.get(&url).is_none());
    }
}
