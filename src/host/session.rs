use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Page-scoped key/value storage. Survives navigations within the owning tab;
/// clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct SessionStorage {
    items: Arc<Mutex<HashMap<String, String>>>,
}

impl SessionStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_item(&self, key: &str) -> Option<String> {
        self.items
            .lock()
            .ok()
            .and_then(|items| items.get(key).cloned())
    }

    pub fn set_item(&self, key: &str, value: &str) {
        if let Ok(mut items) = self.items.lock() {
            items.insert(key.to_string(), value.to_string());
        }
    }

    #[cfg(test)]
    pub fn remove_item(&self, key: &str) {
        if let Ok(mut items) = self.items.lock() {
            items.remove(key);
        }
    }
}
