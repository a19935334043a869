pub mod file;

use std::collections::HashMap;

use parking_lot::Mutex;

pub use file::FileStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage contents are not valid JSON: {0}")]
    Format(#[from] serde_json::Error),
}

/// Client-side key/value persistence. Writes and removals take a whole group
/// of keys and must apply all of them or none.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set_many(&self, entries: &[(&str, String)]) -> Result<(), StoreError>;

    fn remove_many(&self, keys: &[&str]) -> Result<(), StoreError>;
}

/// Process-local store, used by tests and by callers that opt out of
/// persistence.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: Mutex::new(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set_many(&self, entries: &[(&str, String)]) -> Result<(), StoreError> {
        let mut map = self.entries.lock();
        for (key, value) in entries {
            map.insert((*key).to_string(), value.clone());
        }
        Ok(())
    }

    fn remove_many(&self, keys: &[&str]) -> Result<(), StoreError> {
        let mut map = self.entries.lock();
        for key in keys {
            map.remove(*key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_group_operations() {
        let store = MemoryStore::new();
        store
            .set_many(&[("a", "1".into()), ("b", "2".into())])
            .unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));

        store.remove_many(&["a", "b"]).unwrap();
        assert!(store.is_empty());
    }
}
