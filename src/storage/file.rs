use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use parking_lot::Mutex;

use super::{KeyValueStore, StoreError};

/// Key/value store backed by a single JSON object on disk.
///
/// Every write replaces the whole file through a sibling temp file and a
/// rename, so a group of keys lands together or not at all.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn read_map(&self) -> Result<BTreeMap<String, String>, StoreError> {
        match fs::read(&self.path) {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if map.is_empty() {
            return match fs::remove_file(&self.path) {
                Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
                _ => Ok(()),
            };
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(map)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let _guard = self.lock.lock();
        Ok(self.read_map()?.remove(key))
    }

    fn set_many(&self, entries: &[(&str, String)]) -> Result<(), StoreError> {
        let _guard = self.lock.lock();
        // A corrupt file is replaced rather than merged into.
        let mut map = match self.read_map() {
            Ok(map) => map,
            Err(StoreError::Format(_)) => BTreeMap::new(),
            Err(e) => return Err(e),
        };
        for (key, value) in entries {
            map.insert((*key).to_string(), value.clone());
        }
        self.write_map(&map)
    }

    fn remove_many(&self, keys: &[&str]) -> Result<(), StoreError> {
        let _guard = self.lock.lock();
        let mut map = match self.read_map() {
            Ok(map) => map,
            Err(StoreError::Format(_)) => BTreeMap::new(),
            Err(e) => return Err(e),
        };
        for key in keys {
            map.remove(*key);
        }
        self.write_map(&map)
    }
}
