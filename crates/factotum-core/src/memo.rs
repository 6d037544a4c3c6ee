//! Memo overlay
//!
//! Small persistent key/value store at `<data-dir>/memo.json`, backing the
//! `memory` tool. The real memory system is an external collaborator; this
//! overlay only covers store/retrieve/search/list.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Result;

pub struct MemoStore {
    path: PathBuf,
    // Guards read-modify-write cycles on the backing file.
    lock: Mutex<()>,
}

impl MemoStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn open_default() -> Self {
        Self::new(crate::paths::memo_path())
    }

    fn load(&self) -> BTreeMap<String, String> {
        fs::read_to_string(&self.path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }

    fn save(&self, map: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(map)?)?;
        Ok(())
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut map = self.load();
        map.insert(key.to_string(), value.to_string());
        self.save(&map)
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        self.load().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        self.load().keys().cloned().collect()
    }

    /// Case-insensitive substring search over keys and values.
    pub fn search(&self, query: &str) -> Vec<(String, String)> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        let needle = query.to_lowercase();
        self.load()
            .into_iter()
            .filter(|(k, v)| {
                k.to_lowercase().contains(&needle) || v.to_lowercase().contains(&needle)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn set_get_search() {
        let tmp = TempDir::new().unwrap();
        let store = MemoStore::new(tmp.path().join("memo.json"));

        store.set("favorite_editor", "helix").unwrap();
        store.set("deploy_host", "prod-7").unwrap();

        assert_eq!(store.get("favorite_editor").as_deref(), Some("helix"));
        assert_eq!(store.keys().len(), 2);

        let hits = store.search("HELIX");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, "favorite_editor");
    }
}
