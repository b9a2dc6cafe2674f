use dashmap::DashMap;
use std::path::PathBuf;
use tracing::{debug, warn};
use url::form_urlencoded;

use crate::{DialError, Result};

/// Longest key or value kept, in bytes.
pub const DIAL_DATA_MAX_LEN: usize = 255;

/// Key/value pairs an application posted to its `dial_data` endpoint.
pub type DialData = Vec<(String, String)>;

/// Per-application storage for DIAL additional data.
pub trait DialDataStore: Send + Sync {
    /// Replaces whatever was stored for `app`.
    fn store(&self, app: &str, data: &[(String, String)]) -> Result<()>;

    /// Stored pairs for `app`; empty when nothing was stored.
    fn retrieve(&self, app: &str) -> DialData;
}

fn truncate(value: &str) -> String {
    if value.len() <= DIAL_DATA_MAX_LEN {
        return value.to_string();
    }
    let mut end = DIAL_DATA_MAX_LEN;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    value[..end].to_string()
}

fn truncated(data: &[(String, String)]) -> DialData {
    data.iter().map(|(k, v)| (truncate(k), truncate(v))).collect()
}

#[derive(Default)]
pub struct MemoryDataStore {
    entries: DashMap<String, DialData>,
}

impl MemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DialDataStore for MemoryDataStore {
    fn store(&self, app: &str, data: &[(String, String)]) -> Result<()> {
        self.entries.insert(app.to_string(), truncated(data));
        Ok(())
    }

    fn retrieve(&self, app: &str) -> DialData {
        self.entries
            .get(app)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }
}

/// One file per application, one `key value` line per pair. Both sides are
/// form-encoded so neither can contain the separator.
pub struct FileDataStore {
    dir: PathBuf,
}

impl FileDataStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, app: &str) -> Result<PathBuf> {
        let safe = !app.is_empty()
            && app
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !app.starts_with('.');
        if !safe {
            return Err(DialError::Config(format!("invalid application name for data file: {:?}", app)));
        }
        Ok(self.dir.join(app))
    }
}

fn encode(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

fn decode(value: &str) -> String {
    form_urlencoded::parse(format!("v={}", value).as_bytes())
        .next()
        .map(|(_, v)| v.into_owned())
        .unwrap_or_default()
}

impl DialDataStore for FileDataStore {
    fn store(&self, app: &str, data: &[(String, String)]) -> Result<()> {
        let path = self.path_for(app)?;
        let body: String = truncated(data)
            .iter()
            .map(|(k, v)| format!("{} {}\n", encode(k), encode(v)))
            .collect();
        std::fs::write(&path, body)?;
        debug!("Stored {} DIAL data pairs in {}", data.len(), path.display());
        Ok(())
    }

    fn retrieve(&self, app: &str) -> DialData {
        let path = match self.path_for(app) {
            Ok(path) => path,
            Err(_) => return Vec::new(),
        };

        // A missing file just means nothing was stored yet
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!("Failed to read DIAL data {}: {}", path.display(), e);
                return Vec::new();
            }
        };

        raw.lines()
            .filter_map(|line| {
                let (key, value) = line.split_once(' ')?;
                Some((decode(key), decode(value)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(raw: &[(&str, &str)]) -> DialData {
        raw.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_memory_store_replaces() {
        let store = MemoryDataStore::new();
        assert!(store.retrieve("YouTube").is_empty());

        store.store("YouTube", &pairs(&[("a", "1")])).unwrap();
        store.store("YouTube", &pairs(&[("b", "2")])).unwrap();
        assert_eq!(store.retrieve("YouTube"), pairs(&[("b", "2")]));
    }

    #[test]
    fn test_values_are_truncated() {
        let store = MemoryDataStore::new();
        let long = "é".repeat(200);
        store.store("YouTube", &[("k".to_string(), long)]).unwrap();

        let (_, value) = &store.retrieve("YouTube")[0];
        assert!(value.len() <= DIAL_DATA_MAX_LEN);
        assert!(value.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_file_store_keeps_spaces_and_symbols() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDataStore::new(dir.path()).unwrap();

        let data = pairs(&[("resume token", "a b&c=d"), ("t", "42")]);
        store.store("YouTube", &data).unwrap();
        assert_eq!(store.retrieve("YouTube"), data);
        assert!(store.retrieve("Netflix").is_empty());
    }

    #[test]
    fn test_file_store_rejects_path_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDataStore::new(dir.path()).unwrap();
        assert!(store.store("../escape", &[]).is_err());
        assert!(store.retrieve("../escape").is_empty());
    }
}
