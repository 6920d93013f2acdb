//! Raw key/value stores behind the cache
//!
//! The cache only needs an atomic read and an atomic write of opaque strings.
//! `MemoryStore` keeps entries in process; `FileStore` persists one file per
//! key in an XDG-compliant cache directory.

use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use directories::ProjectDirs;
use tempfile::NamedTempFile;
use tokio::fs;
use tracing::warn;

/// Storage collaborator used by the cache
#[async_trait]
pub trait Store: Send + Sync {
    /// Returns the raw value stored under `key`, or `None` when there is none
    async fn read(&self, key: &str) -> io::Result<Option<String>>;

    /// Stores `raw` under `key`, replacing any previous value
    async fn write(&self, key: &str, raw: &str) -> io::Result<()>;
}

/// In-process store, mostly useful for tests and short-lived tools
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Reads the raw value without going through the async interface
    pub fn raw(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        // A panic while holding the lock cannot leave a half-written entry.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn read(&self, key: &str) -> io::Result<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    async fn write(&self, key: &str, raw: &str) -> io::Result<()> {
        self.lock().insert(key.to_string(), raw.to_string());
        Ok(())
    }
}

/// Persists each key as a file in a cache directory
///
/// Uses `~/.cache/stash/` on Linux, or the equivalent XDG path on other
/// platforms. Each write goes through its own temporary file and a rename,
/// so readers never see a partial value and concurrent writers to one key
/// leave exactly one of their payloads behind. Entries that are not valid
/// UTF-8 read as missing.
#[derive(Debug, Clone)]
pub struct FileStore {
    /// Directory where entry files are stored
    dir: PathBuf,
}

impl FileStore {
    /// Creates a FileStore in the XDG cache directory
    ///
    /// Returns `None` if the cache directory cannot be determined (e.g., no home directory).
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "stash")?;
        Some(Self {
            dir: project_dirs.cache_dir().to_path_buf(),
        })
    }

    /// Creates a FileStore in a custom directory
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the path of the file holding `key`
    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.entry", escape_key(key)))
    }
}

#[async_trait]
impl Store for FileStore {
    async fn read(&self, key: &str) -> io::Result<Option<String>> {
        let bytes = match fs::read(self.entry_path(key)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        match String::from_utf8(bytes) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) => {
                warn!(key, "entry is not valid UTF-8 ({e}); treating it as missing");
                Ok(None)
            }
        }
    }

    async fn write(&self, key: &str, raw: &str) -> io::Result<()> {
        let dir = self.dir.clone();
        let path = self.entry_path(key);
        let raw = raw.to_string();

        tokio::task::spawn_blocking(move || -> io::Result<()> {
            std::fs::create_dir_all(&dir)?;
            let mut temp = NamedTempFile::new_in(&dir)?;
            temp.write_all(raw.as_bytes())?;
            temp.as_file().sync_all()?;
            temp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(io::Error::other)?
    }
}

/// Makes a key safe to use as a file name
///
/// ASCII letters, digits, `-` and `_` pass through; every other byte becomes
/// `%XX`, so distinct keys always map to distinct files.
fn escape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' => out.push(byte as char),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (FileStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileStore::with_dir(temp_dir.path().to_path_buf());
        (store, temp_dir)
    }

    #[test]
    fn test_escape_key() {
        assert_eq!(escape_key("simple"), "simple");
        assert_eq!(escape_key("user:1"), "user%3A1");
        assert_eq!(escape_key("a/b"), "a%2Fb");
        assert_eq!(escape_key(".."), "%2E%2E");
        assert_ne!(escape_key("user:1"), escape_key("user_1"));
    }

    #[tokio::test]
    async fn test_read_returns_none_for_missing_key() {
        let (store, _temp_dir) = create_test_store();
        assert!(store.read("nonexistent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let (store, temp_dir) = create_test_store();
        store.write("user:1", r#"{"name":"Bob"}"#).await.unwrap();

        assert!(temp_dir.path().join("user%3A1.entry").exists());
        assert!(!temp_dir.path().join("user%3A1.tmp").exists());
        assert_eq!(
            store.read("user:1").await.unwrap().as_deref(),
            Some(r#"{"name":"Bob"}"#)
        );
    }

    #[tokio::test]
    async fn test_write_creates_directory_if_missing() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let nested = temp_dir.path().join("nested").join("cache");
        let store = FileStore::with_dir(nested.clone());

        store.write("k", "v").await.unwrap();
        assert!(nested.join("k.entry").exists());
    }

    #[tokio::test]
    async fn test_overwrite_existing_entry() {
        let (store, _temp_dir) = create_test_store();
        store.write("k", "first").await.unwrap();
        store.write("k", "second").await.unwrap();
        assert_eq!(store.read("k").await.unwrap().as_deref(), Some("second"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writes_to_one_key_leave_one_payload() {
        let (store, temp_dir) = create_test_store();
        let payloads: Vec<String> = (0..16u8)
            .map(|i| char::from(b'a' + i).to_string().repeat(1 + usize::from(i) * 97))
            .collect();

        let writes = payloads.iter().map(|payload| {
            let store = store.clone();
            let payload = payload.clone();
            tokio::spawn(async move { store.write("k:r", &payload).await })
        });
        for result in futures::future::join_all(writes).await {
            result.expect("task should not panic").expect("write should succeed");
        }

        let stored = store.read("k:r").await.unwrap().expect("entry should exist");
        assert!(payloads.contains(&stored), "entry mixes payloads: len {}", stored.len());

        let leftovers = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map_or(true, |ext| ext != "entry"))
            .count();
        assert_eq!(leftovers, 0, "temporary files should not be left behind");
    }

    #[tokio::test]
    async fn test_non_utf8_entry_reads_as_missing() {
        let (store, _temp_dir) = create_test_store();
        store.write("doc:1", "placeholder").await.unwrap();
        std::fs::write(store.entry_path("doc:1"), [0xff, 0xfe, 0x00]).unwrap();

        assert!(store.read("doc:1").await.unwrap().is_none());
    }

    #[test]
    fn test_new_creates_xdg_compliant_path() {
        if let Some(store) = FileStore::new() {
            assert!(store.dir().to_string_lossy().contains("stash"));
        }
        // Passes when no home directory is available (e.g., CI)
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryStore::new();
        assert!(store.is_empty());
        store.write("a", "1").await.unwrap();
        store.write("a", "2").await.unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.read("a").await.unwrap().as_deref(), Some("2"));
        assert_eq!(store.raw("a").as_deref(), Some("2"));
    }
}
