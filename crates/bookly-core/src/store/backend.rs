// ── Storage backends ──
//
// The store persists envelopes through this seam so the underlying
// transport (files, in-memory, platform storage) is swappable without
// touching store logic.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io;
use std::path::{Path, PathBuf};

use dashmap::DashMap;

/// Key/value persistence for serialized envelopes.
pub trait StorageBackend: Send + Sync {
    /// Read the raw document at `key`. Absent and unreadable are the
    /// same to the store: `None`.
    fn read(&self, key: &str) -> Option<String>;

    fn write(&self, key: &str, value: &str) -> io::Result<()>;

    fn remove(&self, key: &str) -> io::Result<()>;

    /// Cheap change-detection probe used by polling observers. Two
    /// fingerprints differ iff the stored document differs.
    fn fingerprint(&self, key: &str) -> Option<u64> {
        let raw = self.read(key)?;
        let mut hasher = DefaultHasher::new();
        raw.hash(&mut hasher);
        Some(hasher.finish())
    }
}

// ── File backend ─────────────────────────────────────────────────────

/// One JSON document per key under a data directory.
///
/// Keys contain `:` separators; file names flatten them to `__` so the
/// layout stays portable.
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name = key.replace(':', "__");
        self.root.join(format!("{name}.json"))
    }
}

impl StorageBackend for FileBackend {
    fn read(&self, key: &str) -> Option<String> {
        std::fs::read_to_string(self.path_for(key)).ok()
    }

    fn write(&self, key: &str, value: &str) -> io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::write(self.path_for(key), value)
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        match std::fs::remove_file(self.path_for(key)) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

// ── Memory backend ───────────────────────────────────────────────────

/// In-memory backend for tests and ephemeral embeds.
#[derive(Default)]
pub struct MemoryBackend {
    map: DashMap<String, String>,
    fail_writes: std::sync::atomic::AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail, for exercising the store's
    /// best-effort persistence path.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    /// Seed a raw document, bypassing the failure switch.
    pub fn seed(&self, key: impl Into<String>, value: impl Into<String>) {
        self.map.insert(key.into(), value.into());
    }

    /// Whether a document exists for `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }
}

impl StorageBackend for MemoryBackend {
    fn read(&self, key: &str) -> Option<String> {
        self.map.get(key).map(|v| v.clone())
    }

    fn write(&self, key: &str, value: &str) -> io::Result<()> {
        if self.fail_writes.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(io::Error::other("simulated write failure"));
        }
        self.map.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        self.map.remove(key);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn file_backend_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path());

        assert!(backend.read("bookly:org_1:activities").is_none());
        backend.write("bookly:org_1:activities", "[1,2,3]").unwrap();
        assert_eq!(
            backend.read("bookly:org_1:activities").as_deref(),
            Some("[1,2,3]")
        );

        backend.remove("bookly:org_1:activities").unwrap();
        assert!(backend.read("bookly:org_1:activities").is_none());
    }

    #[test]
    fn file_backend_flattens_key_separators() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path());
        backend.write("org_1:bookings", "[]").unwrap();
        assert!(dir.path().join("org_1__bookings.json").exists());
    }

    #[test]
    fn remove_of_absent_key_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path());
        assert!(backend.remove("missing").is_ok());
    }

    #[test]
    fn fingerprint_tracks_content_changes() {
        let backend = MemoryBackend::new();
        assert!(backend.fingerprint("k").is_none());

        backend.seed("k", "a");
        let first = backend.fingerprint("k");
        backend.seed("k", "b");
        let second = backend.fingerprint("k");

        assert!(first.is_some());
        assert_ne!(first, second);
    }

    #[test]
    fn memory_backend_can_simulate_write_failure() {
        let backend = MemoryBackend::new();
        backend.set_fail_writes(true);
        assert!(backend.write("k", "v").is_err());
        assert!(!backend.contains("k"));
    }
}
