//! File-backed key-value store.

use crate::error::{StorageError, StorageResult};
use crate::kv::KeyValueStore;
use fs2::FileExt;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// A durable key-value store kept as one JSON object on disk.
///
/// # Durability
///
/// Every `set`/`remove` rewrites a temporary file, syncs it, and renames it
/// over the store file, so a crash leaves either the old or the new map.
///
/// # Locking
///
/// The store holds an exclusive advisory lock on `<path>.lock` for its
/// lifetime; a second open of the same path fails with
/// [`StorageError::Locked`].
///
/// # Example
///
/// ```no_run
/// use syncline_storage::{CursorStore, FileKvStore};
/// use std::path::Path;
///
/// let kv = FileKvStore::open(Path::new("sync-state.json")).unwrap();
/// let cursors = CursorStore::new(kv);
/// cursors.save("todos", 1_700_000_000_000).unwrap();
/// ```
#[derive(Debug)]
pub struct FileKvStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
    _lock_file: File,
}

impl FileKvStore {
    /// Opens or creates the store at `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - another handle holds the lock (`Locked`)
    /// - the existing file is not a JSON string map (`Corrupted`)
    /// - I/O fails
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(Self::sidecar(path, "lock"))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked(path.to_path_buf()));
        }

        let entries = match fs::read(path) {
            Ok(bytes) if bytes.is_empty() => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                StorageError::Corrupted(format!("{}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path: path.to_path_buf(),
            entries: RwLock::new(entries),
            _lock_file: lock_file,
        })
    }

    /// Returns the path of the store file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sidecar(path: &Path, extension: &str) -> PathBuf {
        let mut name = path.as_os_str().to_os_string();
        name.push(".");
        name.push(extension);
        PathBuf::from(name)
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> StorageResult<()> {
        let temp_path = Self::sidecar(&self.path, "tmp");
        {
            let mut temp = File::create(&temp_path)?;
            temp.write_all(&serde_json::to_vec_pretty(entries)?)?;
            temp.sync_all()?;
        }
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileKvStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut entries = self.entries.write();
        let previous = entries.insert(key.to_string(), value.to_string());
        if let Err(e) = self.persist(&entries) {
            match previous {
                Some(old) => entries.insert(key.to_string(), old),
                None => entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let mut entries = self.entries.write();
        let Some(previous) = entries.remove(key) else {
            return Ok(());
        };
        if let Err(e) = self.persist(&entries) {
            entries.insert(key.to_string(), previous);
            return Err(e);
        }
        Ok(())
    }
}
