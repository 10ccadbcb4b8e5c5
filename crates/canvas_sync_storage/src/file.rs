//! File-based key-value store for persistent storage.

use crate::backend::KeyValueStore;
use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = ".lock";
const VALUE_EXT: &str = "val";
const TEMP_EXT: &str = "tmp";

/// A directory-backed key-value store.
///
/// Each key is stored in its own file. Keys are escaped into file names so
/// any UTF-8 key (including `canvas-state:<id>`) is portable.
///
/// # Durability
///
/// Every write goes to a temporary file in the same directory, is synced to
/// disk, and is then renamed over the target. A crash therefore leaves either
/// the previous value or the new one.
///
/// # Concurrency
///
/// Writers inside the process are serialized by an internal mutex; writers in
/// other processes are serialized by an exclusive lock on a `.lock` file in
/// the store directory.
///
/// # Example
///
/// ```no_run
/// use canvas_sync_storage::{KeyValueStore, FileStore};
/// use std::path::Path;
///
/// let store = FileStore::open(Path::new("canvas-store")).unwrap();
/// store.set("canvas-state:demo", b"persistent data").unwrap();
/// ```
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock_file: File,
    write_guard: Mutex<()>,
}

impl FileStore {
    /// Opens or creates a store rooted at the given directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the lock file
    /// cannot be opened.
    pub fn open(path: &Path) -> StorageResult<Self> {
        fs::create_dir_all(path)?;
        if !path.is_dir() {
            return Err(StorageError::Io(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("path is not a directory: {}", path.display()),
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        Ok(Self {
            path: path.to_path_buf(),
            lock_file,
            write_guard: Mutex::new(()),
        })
    }

    /// Returns the store directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn value_path(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self
            .path
            .join(format!("{}.{}", encode_key(key), VALUE_EXT)))
    }

    fn read_value(path: &Path) -> StorageResult<Option<Vec<u8>>> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_value(&self, path: &Path, value: &[u8]) -> StorageResult<()> {
        let temp_path = path.with_extension(TEMP_EXT);
        {
            let mut temp = File::create(&temp_path)?;
            temp.write_all(value)?;
            temp.sync_all()?;
        }
        if let Err(e) = fs::rename(&temp_path, path) {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }
        sync_dir(&self.path);
        Ok(())
    }

    fn with_exclusive<R>(&self, f: impl FnOnce() -> StorageResult<R>) -> StorageResult<R> {
        let _guard = self.write_guard.lock();
        self.lock_file.lock_exclusive()?;
        let result = f();
        if let Err(e) = FileExt::unlock(&self.lock_file) {
            tracing::warn!(error = %e, "failed to release store lock");
        }
        result
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let path = self.value_path(key)?;
        // Renames are atomic, so readers never observe a partial value.
        Self::read_value(&path)
    }

    fn set(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        let path = self.value_path(key)?;
        self.with_exclusive(|| self.write_value(&path, value))
    }

    fn update(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<&[u8]>) -> Option<Vec<u8>>,
    ) -> StorageResult<bool> {
        let path = self.value_path(key)?;
        self.with_exclusive(|| {
            let current = Self::read_value(&path)?;
            match f(current.as_deref()) {
                Some(next) => {
                    self.write_value(&path, &next)?;
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let Some(stem) = name.strip_suffix(&format!(".{VALUE_EXT}")) else {
                continue;
            };
            match decode_key(stem) {
                Some(key) => keys.push(key),
                None => {
                    return Err(StorageError::Corrupted(format!(
                        "unrecognized value file: {name}"
                    )))
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Escapes a key into a portable file name stem.
///
/// ASCII alphanumerics, `-` and `_` pass through; every other byte becomes
/// `%XX`.
fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

fn decode_key(stem: &str) -> Option<String> {
    let bytes = stem.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = stem.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

#[cfg(unix)]
fn sync_dir(path: &Path) {
    if let Ok(dir) = File::open(path) {
        let _ = dir.sync_all();
    }
}

#[cfg(not(unix))]
fn sync_dir(_path: &Path) {}
