//! File-based key-value storage for persistent data.

use crate::backend::KeyValueStorage;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Suffix of every value file.
const VALUE_EXT: &str = "val";
/// Suffix of in-flight temporary files.
const TEMP_EXT: &str = "tmp";

/// A directory-based key-value storage.
///
/// Each key is stored in its own file inside the directory. Key names are
/// escaped into portable file names, so any string is a valid key.
///
/// # Durability
///
/// `set` writes the value to a temporary file, syncs it and renames it over
/// the previous file, so a crash mid-write leaves either the old or the new
/// value, never a torn one.
///
/// # Thread Safety
///
/// This storage is thread-safe and can be shared across threads.
/// Internal locking serializes writers.
///
/// # Example
///
/// ```no_run
/// use deskstore_storage::{KeyValueStorage, FileStorage};
/// use std::path::Path;
///
/// let storage = FileStorage::open(Path::new("data")).unwrap();
/// storage.set("deskstore_todos_u1", "[]").unwrap();
/// ```
#[derive(Debug)]
pub struct FileStorage {
    dir: PathBuf,
    lock: RwLock<()>,
}

impl FileStorage {
    /// Opens or creates a file storage rooted at `dir`.
    ///
    /// Missing parent directories are created.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: &Path) -> StorageResult<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            lock: RwLock::new(()),
        })
    }

    /// Returns the directory holding the value files.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn value_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{VALUE_EXT}", escape_key(key)))
    }

    fn temp_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{TEMP_EXT}", escape_key(key)))
    }

    fn value_files(&self) -> StorageResult<Vec<(String, PathBuf)>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(VALUE_EXT) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Some(key) = unescape_key(stem) {
                files.push((key, path));
            }
        }
        Ok(files)
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let _guard = self.lock.read();
        match fs::read(self.value_path(key)) {
            Ok(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|_| StorageError::InvalidEncoding {
                    key: key.to_string(),
                }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let _guard = self.lock.write();
        let temp = self.temp_path(key);
        {
            let mut file: File = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp)?;
            file.write_all(value.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&temp, self.value_path(key))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let _guard = self.lock.write();
        match fs::remove_file(self.value_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        let _guard = self.lock.read();
        Ok(self.value_files()?.into_iter().map(|(k, _)| k).collect())
    }

    fn usage_bytes(&self) -> StorageResult<u64> {
        let _guard = self.lock.read();
        let mut total = 0u64;
        for (key, path) in self.value_files()? {
            total += key.len() as u64 + fs::metadata(path)?.len();
        }
        Ok(total)
    }
}

/// Escapes a key into a file-name-safe string.
///
/// ASCII alphanumerics, `-` and `_` pass through; every other byte becomes
/// `%XX`.
fn escape_key(key: &str) -> String {
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

fn unescape_key(name: &str) -> Option<String> {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = name.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
