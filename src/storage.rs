// Low-level file helpers: cross-process locking and atomic writes.
use anyhow::Result;
use fs2::FileExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};

pub struct LocalStorage;

impl LocalStorage {
    fn get_lock_path(file_path: &Path) -> PathBuf {
        let mut lock_path = file_path.to_path_buf();
        if let Some(ext) = lock_path.extension() {
            let mut new_ext = ext.to_os_string();
            new_ext.push(".lock");
            lock_path.set_extension(new_ext);
        } else {
            lock_path.set_extension("lock");
        }
        lock_path
    }

    /// Runs `f` while holding an exclusive lock on `<file>.lock`.
    pub fn with_lock<F, T>(file_path: &Path, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let lock_path = Self::get_lock_path(file_path);
        let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        file.lock_exclusive()?;
        let result = f();
        FileExt::unlock(&file)?;
        result
    }

    /// Atomic write: Write to .tmp file then rename
    pub fn atomic_write<P: AsRef<Path>, C: AsRef<[u8]>>(path: P, contents: C) -> Result<()> {
        let path = path.as_ref();
        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, contents)?;
        fs::rename(tmp_path, path)?;
        Ok(())
    }

    /// Reads a JSON document under lock. A missing file yields `Ok(None)`.
    pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
        if !path.exists() {
            return Ok(None);
        }
        Self::with_lock(path, || {
            let content = fs::read_to_string(path)?;
            let value = serde_json::from_str(&content).map_err(|e| {
                anyhow::anyhow!("Failed to parse '{}': {}", path.display(), e)
            })?;
            Ok(Some(value))
        })
    }

    /// Serializes `value` as pretty JSON and writes it atomically under lock.
    pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
        Self::with_lock(path, || {
            let json = serde_json::to_string_pretty(value)?;
            Self::atomic_write(path, json)?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AppContext, TestContext};
    use std::collections::HashMap;

    #[test]
    fn test_json_roundtrip_and_missing() {
        let ctx = TestContext::new();
        let path = ctx.get_data_dir().unwrap().join("doc.json");

        let missing: Option<HashMap<String, i64>> = LocalStorage::read_json(&path).unwrap();
        assert!(missing.is_none());

        let mut doc = HashMap::new();
        doc.insert("a".to_string(), 1i64);
        LocalStorage::write_json(&path, &doc).unwrap();

        let back: HashMap<String, i64> = LocalStorage::read_json(&path).unwrap().unwrap();
        assert_eq!(back, doc);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let ctx = TestContext::new();
        let path = ctx.get_data_dir().unwrap().join("bad.json");
        fs::write(&path, "{not json").unwrap();
        let res: Result<Option<Vec<i64>>> = LocalStorage::read_json(&path);
        assert!(res.is_err());
    }
}
