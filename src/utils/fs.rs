//! File store abstraction and the local tokio-backed implementation

use crate::utils::errors::ContextError;
use crate::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tokio::fs;

/// Metadata returned by [`FileStore::stat`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    /// Size in bytes
    pub size: u64,
    /// Last modification time in milliseconds since the Unix epoch
    pub modified_millis: i64,
    pub is_file: bool,
    pub is_directory: bool,
}

/// A directory entry returned by [`FileStore::list`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub path: PathBuf,
    pub is_file: bool,
    pub is_directory: bool,
}

/// File system access used by the context engine.
///
/// Implementations do no caching or retrying; failures propagate as-is.
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn read_to_string(&self, path: &Path) -> Result<String>;
    async fn stat(&self, path: &Path) -> Result<FileStat>;
    async fn exists(&self, path: &Path) -> bool;
    async fn list(&self, dir: &Path) -> Result<Vec<DirEntry>>;
    async fn write(&self, path: &Path, contents: &str) -> Result<()>;
    async fn delete(&self, path: &Path) -> Result<()>;
    async fn create_dir_all(&self, path: &Path) -> Result<()>;
    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;
    async fn copy(&self, from: &Path, to: &Path) -> Result<()>;
}

/// [`FileStore`] backed by the local file system
#[derive(Debug, Clone, Default)]
pub struct LocalFileStore;

impl LocalFileStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn read_to_string(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path)
            .await
            .map_err(|e| ContextError::file_system(path, e))
    }

    async fn stat(&self, path: &Path) -> Result<FileStat> {
        let metadata = fs::metadata(path)
            .await
            .map_err(|e| ContextError::file_system(path, e))?;

        let modified = metadata
            .modified()
            .map_err(|e| ContextError::file_system(path, e))?;
        let modified_millis = modified
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);

        Ok(FileStat {
            size: metadata.len(),
            modified_millis,
            is_file: metadata.is_file(),
            is_directory: metadata.is_dir(),
        })
    }

    async fn exists(&self, path: &Path) -> bool {
        fs::try_exists(path).await.unwrap_or(false)
    }

    async fn list(&self, dir: &Path) -> Result<Vec<DirEntry>> {
        let mut reader = fs::read_dir(dir)
            .await
            .map_err(|e| ContextError::file_system(dir, e))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| ContextError::file_system(dir, e))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| ContextError::file_system(entry.path(), e))?;
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                path: entry.path(),
                is_file: file_type.is_file(),
                is_directory: file_type.is_dir(),
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn write(&self, path: &Path, contents: &str) -> Result<()> {
        fs::write(path, contents)
            .await
            .map_err(|e| ContextError::file_system(path, e))
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        fs::remove_file(path)
            .await
            .map_err(|e| ContextError::file_system(path, e))
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)
            .await
            .map_err(|e| ContextError::file_system(path, e))
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        fs::rename(from, to)
            .await
            .map_err(|e| ContextError::file_system(from, e))
    }

    async fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        fs::copy(from, to)
            .await
            .map(|_| ())
            .map_err(|e| ContextError::file_system(from, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_read_stat() {
        let dir = TempDir::new().unwrap();
        let store = LocalFileStore::new();
        let path = dir.path().join("a.ts");

        store.write(&path, "hello").await.unwrap();
        assert!(store.exists(&path).await);
        assert_eq!(store.read_to_string(&path).await.unwrap(), "hello");

        let stat = store.stat(&path).await.unwrap();
        assert_eq!(stat.size, 5);
        assert!(stat.is_file);
        assert!(!stat.is_directory);
        assert!(stat.modified_millis > 0);
    }

    #[tokio::test]
    async fn test_list_is_sorted() {
        let dir = TempDir::new().unwrap();
        let store = LocalFileStore::new();
        store.write(&dir.path().join("b.txt"), "").await.unwrap();
        store.write(&dir.path().join("a.txt"), "").await.unwrap();
        store.create_dir_all(&dir.path().join("sub")).await.unwrap();

        let names: Vec<_> = store
            .list(dir.path())
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "sub"]);
    }

    #[tokio::test]
    async fn test_rename_copy_delete() {
        let dir = TempDir::new().unwrap();
        let store = LocalFileStore::new();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        let c = dir.path().join("c.txt");

        store.write(&a, "x").await.unwrap();
        store.rename(&a, &b).await.unwrap();
        assert!(!store.exists(&a).await);
        store.copy(&b, &c).await.unwrap();
        assert_eq!(store.read_to_string(&c).await.unwrap(), "x");

        store.delete(&b).await.unwrap();
        assert!(!store.exists(&b).await);
        assert!(store.read_to_string(&b).await.unwrap_err().is_not_found());
    }
}
