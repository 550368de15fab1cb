//! Loads files into [`ContextFile`]s, applying the per-file line limit

use super::cache::FingerprintCache;
use super::exclusion::ExclusionFilter;
use super::ContextFile;
use crate::utils::errors::ContextError;
use crate::utils::fs::FileStore;
use crate::utils::path::{extension, file_name, relative_to};
use crate::utils::text::{estimate_tokens, summarize_lines, truncate_lines};
use crate::Result;
use std::path::Path;
use std::sync::Arc;

/// Reads and truncates files for one assembly run
pub struct FileLoader {
    store: Arc<dyn FileStore>,
    cache: Arc<FingerprintCache>,
    filter: Arc<ExclusionFilter>,
    max_lines_per_file: usize,
}

impl FileLoader {
    pub fn new(
        store: Arc<dyn FileStore>,
        cache: Arc<FingerprintCache>,
        filter: Arc<ExclusionFilter>,
        max_lines_per_file: usize,
    ) -> Self {
        Self {
            store,
            cache,
            filter,
            max_lines_per_file,
        }
    }

    /// Load `absolute_path` as a context file.
    ///
    /// Returns `Ok(None)` when the path is excluded, outside `root`, or does
    /// not exist. Any other read failure is a `FileRead` error.
    pub async fn load(&self, absolute_path: &Path, root: &Path) -> Result<Option<ContextFile>> {
        let Some(relative) = relative_to(absolute_path, root) else {
            tracing::debug!("Skipping {}: outside project root", absolute_path.display());
            return Ok(None);
        };

        if let Some(pattern) = self.filter.matching_pattern(&relative) {
            tracing::debug!("Skipping file matching pattern '{}': {}", pattern, relative);
            return Ok(None);
        }

        let text = match self.store.read_to_string(absolute_path).await {
            Ok(text) => text,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(ContextError::FileSystem { path, source }) => {
                return Err(ContextError::file_read(path, source))
            }
            Err(e) => return Err(e),
        };

        let name = file_name(absolute_path);
        let cut = truncate_lines(&text, self.max_lines_per_file);
        let estimated_tokens = estimate_tokens(&cut.content);

        let summary = if cut.truncated {
            Some(self.summary_for(absolute_path, &name, &text, estimated_tokens).await)
        } else {
            None
        };

        Ok(Some(ContextFile {
            path: relative,
            extension: extension(absolute_path),
            name,
            content: cut.content,
            lines: cut.lines,
            estimated_tokens,
            relevance_score: 0.0,
            truncated: cut.truncated,
            summary,
        }))
    }

    async fn summary_for(&self, path: &Path, name: &str, original: &str, tokens: usize) -> String {
        if let Some(summary) = self.cache.get(path).await {
            tracing::debug!("Summary cache hit for {}", path.display());
            return summary;
        }

        let summary = summarize_lines(name, original);
        self.cache.put(path, &summary, tokens).await;
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_exclude_patterns;
    use crate::utils::fs::LocalFileStore;
    use crate::utils::text::TRUNCATION_MARKER;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn loader(root: &Path, max_lines: usize) -> (FileLoader, Arc<FingerprintCache>) {
        let store: Arc<dyn FileStore> = Arc::new(LocalFileStore::new());
        let cache = Arc::new(FingerprintCache::new(Arc::clone(&store)));
        cache
            .enable(root.join(".context-cache"), Duration::from_secs(3600))
            .await;
        let filter = Arc::new(ExclusionFilter::new(&default_exclude_patterns()).unwrap());
        (FileLoader::new(store, Arc::clone(&cache), filter, max_lines), cache)
    }

    #[tokio::test]
    async fn test_load_small_file() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/a.ts"), "let a = 1;\nlet b = 2;\n").unwrap();

        let (loader, _) = loader(dir.path(), 200).await;
        let file = loader
            .load(&dir.path().join("src/a.ts"), dir.path())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(file.path, "src/a.ts");
        assert_eq!(file.name, "a.ts");
        assert_eq!(file.extension, "ts");
        assert_eq!(file.lines, 2);
        assert!(!file.truncated);
        assert!(file.summary.is_none());
        assert_eq!(file.estimated_tokens, estimate_tokens(&file.content));
    }

    #[tokio::test]
    async fn test_truncated_file_gets_cached_summary() {
        let dir = TempDir::new().unwrap();
        let body = vec!["a".repeat(100); 1000].join("\n");
        std::fs::write(dir.path().join("x.ts"), &body).unwrap();

        let (loader, cache) = loader(dir.path(), 10).await;
        let path = dir.path().join("x.ts");
        let first = loader.load(&path, dir.path()).await.unwrap().unwrap();

        assert_eq!(first.lines, 10);
        assert!(first.truncated);
        assert!(first.content.ends_with(TRUNCATION_MARKER));
        assert!(first.summary.as_deref().unwrap().starts_with("x.ts (1000 lines)"));
        assert_eq!(cache.get(&path).await, first.summary);

        let second = loader.load(&path, dir.path()).await.unwrap().unwrap();
        assert_eq!(second.summary, first.summary);
        assert_eq!(cache.metrics().await.hits, 2);
    }

    #[tokio::test]
    async fn test_missing_and_excluded_are_skipped() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules")).unwrap();
        std::fs::write(dir.path().join("node_modules/x.js"), "x").unwrap();
        std::fs::write(dir.path().join("app.min.js"), "x").unwrap();

        let (loader, _) = loader(dir.path(), 200).await;
        for name in ["missing.ts", "node_modules/x.js", "app.min.js"] {
            let result = loader.load(&dir.path().join(name), dir.path()).await.unwrap();
            assert!(result.is_none(), "{} should be skipped", name);
        }
    }

    #[tokio::test]
    async fn test_unreadable_path_is_read_error() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("folder.ts")).unwrap();

        let (loader, _) = loader(dir.path(), 200).await;
        let err = loader
            .load(&dir.path().join("folder.ts"), dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, ContextError::FileRead { .. }));
    }
}
