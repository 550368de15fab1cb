//! Disk-backed cache of truncation summaries keyed by file fingerprint.
//!
//! A fingerprint is a SHA-256 over `(path, mtime, size)`, so an entry stops
//! matching as soon as the file changes. Entries are mirrored in memory and
//! written one JSON file per key under the cache directory; the directory
//! listing is the source of truth at load time.
//!
//! The in-memory map and the counters sit behind one `RwLock`. File I/O is
//! never awaited while the guard is held: data is copied out, the guard is
//! dropped, and only then is the disk touched.

use crate::utils::errors::ContextError;
use crate::utils::fs::FileStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

const ENTRY_EXTENSION: &str = "json";
/// Hex length of a SHA-256 digest
const KEY_LEN: usize = 64;

/// A persisted summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub file_path: PathBuf,
    /// Milliseconds since the Unix epoch
    pub last_modified: i64,
    pub file_size: u64,
    pub summary: String,
    pub estimated_tokens: usize,
    pub created_at: DateTime<Utc>,
    pub accessed_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Age measured from creation; hits do not make an entry younger
    fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        match (now - self.created_at).to_std() {
            Ok(age) => age > max_age,
            // created in the future (clock skew): treat as fresh
            Err(_) => false,
        }
    }
}

/// Cache counters for the life of the process
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub total_entries: usize,
    /// Sum of summary lengths in bytes
    pub cache_size: usize,
    /// `hits / (hits + misses)`, 0 before any lookup
    pub hit_rate: f64,
}

/// Operating mode of the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheMode {
    /// Caching switched off; lookups are not counted
    Disabled,
    /// Directory could not be used; every lookup misses, every store is dropped
    PassThrough { directory: PathBuf },
    /// Normal operation
    Active { directory: PathBuf },
}

impl CacheMode {
    pub fn directory(&self) -> Option<&Path> {
        match self {
            CacheMode::Disabled => None,
            CacheMode::PassThrough { directory } | CacheMode::Active { directory } => {
                Some(directory)
            }
        }
    }
}

#[derive(Debug)]
struct CacheState {
    mode: CacheMode,
    max_age: Duration,
    entries: HashMap<String, CacheEntry>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl CacheState {
    fn active_dir(&self) -> Option<PathBuf> {
        match &self.mode {
            CacheMode::Active { directory } => Some(directory.clone()),
            _ => None,
        }
    }
}

enum Lookup {
    Hit(CacheEntry),
    Stale,
    Miss,
}

/// Fingerprint-keyed summary cache
pub struct FingerprintCache {
    store: Arc<dyn FileStore>,
    state: RwLock<CacheState>,
}

/// Compute the cache key for a file state
pub fn fingerprint_key(path: &Path, modified_millis: i64, size: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}:{}", path.display(), modified_millis, size).as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

impl FingerprintCache {
    /// Create a disabled cache
    pub fn new(store: Arc<dyn FileStore>) -> Self {
        Self {
            store,
            state: RwLock::new(CacheState {
                mode: CacheMode::Disabled,
                max_age: Duration::from_secs(24 * 60 * 60),
                entries: HashMap::new(),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
        }
    }

    pub async fn mode(&self) -> CacheMode {
        self.state.read().await.mode.clone()
    }

    /// Bind the cache to `directory` and load the persisted entries.
    ///
    /// Entries that fail to parse or are already stale are deleted. If the
    /// directory cannot be created the cache runs in pass-through mode.
    pub async fn enable(&self, directory: PathBuf, max_age: Duration) -> CacheMode {
        let mode = match self.prepare_directory(&directory).await {
            Ok(()) => CacheMode::Active {
                directory: directory.clone(),
            },
            Err(e) => {
                tracing::warn!("Caching degraded to pass-through: {}", e);
                CacheMode::PassThrough {
                    directory: directory.clone(),
                }
            }
        };

        let (entries, evicted) = match mode {
            CacheMode::Active { .. } => self.load_entries(&directory, max_age).await,
            _ => (HashMap::new(), 0),
        };

        tracing::info!(
            "Summary cache enabled at {} ({} entries, {} expired on load)",
            directory.display(),
            entries.len(),
            evicted
        );

        let mut state = self.state.write().await;
        state.mode = mode.clone();
        state.max_age = max_age;
        state.entries = entries;
        state.evictions += evicted;
        mode
    }

    /// Stop caching and drop the in-memory map; files on disk are kept
    pub async fn disable(&self) {
        let mut state = self.state.write().await;
        state.mode = CacheMode::Disabled;
        state.entries.clear();
        tracing::debug!("Summary cache disabled");
    }

    /// Look up the summary for the file's current fingerprint
    pub async fn get(&self, file_path: &Path) -> Option<String> {
        let directory = {
            let mut state = self.state.write().await;
            match state.mode.clone() {
                CacheMode::Disabled => return None,
                CacheMode::PassThrough { .. } => {
                    state.misses += 1;
                    return None;
                }
                CacheMode::Active { directory } => directory,
            }
        };

        let key = match self.store.stat(file_path).await {
            Ok(stat) => fingerprint_key(file_path, stat.modified_millis, stat.size),
            Err(e) => {
                tracing::debug!("Cache lookup could not stat {}: {}", file_path.display(), e);
                self.state.write().await.misses += 1;
                return None;
            }
        };

        let lookup = {
            let mut state = self.state.write().await;
            let now = Utc::now();
            let max_age = state.max_age;
            let fresh = state.entries.get(&key).map(|e| !e.is_stale(now, max_age));
            match fresh {
                None => {
                    state.misses += 1;
                    Lookup::Miss
                }
                Some(false) => {
                    state.entries.remove(&key);
                    state.misses += 1;
                    state.evictions += 1;
                    Lookup::Stale
                }
                Some(true) => {
                    state.hits += 1;
                    match state.entries.get_mut(&key) {
                        Some(entry) => {
                            entry.accessed_at = now;
                            Lookup::Hit(entry.clone())
                        }
                        None => Lookup::Miss,
                    }
                }
            }
        };

        match lookup {
            Lookup::Hit(entry) => {
                if let Err(e) = self.persist(&directory, &entry).await {
                    tracing::warn!("Failed to update cache entry {}: {}", entry.key, e);
                }
                Some(entry.summary)
            }
            Lookup::Stale => {
                self.remove_file(&directory, &key).await;
                None
            }
            Lookup::Miss => None,
        }
    }

    /// Store a summary under the file's current fingerprint
    pub async fn put(&self, file_path: &Path, summary: &str, estimated_tokens: usize) {
        let Some(directory) = self.state.read().await.active_dir() else {
            return;
        };

        let stat = match self.store.stat(file_path).await {
            Ok(stat) => stat,
            Err(e) => {
                tracing::debug!("Not caching {}: {}", file_path.display(), e);
                return;
            }
        };

        let now = Utc::now();
        let entry = CacheEntry {
            key: fingerprint_key(file_path, stat.modified_millis, stat.size),
            file_path: file_path.to_path_buf(),
            last_modified: stat.modified_millis,
            file_size: stat.size,
            summary: summary.to_string(),
            estimated_tokens,
            created_at: now,
            accessed_at: now,
        };

        {
            let mut state = self.state.write().await;
            if state.active_dir().as_deref() != Some(directory.as_path()) {
                return;
            }
            state.entries.insert(entry.key.clone(), entry.clone());
        }

        if let Err(e) = self.persist(&directory, &entry).await {
            tracing::warn!("Failed to persist cache entry for {}: {}", file_path.display(), e);
        }
    }

    /// Remove every entry recorded for `file_path`; returns how many
    pub async fn invalidate(&self, file_path: &Path) -> usize {
        let (directory, keys) = {
            let mut state = self.state.write().await;
            let keys: Vec<String> = state
                .entries
                .iter()
                .filter(|(_, entry)| entry.file_path == file_path)
                .map(|(key, _)| key.clone())
                .collect();
            for key in &keys {
                state.entries.remove(key);
            }
            (state.active_dir(), keys)
        };

        if let Some(directory) = directory {
            for key in &keys {
                self.remove_file(&directory, key).await;
            }
        }

        tracing::debug!("Invalidated {} cache entries for {}", keys.len(), file_path.display());
        keys.len()
    }

    /// Remove all entries in memory and on disk and reset the metrics
    pub async fn clear_all(&self) {
        let directory = {
            let mut state = self.state.write().await;
            state.entries.clear();
            state.hits = 0;
            state.misses = 0;
            state.evictions = 0;
            state.active_dir()
        };

        let Some(directory) = directory else {
            return;
        };

        match self.store.list(&directory).await {
            Ok(listing) => {
                for entry in listing.iter().filter(|e| e.is_file && is_entry_file(&e.path)) {
                    if let Err(e) = self.store.delete(&entry.path).await {
                        tracing::warn!("Failed to delete {}: {}", entry.path.display(), e);
                    }
                }
            }
            Err(e) => tracing::warn!("Failed to list cache directory: {}", e),
        }

        tracing::info!("Summary cache cleared");
    }

    /// Evict every stale entry; returns how many were removed
    pub async fn sweep(&self) -> usize {
        let (directory, stale) = {
            let mut state = self.state.write().await;
            let now = Utc::now();
            let max_age = state.max_age;
            let stale: Vec<String> = state
                .entries
                .iter()
                .filter(|(_, entry)| entry.is_stale(now, max_age))
                .map(|(key, _)| key.clone())
                .collect();
            for key in &stale {
                state.entries.remove(key);
            }
            state.evictions += stale.len() as u64;
            (state.active_dir(), stale)
        };

        if let Some(directory) = directory {
            for key in &stale {
                self.remove_file(&directory, key).await;
            }
        }

        if !stale.is_empty() {
            tracing::info!("Cache sweep evicted {} entries", stale.len());
        }
        stale.len()
    }

    /// Snapshot of the counters
    pub async fn metrics(&self) -> CacheMetrics {
        let state = self.state.read().await;
        let lookups = state.hits + state.misses;
        CacheMetrics {
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
            total_entries: state.entries.len(),
            cache_size: state.entries.values().map(|e| e.summary.len()).sum(),
            hit_rate: if lookups == 0 {
                0.0
            } else {
                state.hits as f64 / lookups as f64
            },
        }
    }

    /// Run [`FingerprintCache::sweep`] every `interval` until the handle is stopped or dropped
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> SweepHandle {
        let cache: Weak<Self> = Arc::downgrade(self);
        let token = CancellationToken::new();
        let cancelled = token.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(cache) = cache.upgrade() else { break };
                        cache.sweep().await;
                    }
                }
            }
            tracing::debug!("Cache sweeper stopped");
        });

        SweepHandle {
            token,
            task: Some(task),
        }
    }

    async fn prepare_directory(&self, directory: &Path) -> crate::Result<()> {
        if let Ok(stat) = self.store.stat(directory).await {
            if !stat.is_directory {
                return Err(ContextError::cache_unavailable(directory, "path exists and is not a directory"));
            }
            return Ok(());
        }
        self.store
            .create_dir_all(directory)
            .await
            .map_err(|e| ContextError::cache_unavailable(directory, e.to_string()))
    }

    async fn load_entries(&self, directory: &Path, max_age: Duration) -> (HashMap<String, CacheEntry>, u64) {
        let mut entries = HashMap::new();
        let mut evicted = 0;

        let listing = match self.store.list(directory).await {
            Ok(listing) => listing,
            Err(e) => {
                tracing::warn!("Failed to list cache directory: {}", e);
                return (entries, evicted);
            }
        };

        let now = Utc::now();
        for file in listing.into_iter().filter(|e| e.is_file && is_entry_file(&e.path)) {
            match self.read_entry(&file.path).await {
                Ok(entry) if entry.is_stale(now, max_age) => {
                    evicted += 1;
                    self.delete_quietly(&file.path).await;
                }
                Ok(entry) => {
                    entries.insert(entry.key.clone(), entry);
                }
                Err(e) => {
                    tracing::warn!("Dropping cache entry: {}", e);
                    self.delete_quietly(&file.path).await;
                }
            }
        }

        (entries, evicted)
    }

    async fn read_entry(&self, path: &Path) -> crate::Result<CacheEntry> {
        let content = self.store.read_to_string(path).await?;
        let entry: CacheEntry = serde_json::from_str(&content)
            .map_err(|e| ContextError::cache_corruption(path, e.to_string()))?;

        let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned());
        if stem.as_deref() != Some(entry.key.as_str()) {
            return Err(ContextError::cache_corruption(path, "key does not match file name"));
        }
        Ok(entry)
    }

    async fn persist(&self, directory: &Path, entry: &CacheEntry) -> crate::Result<()> {
        let json = serde_json::to_string_pretty(entry)?;
        self.store.write(&entry_path(directory, &entry.key), &json).await
    }

    async fn remove_file(&self, directory: &Path, key: &str) {
        self.delete_quietly(&entry_path(directory, key)).await;
    }

    async fn delete_quietly(&self, path: &Path) {
        if let Err(e) = self.store.delete(path).await {
            if !e.is_not_found() {
                tracing::warn!("Failed to delete cache file {}: {}", path.display(), e);
            }
        }
    }
}

fn entry_path(directory: &Path, key: &str) -> PathBuf {
    directory.join(format!("{}.{}", key, ENTRY_EXTENSION))
}

/// `<64 lowercase hex>.json`; anything else in the directory is left alone
fn is_entry_file(path: &Path) -> bool {
    if path.extension().map_or(true, |ext| ext != ENTRY_EXTENSION) {
        return false;
    }
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map_or(false, |stem| {
            stem.len() == KEY_LEN && stem.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        })
}

/// Handle to a running sweep task; dropping it stops the task
pub struct SweepHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SweepHandle {
    /// Stop the sweeper and wait for it to exit
    pub async fn stop(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
