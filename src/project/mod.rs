//! Project index: the file metadata of the currently open project

use crate::utils::errors::ContextError;
use crate::utils::path::{extension, file_name, normalize_path, relative_to};
use crate::Result;
use async_trait::async_trait;
use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, UNIX_EPOCH};
use tokio::sync::RwLock;

/// Metadata for one project file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectFile {
    /// Absolute path
    pub path: PathBuf,
    pub name: String,
    /// Extension without the dot
    pub extension: String,
    pub size: u64,
    /// Milliseconds since the Unix epoch
    pub last_modified: i64,
}

/// An immutable view of a loaded project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSnapshot {
    pub root_path: PathBuf,
    pub files: Vec<ProjectFile>,
}

impl ProjectSnapshot {
    pub fn new(root_path: PathBuf, mut files: Vec<ProjectFile>) -> Self {
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Self {
            root_path: normalize_path(root_path),
            files,
        }
    }

    /// Project-relative path of a file in this project
    pub fn relative_path(&self, path: &Path) -> Option<String> {
        relative_to(path, &self.root_path)
    }
}

/// Source of the current project
#[async_trait]
pub trait ProjectIndex: Send + Sync {
    /// The current project, or `None` if nothing is loaded
    async fn current_project(&self) -> Option<Arc<ProjectSnapshot>>;
}

/// Options for scanning a workspace
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Whether to respect .gitignore files
    pub respect_gitignore: bool,
    /// Additional ignore file name honoured in every directory
    pub custom_ignore_filename: Option<String>,
    /// Maximum depth to traverse
    pub max_depth: Option<usize>,
    /// Whether to follow symbolic links
    pub follow_symlinks: bool,
    /// Directory names skipped outright, relative to the root
    pub skip_dirs: Vec<PathBuf>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            respect_gitignore: true,
            custom_ignore_filename: Some(".aiignore".to_string()),
            max_depth: Some(20),
            follow_symlinks: false,
            skip_dirs: Vec::new(),
        }
    }
}

/// [`ProjectIndex`] that scans a directory tree on [`WorkspaceIndex::load`]
#[derive(Default)]
pub struct WorkspaceIndex {
    current: RwLock<Option<Arc<ProjectSnapshot>>>,
    options: ScanOptions,
}

impl WorkspaceIndex {
    pub fn new(options: ScanOptions) -> Self {
        Self {
            current: RwLock::new(None),
            options,
        }
    }

    /// An index pre-seeded with a snapshot
    pub fn with_snapshot(snapshot: ProjectSnapshot) -> Self {
        Self {
            current: RwLock::new(Some(Arc::new(snapshot))),
            options: ScanOptions::default(),
        }
    }

    /// Scan `root` and make it the current project
    pub async fn load<P: AsRef<Path>>(&self, root: P) -> Result<Arc<ProjectSnapshot>> {
        let root = root.as_ref();
        let snapshot = Arc::new(scan_workspace(root, &self.options)?);
        *self.current.write().await = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    /// Replace the current project
    pub async fn set_snapshot(&self, snapshot: ProjectSnapshot) {
        *self.current.write().await = Some(Arc::new(snapshot));
    }

    /// Close the current project
    pub async fn unload(&self) {
        *self.current.write().await = None;
    }
}

#[async_trait]
impl ProjectIndex for WorkspaceIndex {
    async fn current_project(&self) -> Option<Arc<ProjectSnapshot>> {
        self.current.read().await.clone()
    }
}

/// Walk `root` and collect file metadata
pub fn scan_workspace(root: &Path, options: &ScanOptions) -> Result<ProjectSnapshot> {
    let root = root
        .canonicalize()
        .map_err(|e| ContextError::file_system(root, e))?;
    if !root.is_dir() {
        return Err(ContextError::file_system(
            &root,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "project root must be a directory"),
        ));
    }

    let started = Instant::now();
    let mut builder = WalkBuilder::new(&root);
    builder
        .git_ignore(options.respect_gitignore)
        .git_exclude(options.respect_gitignore)
        .require_git(false)
        .hidden(false)
        .follow_links(options.follow_symlinks)
        .max_depth(options.max_depth);
    if let Some(name) = &options.custom_ignore_filename {
        builder.add_custom_ignore_filename(name);
    }

    let skip_dirs: Vec<PathBuf> = options.skip_dirs.iter().map(|d| root.join(d)).collect();
    builder.filter_entry(move |entry| {
        let path = entry.path();
        path.file_name().map_or(true, |name| name != ".git")
            && !skip_dirs.iter().any(|dir| path.starts_with(dir))
    });

    let mut files = Vec::new();
    for result in builder.build() {
        let entry = match result {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!("Failed to process file entry: {}", err);
                continue;
            }
        };

        if !entry.file_type().map_or(false, |ft| ft.is_file()) {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(err) => {
                tracing::warn!("Failed to stat {}: {}", entry.path().display(), err);
                continue;
            }
        };

        let last_modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);

        let path = entry.path().to_path_buf();
        files.push(ProjectFile {
            name: file_name(&path),
            extension: extension(&path),
            size: metadata.len(),
            last_modified,
            path,
        });
    }

    tracing::info!(
        "Discovered {} files in {} ({}ms)",
        files.len(),
        root.display(),
        started.elapsed().as_millis()
    );

    Ok(ProjectSnapshot::new(root, files))
}
