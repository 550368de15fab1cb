//! editor-context - context assembly for AI coding requests
//!
//! Given the file a user is editing, this library picks a bounded set of
//! project files worth sending along with an AI request: the file itself, the
//! files it imports, and files that look related. Per-file and aggregate
//! limits keep the result inside a token budget, and summaries of truncated
//! files are cached on disk.

pub mod config;
pub mod context;
pub mod project;
pub mod utils;

// Re-export commonly used types
pub use config::{ContextConfig, ContextConfigUpdate};
pub use context::{
    CacheMetrics, ContextCollection, ContextFile, ContextManager, ContextRequest, FocusHint,
};
pub use project::{ProjectFile, ProjectIndex, ProjectSnapshot, ScanOptions, WorkspaceIndex};
pub use utils::errors::{ConfigError, ContextError};
pub use utils::fs::{FileStore, LocalFileStore};

/// The main result type used throughout the library
pub type Result<T> = std::result::Result<T, ContextError>;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "editor-context";
