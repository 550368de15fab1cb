//! Context assembly: choosing, truncating and summarizing the files sent
//! along with an AI request

use serde::{Deserialize, Serialize};

pub mod cache;
pub mod exclusion;
pub mod imports;
pub mod loader;
pub mod manager;
pub mod relevance;

pub use cache::{CacheEntry, CacheMetrics, CacheMode, FingerprintCache};
pub use exclusion::ExclusionFilter;
pub use imports::{ImportResolver, ResolvedImport};
pub use loader::FileLoader;
pub use manager::{ContextManager, ContextRequest};
pub use relevance::{RelevanceScorer, RelevanceWeights};

/// A file included in a context collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextFile {
    /// Project-relative, forward-slash path
    pub path: String,
    pub name: String,
    pub extension: String,
    /// File content, possibly truncated
    pub content: String,
    /// Line count after truncation
    pub lines: usize,
    pub estimated_tokens: usize,
    pub relevance_score: f64,
    pub truncated: bool,
    /// Present exactly when `truncated` is set
    pub summary: Option<String>,
}

/// Where the user is looking in the current file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusHint {
    pub selected_text: Option<String>,
    /// 1-based cursor line
    pub cursor_line: Option<usize>,
}

impl FocusHint {
    pub fn is_empty(&self) -> bool {
        self.selected_text.as_deref().map_or(true, str::is_empty) && self.cursor_line.is_none()
    }
}

/// The result of one assembly run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextCollection {
    /// Current file first, then imports in source order, then related files
    pub files: Vec<ContextFile>,
    pub total_lines: usize,
    pub estimated_tokens: usize,
    /// Human-readable description of the collection
    pub summary: String,
    /// Whether a limit forced content to be cut or files to be left out
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus: Option<FocusHint>,
}

impl ContextCollection {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Paths of the included files, in order
    pub fn paths(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.path.as_str()).collect()
    }
}
