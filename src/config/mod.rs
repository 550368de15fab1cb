//! Configuration for context assembly

use crate::context::exclusion::ExclusionFilter;
use crate::utils::errors::{ConfigError, ContextError};
use crate::utils::path::normalize_path;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

/// Context assembly configuration.
///
/// A snapshot is immutable for the length of one assembly run; the manager
/// swaps in a new snapshot on [`crate::ContextManager::update_config`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Maximum number of files in a collection
    pub max_files: usize,
    /// Maximum lines retained per file
    pub max_lines_per_file: usize,
    /// Aggregate token budget
    pub max_total_tokens: usize,
    /// Whether to follow the current file's imports
    pub include_imports: bool,
    /// Glob patterns for paths that are never included
    pub exclude_patterns: Vec<String>,
    /// Whether truncation summaries are cached on disk
    pub enable_caching: bool,
    /// Cache directory, relative to the project root
    pub cache_directory: PathBuf,
    /// Entries older than this are evicted
    #[serde(rename = "cache_max_age_secs", with = "duration_secs")]
    pub cache_max_age: Duration,
    /// How often the background sweep runs
    #[serde(rename = "cache_cleanup_interval_secs", with = "duration_secs")]
    pub cache_cleanup_interval: Duration,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_files: 5,
            max_lines_per_file: 200,
            max_total_tokens: 8000,
            include_imports: true,
            exclude_patterns: default_exclude_patterns(),
            enable_caching: true,
            cache_directory: PathBuf::from(".context-cache"),
            cache_max_age: Duration::from_secs(24 * 60 * 60),
            cache_cleanup_interval: Duration::from_secs(60 * 60),
        }
    }
}

/// Default exclusion set: build output, VCS metadata, logs, minified and
/// bundled assets, source maps and lockfiles
pub fn default_exclude_patterns() -> Vec<String> {
    [
        "node_modules",
        ".git",
        ".svn",
        ".hg",
        "dist",
        "build",
        "out",
        "target",
        "coverage",
        "__pycache__",
        ".next",
        "*.log",
        "*.min.js",
        "*.min.css",
        "*.bundle.js",
        "*.map",
        "*.pyc",
        "package-lock.json",
        "yarn.lock",
        "pnpm-lock.yaml",
        "Cargo.lock",
        "poetry.lock",
        ".DS_Store",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Partial configuration update; `None` fields keep their current value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextConfigUpdate {
    pub max_files: Option<usize>,
    pub max_lines_per_file: Option<usize>,
    pub max_total_tokens: Option<usize>,
    pub include_imports: Option<bool>,
    pub exclude_patterns: Option<Vec<String>>,
    pub enable_caching: Option<bool>,
    pub cache_directory: Option<PathBuf>,
    #[serde(default, with = "optional_duration_secs")]
    pub cache_max_age: Option<Duration>,
    #[serde(default, with = "optional_duration_secs")]
    pub cache_cleanup_interval: Option<Duration>,
}

impl ContextConfig {
    /// Default configuration file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("editor-context").join("config.toml"))
    }

    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }
            .into());
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadError { source: e })?;
        let config: ContextConfig =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError { source: e })?;
        config.validate()?;

        tracing::debug!("Loaded context configuration from {}", path.display());
        Ok(config)
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError { source: e }.into())
    }

    /// Produce a validated copy with `update` applied
    pub fn apply(&self, update: &ContextConfigUpdate) -> Result<Self> {
        let mut next = self.clone();

        if let Some(v) = update.max_files {
            next.max_files = v;
        }
        if let Some(v) = update.max_lines_per_file {
            next.max_lines_per_file = v;
        }
        if let Some(v) = update.max_total_tokens {
            next.max_total_tokens = v;
        }
        if let Some(v) = update.include_imports {
            next.include_imports = v;
        }
        if let Some(v) = &update.exclude_patterns {
            next.exclude_patterns = v.clone();
        }
        if let Some(v) = update.enable_caching {
            next.enable_caching = v;
        }
        if let Some(v) = &update.cache_directory {
            next.cache_directory = v.clone();
        }
        if let Some(v) = update.cache_max_age {
            next.cache_max_age = v;
        }
        if let Some(v) = update.cache_cleanup_interval {
            next.cache_cleanup_interval = v;
        }

        next.validate()?;
        Ok(next)
    }

    /// Check the configuration for values the engine cannot run with.
    ///
    /// Zero file, line and token limits are valid and select nothing.
    pub fn validate(&self) -> Result<()> {
        let dir = &self.cache_directory;
        // "." and "./" would put the cache in the project root
        if normalize_path(dir).as_os_str().is_empty() {
            return Err(ContextError::invalid_config("cache_directory", "(empty)"));
        }
        let escapes = dir
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(ContextError::invalid_config(
                "cache_directory",
                dir.display().to_string(),
            ));
        }

        if self.cache_max_age.is_zero() {
            return Err(ContextError::invalid_config("cache_max_age", "0s"));
        }
        if self.cache_cleanup_interval.is_zero() {
            return Err(ContextError::invalid_config("cache_cleanup_interval", "0s"));
        }

        ExclusionFilter::new(&self.exclude_patterns).map_err(|e| {
            ContextError::invalid_config("exclude_patterns", e.to_string())
        })?;

        Ok(())
    }

    /// Aggregate line ceiling across a whole collection
    pub fn max_total_lines(&self) -> usize {
        self.max_lines_per_file.saturating_mul(self.max_files)
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

mod optional_duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_secs))
    }
}
