//! Error types used throughout the context engine

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the context engine
#[derive(Error, Debug)]
pub enum ContextError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("No project loaded")]
    NoProjectLoaded,

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Failed to read file: {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File system error: {path}: {source}")]
    FileSystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt cache entry {path}: {message}")]
    CacheCorruption { path: PathBuf, message: String },

    #[error("Cache directory unavailable: {path}: {message}")]
    CacheUnavailable { path: PathBuf, message: String },

    #[error("Cancelled: {operation}")]
    Cancelled { operation: String },

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Failed to read configuration: {source}")]
    ReadError {
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {source}")]
    ParseError {
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize configuration: {source}")]
    SerializeError {
        #[source]
        source: toml::ser::Error,
    },
}

impl ContextError {
    /// Create a new file not found error
    pub fn file_not_found<P: Into<PathBuf>>(path: P) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Create a new file read error
    pub fn file_read<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Create a new file system error
    pub fn file_system<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Self {
        Self::FileSystem {
            path: path.into(),
            source,
        }
    }

    /// Create a new cache corruption error
    pub fn cache_corruption<P: Into<PathBuf>, S: Into<String>>(path: P, message: S) -> Self {
        Self::CacheCorruption {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new cache unavailable error
    pub fn cache_unavailable<P: Into<PathBuf>, S: Into<String>>(path: P, message: S) -> Self {
        Self::CacheUnavailable {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new cancelled error
    pub fn cancelled<S: Into<String>>(operation: S) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S1: Into<String>, S2: Into<String>>(key: S1, value: S2) -> Self {
        Self::Config(ConfigError::InvalidValue {
            key: key.into(),
            value: value.into(),
        })
    }

    /// Whether the error means the file does not exist (as opposed to being unreadable)
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::FileNotFound { .. } => true,
            Self::FileRead { source, .. } | Self::FileSystem { source, .. } => {
                source.kind() == std::io::ErrorKind::NotFound
            }
            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::NoProjectLoaded => "project",
            Self::FileNotFound { .. } => "notfound",
            Self::FileRead { .. } => "read",
            Self::FileSystem { .. } => "filesystem",
            Self::CacheCorruption { .. } => "cache_corruption",
            Self::CacheUnavailable { .. } => "cache_unavailable",
            Self::Cancelled { .. } => "cancelled",
            Self::Json(_) => "json",
            Self::Regex(_) => "regex",
        }
    }
}
