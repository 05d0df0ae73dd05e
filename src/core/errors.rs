//! GL-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, GlError>;

/// Top-level error type for the gallery sync scan engine.
#[derive(Debug, Error)]
pub enum GlError {
    #[error("[GL-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[GL-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[GL-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[GL-2001] source path missing: {path}")]
    SourceMissing { path: PathBuf },

    #[error("[GL-2002] duplicates root unavailable: {path}")]
    DuplicatesRootUnavailable { path: PathBuf },

    #[error("[GL-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[GL-2102] record store failure in {context}: {details}")]
    Store {
        context: &'static str,
        details: String,
    },

    #[error("[GL-2201] archive write failure at {path}: {details}")]
    ArchiveWrite { path: PathBuf, details: String },

    #[error("[GL-3001] permission denied for {path}")]
    PermissionDenied { path: PathBuf },

    #[error("[GL-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[GL-3003] channel closed in component {component}")]
    ChannelClosed { component: &'static str },

    #[error("[GL-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl GlError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "GL-1001",
            Self::MissingConfig { .. } => "GL-1002",
            Self::ConfigParse { .. } => "GL-1003",
            Self::SourceMissing { .. } => "GL-2001",
            Self::DuplicatesRootUnavailable { .. } => "GL-2002",
            Self::Serialization { .. } => "GL-2101",
            Self::Store { .. } => "GL-2102",
            Self::ArchiveWrite { .. } => "GL-2201",
            Self::PermissionDenied { .. } => "GL-3001",
            Self::Io { .. } => "GL-3002",
            Self::ChannelClosed { .. } => "GL-3003",
            Self::Runtime { .. } => "GL-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::ChannelClosed { .. } | Self::Store { .. } | Self::Runtime { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for GlError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Store {
            context: "rusqlite",
            details: value.to_string(),
        }
    }
}

impl From<serde_json::Error> for GlError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for GlError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
