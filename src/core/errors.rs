//! ISH-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, IshError>;

/// Top-level error type for the identity scenario harness.
#[derive(Debug, Error)]
pub enum IshError {
    #[error("[ISH-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[ISH-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[ISH-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[ISH-2001] malformed scenario {path}: {details}")]
    MalformedScenario { path: PathBuf, details: String },

    #[error("[ISH-2002] scenario directory not found: {path}")]
    MissingScenarioDir { path: PathBuf },

    #[error("[ISH-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[ISH-2102] SQL failure in {context}: {details}")]
    Sql {
        context: &'static str,
        details: String,
    },

    #[error("[ISH-3001] transport failure during {operation}: {details}")]
    Transport {
        operation: &'static str,
        details: String,
    },

    #[error("[ISH-3002] system under test rejected {operation}: {details}")]
    Rejected {
        operation: &'static str,
        details: String,
    },

    #[error("[ISH-3101] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[ISH-3102] channel closed in component {component}")]
    ChannelClosed { component: &'static str },

    #[error("[ISH-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl IshError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "ISH-1001",
            Self::MissingConfig { .. } => "ISH-1002",
            Self::ConfigParse { .. } => "ISH-1003",
            Self::MalformedScenario { .. } => "ISH-2001",
            Self::MissingScenarioDir { .. } => "ISH-2002",
            Self::Serialization { .. } => "ISH-2101",
            Self::Sql { .. } => "ISH-2102",
            Self::Transport { .. } => "ISH-3001",
            Self::Rejected { .. } => "ISH-3002",
            Self::Io { .. } => "ISH-3101",
            Self::ChannelClosed { .. } => "ISH-3102",
            Self::Runtime { .. } => "ISH-3900",
        }
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Convenience constructor for malformed scenario files.
    #[must_use]
    pub fn malformed(path: impl AsRef<Path>, details: impl Into<String>) -> Self {
        Self::MalformedScenario {
            path: path.as_ref().to_path_buf(),
            details: details.into(),
        }
    }

    /// Convenience constructor for SUT transport failures.
    #[must_use]
    pub fn transport(operation: &'static str, details: impl Into<String>) -> Self {
        Self::Transport {
            operation,
            details: details.into(),
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for IshError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sql {
            context: "rusqlite",
            details: value.to_string(),
        }
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for IshError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport {
            operation: "http",
            details: value.to_string(),
        }
    }
}

impl From<serde_json::Error> for IshError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for IshError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
