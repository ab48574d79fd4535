//! Error types at the library seams.
//!
//! Per-cell parse problems are never errors; they are absorbed by the loader.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid region parameters in {path}: {source}")]
    Regions {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cache file {0} is not a delivery cache")]
    BadMagic(String),

    #[error("cache version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("cache payload error: {0}")]
    Codec(#[from] bincode::Error),
}

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("source {0} is missing or unreadable")]
    SourceUnavailable(String),

    #[error("source {0} has no delivery rows")]
    EmptySource(String),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("refresh task aborted: {0}")]
    Aborted(String),
}

/// Returned by the indicator engine instead of an all-zero indicator set.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum EngineError {
    #[error("no data for the selected filters")]
    NoData,
}
