//! Error types for the registry.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading or saving registry stores.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// A store file exists but could not be read.
    #[error("Failed to read registry store {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A store file could not be written, renamed or removed.
    #[error("Failed to write registry store {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A store file is not a JSON object of entries.
    #[error("Registry store {path} is not valid: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}
