//! Error types for weight acquisition and record loading.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while locating, downloading or reading weight files.
#[derive(Debug, Error)]
pub enum WeightError {
    /// The logical model name is not part of the catalog.
    #[error("unknown model '{model_name}' - available models: {available_models}")]
    UnknownModel {
        model_name: String,
        available_models: String,
    },

    /// The registry has no folder registered under the given key.
    #[error("no model folder registered under '{key}'")]
    UnknownFolderKey { key: String },

    /// A weight file name tried to escape the registered folders.
    #[error("invalid weight file name '{file_name}'")]
    InvalidFileName { file_name: String },

    /// The requested file is not present in any registered folder.
    #[error("weight file '{file_name}' not found in folders registered under '{key}'")]
    WeightNotFound { key: String, file_name: String },

    /// Creating a models directory failed.
    #[error("failed to create directory {}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Any other file system failure.
    #[error("file system error at {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The HTTP request or body transfer failed.
    #[error("failed to download {url}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The file extension does not name a supported weight format.
    #[error("unsupported weight file format: {}", path.display())]
    UnsupportedFormat { path: PathBuf },

    /// The recorder could not map the file onto the module record.
    #[error("failed to load {format} record from {}: {reason}", path.display())]
    RecordLoad {
        format: &'static str,
        path: PathBuf,
        reason: String,
    },

    /// A key remap or ignore pattern is not a valid regex.
    #[error("invalid tensor name pattern '{pattern}'")]
    InvalidKeyPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// The parameters of a module could not be enumerated.
    #[error("failed to inspect module parameters: {reason}")]
    ParameterLayout { reason: String },
}

/// A specialized `Result` type for weight operations.
pub type WeightResult<T> = Result<T, WeightError>;
