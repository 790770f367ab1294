//! Error types for the BiRefNet nodes.

use std::path::PathBuf;

use birefnet_weights::{Backbone, WeightError};
use thiserror::Error;

/// Errors raised while loading models or removing backgrounds.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Locating, downloading or reading weights failed.
    #[error(transparent)]
    Weight(#[from] WeightError),

    /// The weight file is still absent after the download step.
    #[error("weights for '{model_name}' are missing at {}", path.display())]
    MissingWeights { model_name: String, path: PathBuf },

    /// The weight file does not fit the network built for the backbone.
    #[error("weights at {} do not fit the {backbone} network: {reason}", path.display())]
    IncompatibleWeights {
        path: PathBuf,
        backbone: Backbone,
        reason: String,
    },

    /// Input images must be `[height, width, 3]` with non-zero sides.
    #[error("expected an image of shape [H, W, 3], got {dims:?}")]
    InvalidImageShape { dims: Vec<usize> },

    #[error("image batch is empty")]
    EmptyBatch,

    /// Stacking needs every image to share one resolution.
    #[error("image {index} is {actual:?}, expected {expected:?} like the first image")]
    InconsistentBatch {
        index: usize,
        expected: [usize; 2],
        actual: [usize; 2],
    },

    /// The network returned no prediction head.
    #[error("network produced no output")]
    EmptyOutput,

    /// The network rejected its input or produced an unexpected output.
    #[error("network failure: {reason}")]
    Network { reason: String },

    /// The selected backend cannot serve the requested device.
    #[error("{backend} backend cannot run on {device}")]
    DeviceUnavailable {
        backend: &'static str,
        device: String,
    },

    #[error("unknown device '{value}' - expected AUTO or CPU")]
    UnknownDevice { value: String },
}

/// A specialized `Result` type for node operations.
pub type NodeResult<T> = Result<T, NodeError>;
