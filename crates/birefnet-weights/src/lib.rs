//! # BiRefNet Weights
//!
//! Everything between a model name and a module record:
//!
//! - [`registry`]: searchable model folders keyed by name, owned by the host.
//! - [`catalog`]: pretrained model names, their repositories and backbones.
//! - [`store`]: the BiRefNet folder inside the registry.
//! - [`fetch`]: download of missing checkpoints.
//! - [`format`]: weight file formats and record loading.
//! - [`layout`]: tensor names and shapes of modules and weight files.

pub mod catalog;
pub mod error;
pub mod fetch;
pub mod format;
pub mod layout;
pub mod registry;
pub mod store;

pub use catalog::{Backbone, ModelName, DEFAULT_REPO_OWNER};
pub use error::{WeightError, WeightResult};
pub use fetch::{HttpTransport, Transport, WeightFetcher, DEFAULT_ENDPOINT};
pub use format::{
    load_record, CheckpointNormalizer, StateDictNormalizer, WeightFormat,
    SUPPORTED_WEIGHT_EXTENSIONS,
};
pub use layout::{
    check_layout, file_layout, module_layout, LayoutMismatch, ModuleLayout, ParameterLayout,
};
pub use registry::ModelFolderRegistry;
pub use store::{WeightStore, DEFAULT_FOLDER_KEY, DEFAULT_FOLDER_NAME};
