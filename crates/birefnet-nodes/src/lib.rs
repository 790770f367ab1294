//! # BiRefNet Nodes
//!
//! Background removal nodes built on BiRefNet: two loaders (by catalog name
//! with automatic download, or from a file in the registered model folders)
//! and an inference node that turns image batches into masks and RGBA images.
//!
//! The network itself is a type parameter; see [`SegmentationNetwork`].

pub mod backend;
pub mod config;
pub mod error;
pub mod inference;
pub mod loader;
pub mod network;
pub mod nodes;
pub mod schema;

#[cfg(test)]
mod test_utils;

pub use backend::{DevicePreference, ResolveDevice, SelectedBackend, BACKEND_NAME};
pub use config::{default_models_dir, NodeConfig};
pub use error::{NodeError, NodeResult};
pub use inference::{remove_background, RembgOutput};
pub use loader::{LoadedModel, ModelLoader};
pub use network::SegmentationNetwork;
pub use nodes::{
    node_schemas, LoadBiRefNetModelByName, LoadRembgByBiRefNetModel, NodeContext,
    RembgByBiRefNet, NODE_DISPLAY_NAMES,
};
pub use schema::NodeSchema;

#[doc(inline)]
pub use birefnet_weights as weights;
