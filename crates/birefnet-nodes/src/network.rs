//! The segmentation network seam.
//!
//! The nodes are generic over the network so any burn implementation of the
//! BiRefNet architecture can be plugged in.

use birefnet_weights::Backbone;
use burn::{
    module::Module,
    tensor::{backend::Backend, Tensor},
};

use crate::error::NodeResult;

/// A dichotomous segmentation network that can be built for a backbone and
/// predicts foreground logits.
pub trait SegmentationNetwork<B: Backend>: Module<B> + Sized {
    /// Builds the network with freshly initialized parameters.
    ///
    /// # Errors
    /// Fails if the implementation does not support `backbone`.
    fn init(backbone: Backbone, device: &B::Device) -> NodeResult<Self>;

    /// Regex `(pattern, replacement)` pairs mapping published parameter names
    /// onto this module's field names.
    fn key_remaps() -> Vec<(&'static str, &'static str)> {
        Vec::new()
    }

    /// Regex patterns for checkpoint tensors with no parameter counterpart,
    /// matched after the remaps. Any other unknown tensor rejects the file.
    fn ignored_keys() -> Vec<&'static str> {
        vec![r"(^|\.)num_batches_tracked$"]
    }

    /// Runs a forward pass on a normalized `[1, 3, S, S]` batch.
    ///
    /// Returns the logits of every prediction head, coarsest first. Each head
    /// is `[1, 1, h, w]`.
    ///
    /// # Errors
    /// Implementation-specific failures.
    fn forward_heads(&self, input: Tensor<B, 4>) -> NodeResult<Vec<Tensor<B, 4>>>;
}
