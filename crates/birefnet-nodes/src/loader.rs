//! Model loading by catalog name or by registered file name.

use std::path::{Path, PathBuf};

use birefnet_weights::{
    check_layout, file_layout, load_record, module_layout, Backbone, LayoutMismatch, ModelName,
    StateDictNormalizer, Transport, WeightError, WeightFetcher, WeightStore,
};
use burn::{module::Module, tensor::backend::Backend};

use crate::{
    error::{NodeError, NodeResult},
    network::SegmentationNetwork,
};

/// A network with its weights loaded, bound to a device, gradients disabled.
#[derive(Debug)]
pub struct LoadedModel<B: Backend, N> {
    network: N,
    device: B::Device,
    backbone: Backbone,
    source: PathBuf,
}

impl<B: Backend, N: SegmentationNetwork<B>> LoadedModel<B, N> {
    pub const fn network(&self) -> &N {
        &self.network
    }

    /// Device the parameters live on; inputs are moved here before the forward pass.
    pub const fn device(&self) -> &B::Device {
        &self.device
    }

    pub const fn backbone(&self) -> Backbone {
        self.backbone
    }

    /// Weight file the parameters were read from.
    pub fn source(&self) -> &Path {
        &self.source
    }
}

/// Builds networks and fills them from the weight store.
pub struct ModelLoader<'a, T> {
    store: &'a WeightStore,
    fetcher: &'a WeightFetcher<T>,
    normalizer: &'a dyn StateDictNormalizer,
}

impl<'a, T: Transport> ModelLoader<'a, T> {
    pub fn new(
        store: &'a WeightStore,
        fetcher: &'a WeightFetcher<T>,
        normalizer: &'a dyn StateDictNormalizer,
    ) -> Self {
        Self {
            store,
            fetcher,
            normalizer,
        }
    }

    /// Loads a catalog model, downloading its weights first if they are missing.
    ///
    /// # Errors
    /// `UnknownModel` before any download for names outside the catalog,
    /// `MissingWeights` if the file cannot be found after the download, and any
    /// error of [`load_weights`](Self::load_weights).
    pub fn load_by_name<B, N>(
        &self,
        model_name: &str,
        device: &B::Device,
    ) -> NodeResult<LoadedModel<B, N>>
    where
        B: Backend,
        N: SegmentationNetwork<B>,
    {
        let name: ModelName = model_name.parse()?;
        let file_name = name.weights_file_name();

        let path = match self.store.resolve(&file_name) {
            Some(path) => path,
            None => {
                self.fetcher.ensure_downloaded(name.as_str())?;
                self.store
                    .resolve(&file_name)
                    .ok_or_else(|| NodeError::MissingWeights {
                        model_name: name.to_string(),
                        path: self.store.model_path(name),
                    })?
            }
        };

        self.load_weights(&path, name.backbone(), device)
    }

    /// Loads a weight file picked from the registered model folders.
    ///
    /// Custom checkpoints are assumed to use the standard Swin-L backbone.
    ///
    /// # Errors
    /// `WeightNotFound` if no registered folder holds `file_name`, and any error
    /// of [`load_weights`](Self::load_weights).
    pub fn load_from_file<B, N>(
        &self,
        file_name: &str,
        device: &B::Device,
    ) -> NodeResult<LoadedModel<B, N>>
    where
        B: Backend,
        N: SegmentationNetwork<B>,
    {
        let path = self.store.try_resolve(file_name)?;
        self.load_weights(&path, Backbone::SwinV1L, device)
    }

    /// Builds the network for `backbone` and loads the weights at `path` into it.
    ///
    /// Every tensor the network expects must be present with its exact shape,
    /// and the file may not hold tensors the network does not know, apart from
    /// [`ignored_keys`](SegmentationNetwork::ignored_keys).
    ///
    /// # Errors
    /// `UnsupportedFormat` for unknown extensions and `IncompatibleWeights` if the
    /// file cannot be mapped onto the network's parameters.
    pub fn load_weights<B, N>(
        &self,
        path: &Path,
        backbone: Backbone,
        device: &B::Device,
    ) -> NodeResult<LoadedModel<B, N>>
    where
        B: Backend,
        N: SegmentationNetwork<B>,
    {
        tracing::info!(path = %path.display(), %backbone, "loading BiRefNet weights");

        let incompatible = |reason: String| NodeError::IncompatibleWeights {
            path: path.to_path_buf(),
            backbone,
            reason,
        };

        let network = N::init(backbone, device)?;
        let expected = module_layout::<B, N>(&network)?;

        let weight_error = |error: WeightError| match error {
            WeightError::RecordLoad { reason, .. } => incompatible(reason),
            other => other.into(),
        };
        let layout_error = |mismatch: LayoutMismatch| incompatible(mismatch.to_string());

        let remaps = N::key_remaps();
        let ignored = N::ignored_keys();
        if let Some(on_disk) =
            file_layout(path, &remaps, &ignored, self.normalizer).map_err(weight_error)?
        {
            check_layout(&expected.pytorch, &on_disk).map_err(layout_error)?;
        }

        let record = load_record::<B, N>(path, &remaps, self.normalizer, device)
            .map_err(weight_error)?;

        // Burn records have no header to inspect up front.
        let network = network.load_record(record);
        check_layout(&expected.burn, &module_layout::<B, N>(&network)?.burn)
            .map_err(layout_error)?;

        let network = network.to_device(device).no_grad();
        tracing::info!(tensors = expected.burn.len(), "model ready");

        Ok(LoadedModel {
            network,
            device: device.clone(),
            backbone,
            source: path.to_path_buf(),
        })
    }
}
