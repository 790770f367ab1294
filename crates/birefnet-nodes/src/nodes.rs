//! The node classes exposed to the host.
//!
//! | class | category | function |
//! |---|---|---|
//! | [`LoadBiRefNetModelByName`] | `image/BiRefNet` | `load_model` |
//! | [`LoadRembgByBiRefNetModel`] | `rembg/BiRefNet` | `load_model` |
//! | [`RembgByBiRefNet`] | `rembg/BiRefNet` | `rem_bg` |

use birefnet_weights::{
    CheckpointNormalizer, HttpTransport, ModelFolderRegistry, ModelName, StateDictNormalizer,
    Transport, WeightFetcher, WeightStore, SUPPORTED_WEIGHT_EXTENSIONS,
};
use burn::tensor::{backend::Backend, Tensor};

use crate::{
    backend::{DevicePreference, ResolveDevice},
    config::NodeConfig,
    error::{NodeError, NodeResult},
    inference::{remove_background, RembgOutput},
    loader::{LoadedModel, ModelLoader},
    network::SegmentationNetwork,
    schema::{InputSpec, NodeSchema, OutputSpec, IMAGE_TYPE, MASK_TYPE, MODEL_TYPE},
};

const CATEGORY_LOADER: &str = "image/BiRefNet";
const CATEGORY_REMBG: &str = "rembg/BiRefNet";

/// State shared by every node: configuration, weight store and fetcher.
pub struct NodeContext<T = HttpTransport> {
    config: NodeConfig,
    store: WeightStore,
    fetcher: WeightFetcher<T>,
    normalizer: Box<dyn StateDictNormalizer>,
}

impl NodeContext<HttpTransport> {
    /// Opens the weight store described by `config` and downloads over HTTP.
    ///
    /// # Errors
    /// Fails if the model folder cannot be created or the HTTP client cannot be built.
    pub fn from_config(config: NodeConfig, registry: ModelFolderRegistry) -> NodeResult<Self> {
        let transport = HttpTransport::new()?;
        Self::with_transport(config, registry, transport)
    }
}

impl<T: Transport> NodeContext<T> {
    /// Opens the weight store described by `config` with a custom transport.
    ///
    /// `config.extra_model_paths` are registered ahead of the default folder,
    /// so the first of them becomes the download root.
    ///
    /// # Errors
    /// Fails if the model folder cannot be created.
    pub fn with_transport(
        config: NodeConfig,
        mut registry: ModelFolderRegistry,
        transport: T,
    ) -> NodeResult<Self> {
        let key = config.folder_key.as_str();
        if registry.contains(key) {
            for path in &config.extra_model_paths {
                registry.add_path(key, path.clone());
            }
        } else if !config.extra_model_paths.is_empty() {
            registry.register_folder(
                key,
                config.extra_model_paths.iter().cloned(),
                SUPPORTED_WEIGHT_EXTENSIONS,
            );
        }

        let store = WeightStore::open(registry, &config.models_dir, key, &config.folder_name)?;
        let fetcher = WeightFetcher::new(transport, store.root())
            .with_endpoint(config.endpoint.clone())
            .with_owner(config.repo_owner.clone());

        Ok(Self {
            config,
            store,
            fetcher,
            normalizer: Box::new(CheckpointNormalizer::new()),
        })
    }

    /// Replaces the normalizer applied to legacy checkpoints.
    #[must_use]
    pub fn with_normalizer(mut self, normalizer: impl StateDictNormalizer + 'static) -> Self {
        self.normalizer = Box::new(normalizer);
        self
    }

    pub const fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub const fn store(&self) -> &WeightStore {
        &self.store
    }

    pub const fn fetcher(&self) -> &WeightFetcher<T> {
        &self.fetcher
    }

    pub fn loader(&self) -> ModelLoader<'_, T> {
        ModelLoader::new(&self.store, &self.fetcher, self.normalizer.as_ref())
    }
}

fn device_input() -> InputSpec {
    InputSpec::choice("device", DevicePreference::ALL.map(DevicePreference::as_str))
}

fn resolve_device<B: ResolveDevice>(device: &str) -> NodeResult<B::Device> {
    let preference: DevicePreference = device.parse()?;
    B::resolve_device(preference)
}

/// Loads a pretrained model by catalog name, downloading it on first use.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadBiRefNetModelByName;

impl LoadBiRefNetModelByName {
    pub const CLASS_NAME: &'static str = "LoadBiRefNetModelByName";

    pub fn schema() -> NodeSchema {
        NodeSchema {
            class_name: Self::CLASS_NAME.to_owned(),
            display_name: Self::CLASS_NAME.to_owned(),
            category: CATEGORY_LOADER.to_owned(),
            description: Some(
                "Auto download BiRefNet model from huggingface to models/BiRefNet/{model_name}.safetensors"
                    .to_owned(),
            ),
            inputs: vec![
                InputSpec::choice("model_name", ModelName::ALL.map(ModelName::as_str)),
                device_input(),
            ],
            outputs: vec![OutputSpec::new(MODEL_TYPE, "model")],
            function: "load_model".to_owned(),
        }
    }

    /// # Errors
    /// `UnknownDevice` or `UnknownModel` before anything is downloaded, then
    /// any download or load failure.
    pub fn load_model<B, N, T>(
        &self,
        ctx: &NodeContext<T>,
        model_name: &str,
        device: &str,
    ) -> NodeResult<LoadedModel<B, N>>
    where
        B: ResolveDevice,
        N: SegmentationNetwork<B>,
        T: Transport,
    {
        let device = resolve_device::<B>(device)?;
        ctx.loader().load_by_name(model_name, &device)
    }
}

/// Loads a weight file chosen from the registered model folders.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadRembgByBiRefNetModel;

impl LoadRembgByBiRefNetModel {
    pub const CLASS_NAME: &'static str = "LoadRembgByBiRefNetModel";

    /// The `model` choice lists the weight files currently on disk.
    pub fn schema<T>(ctx: &NodeContext<T>) -> NodeSchema {
        NodeSchema {
            class_name: Self::CLASS_NAME.to_owned(),
            display_name: Self::CLASS_NAME.to_owned(),
            category: CATEGORY_REMBG.to_owned(),
            description: None,
            inputs: vec![
                InputSpec::choice("model", ctx.store.list_weight_files()),
                device_input(),
            ],
            outputs: vec![OutputSpec::new(MODEL_TYPE, "model")],
            function: "load_model".to_owned(),
        }
    }

    /// # Errors
    /// `UnknownDevice`, `WeightNotFound` if no registered folder holds `model`,
    /// then any load failure.
    pub fn load_model<B, N, T>(
        &self,
        ctx: &NodeContext<T>,
        model: &str,
        device: &str,
    ) -> NodeResult<LoadedModel<B, N>>
    where
        B: ResolveDevice,
        N: SegmentationNetwork<B>,
        T: Transport,
    {
        let device = resolve_device::<B>(device)?;
        ctx.loader().load_from_file(model, &device)
    }
}

/// Removes the background of an image batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct RembgByBiRefNet;

impl RembgByBiRefNet {
    pub const CLASS_NAME: &'static str = "RembgByBiRefNet";

    pub fn schema() -> NodeSchema {
        NodeSchema {
            class_name: Self::CLASS_NAME.to_owned(),
            display_name: Self::CLASS_NAME.to_owned(),
            category: CATEGORY_REMBG.to_owned(),
            description: None,
            inputs: vec![
                InputSpec::socket("model", MODEL_TYPE),
                InputSpec::socket("images", IMAGE_TYPE),
            ],
            outputs: vec![
                OutputSpec::new(IMAGE_TYPE, "image"),
                OutputSpec::new(MASK_TYPE, "mask"),
            ],
            function: "rem_bg".to_owned(),
        }
    }

    /// Processes `[H, W, 3]` images of any size, keeping them separate.
    ///
    /// # Errors
    /// See [`remove_background`].
    pub fn rem_bg<B, N, T>(
        &self,
        ctx: &NodeContext<T>,
        model: &LoadedModel<B, N>,
        images: Vec<Tensor<B, 3>>,
    ) -> NodeResult<RembgOutput<B>>
    where
        B: Backend,
        N: SegmentationNetwork<B>,
    {
        remove_background(model, images, ctx.config.input_size)
    }

    /// Processes a host `[N, H, W, 3]` batch into `[N, H, W, 4]` images and
    /// `[N, H, W]` masks.
    ///
    /// # Errors
    /// `EmptyBatch` for `N == 0`, then see [`remove_background`].
    pub fn rem_bg_batch<B, N, T>(
        &self,
        ctx: &NodeContext<T>,
        model: &LoadedModel<B, N>,
        images: Tensor<B, 4>,
    ) -> NodeResult<(Tensor<B, 4>, Tensor<B, 3>)>
    where
        B: Backend,
        N: SegmentationNetwork<B>,
    {
        let [batch, ..] = images.dims();
        if batch == 0 {
            return Err(NodeError::EmptyBatch);
        }

        let images = images
            .chunk(batch, 0)
            .into_iter()
            .map(|image| image.squeeze::<3>(0))
            .collect();
        self.rem_bg(ctx, model, images)?.stack()
    }
}

/// Class names and display names of every node, in registration order.
pub const NODE_DISPLAY_NAMES: [(&str, &str); 3] = [
    (
        LoadBiRefNetModelByName::CLASS_NAME,
        LoadBiRefNetModelByName::CLASS_NAME,
    ),
    (
        LoadRembgByBiRefNetModel::CLASS_NAME,
        LoadRembgByBiRefNetModel::CLASS_NAME,
    ),
    (RembgByBiRefNet::CLASS_NAME, RembgByBiRefNet::CLASS_NAME),
];

/// Schemas of every node, in registration order.
pub fn node_schemas<T>(ctx: &NodeContext<T>) -> Vec<NodeSchema> {
    vec![
        LoadBiRefNetModelByName::schema(),
        LoadRembgByBiRefNetModel::schema(ctx),
        RembgByBiRefNet::schema(),
    ]
}
