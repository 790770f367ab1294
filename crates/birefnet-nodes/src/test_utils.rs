//! Small network, weight fixtures and a fake transport shared by the tests.

use std::{
    cell::Cell,
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use birefnet_weights::{Backbone, Transport, WeightError, WeightResult};
use burn::{
    backend::NdArray,
    nn::conv::{Conv2d, Conv2dConfig},
    prelude::*,
    tensor::{
        activation::relu,
        module::interpolate,
        ops::{InterpolateMode, InterpolateOptions},
    },
};
use safetensors::{tensor::TensorView, Dtype};

use crate::{error::NodeResult, network::SegmentationNetwork};

pub type TestBackend = NdArray<f32>;

/// Two 1x1 convolutions; the lite backbone gets fewer hidden channels so
/// mixed-up checkpoints do not fit.
#[derive(Module, Debug)]
pub struct TinyNet<B: Backend> {
    stem: Conv2d<B>,
    head: Conv2d<B>,
}

pub const fn hidden_channels(backbone: Backbone) -> usize {
    match backbone {
        Backbone::SwinV1T => 2,
        _ => 4,
    }
}

impl<B: Backend> SegmentationNetwork<B> for TinyNet<B> {
    fn init(backbone: Backbone, device: &B::Device) -> NodeResult<Self> {
        let hidden = hidden_channels(backbone);
        Ok(Self {
            stem: Conv2dConfig::new([3, hidden], [1, 1]).init(device),
            head: Conv2dConfig::new([hidden, 1], [1, 1]).init(device),
        })
    }

    fn forward_heads(&self, input: Tensor<B, 4>) -> NodeResult<Vec<Tensor<B, 4>>> {
        let features = relu(self.stem.forward(input));
        let fine = self.head.forward(features);
        let [_, _, height, width] = fine.dims();
        let coarse = interpolate(
            fine.clone(),
            [(height / 2).max(1), (width / 2).max(1)],
            InterpolateOptions::new(InterpolateMode::Nearest),
        );
        Ok(vec![coarse, fine])
    }
}

/// A named tensor for [`write_tensors`].
pub type NamedTensor = (String, Vec<usize>, Vec<f32>);

/// Deterministic [`TinyNet`] parameters for `backbone`, in checkpoint naming.
pub fn tiny_tensors(backbone: Backbone) -> Vec<NamedTensor> {
    let hidden = hidden_channels(backbone);
    let ramp = |len: usize, scale: f32| -> Vec<f32> {
        (0..len)
            .map(|i| ((i % 7) as f32 - 3.0) * scale)
            .collect()
    };

    vec![
        ("stem.weight".to_owned(), vec![hidden, 3, 1, 1], ramp(hidden * 3, 0.25)),
        ("stem.bias".to_owned(), vec![hidden], ramp(hidden, 0.1)),
        ("head.weight".to_owned(), vec![1, hidden, 1, 1], ramp(hidden, -0.5)),
        ("head.bias".to_owned(), vec![1], vec![0.05]),
    ]
}

/// Writes `tensors` as a safetensors file.
pub fn write_tensors(path: &Path, tensors: &[NamedTensor]) {
    let bytes: Vec<Vec<u8>> = tensors
        .iter()
        .map(|(_, _, values)| values.iter().flat_map(|v| v.to_le_bytes()).collect())
        .collect();
    let views: HashMap<String, TensorView<'_>> = tensors
        .iter()
        .zip(&bytes)
        .map(|((name, shape, _), data)| {
            let view = TensorView::new(Dtype::F32, shape.clone(), data).unwrap();
            (name.clone(), view)
        })
        .collect();

    let serialized = safetensors::serialize(&views, &None).unwrap();
    fs::write(path, serialized).unwrap();
}

/// Writes deterministic [`TinyNet`] weights for `backbone` to `path`.
pub fn write_tiny_weights(path: &Path, backbone: Backbone) {
    write_tensors(path, &tiny_tensors(backbone));
}

/// Path of a checked-in checkpoint under `tests/fixtures`.
///
/// The `.pth` files hold the [`Backbone::SwinV1L`] tensors of [`tiny_tensors`]
/// behind training-wrapper prefixes.
pub fn fixture_path(file_name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(file_name)
}

/// Writes [`TinyNet`] weights instead of downloading and counts the calls.
#[derive(Debug, Default)]
pub struct FakeTransport {
    calls: Cell<usize>,
}

impl FakeTransport {
    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl Transport for FakeTransport {
    fn download(&self, url: &str, destination: &Path) -> WeightResult<u64> {
        self.calls.set(self.calls.get() + 1);
        let backbone = if url.contains("/BiRefNet_T/") {
            Backbone::SwinV1T
        } else {
            Backbone::SwinV1L
        };
        write_tiny_weights(destination, backbone);
        fs::metadata(destination)
            .map(|meta| meta.len())
            .map_err(|source| WeightError::Io {
                path: destination.to_path_buf(),
                source,
            })
    }
}

/// `[height, width, 3]` image with a smooth colour gradient in `[0, 1]`.
pub fn gradient_image<B: Backend>(height: usize, width: usize, device: &B::Device) -> Tensor<B, 3> {
    let values: Vec<f32> = (0..height * width * 3)
        .map(|i| (i % 17) as f32 / 16.0)
        .collect();
    Tensor::from_data(TensorData::new(values, [height, width, 3]), device)
}
