//! Background removal on image batches.

use burn::{
    prelude::*,
    tensor::{
        activation::sigmoid,
        module::interpolate,
        ops::{InterpolateMode, InterpolateOptions},
    },
};

use crate::{
    error::{NodeError, NodeResult},
    loader::LoadedModel,
    network::SegmentationNetwork,
};

/// Square resolution BiRefNet checkpoints are trained on.
pub const DEFAULT_INPUT_SIZE: usize = 1024;

/// ImageNet channel means.
pub const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet channel standard deviations.
pub const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Per-channel normalization of `[N, 3, H, W]` batches.
pub struct Normalizer<B: Backend> {
    pub mean: Tensor<B, 4>,
    pub std: Tensor<B, 4>,
}

impl<B: Backend> Normalizer<B> {
    pub fn new(device: &B::Device) -> Self {
        let mean = Tensor::<B, 1>::from_floats(MEAN, device).reshape([1, 3, 1, 1]);
        let std = Tensor::<B, 1>::from_floats(STD, device).reshape([1, 3, 1, 1]);
        Self { mean, std }
    }

    pub fn normalize(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        (input - self.mean.clone()) / self.std.clone()
    }
}

/// Results of a batch, in input order.
#[derive(Debug, Clone)]
pub struct RembgOutput<B: Backend> {
    /// `[H, W, 4]` images: the input channels plus the mask as alpha.
    pub images: Vec<Tensor<B, 3>>,
    /// `[H, W]` foreground probabilities in `[0, 1]`.
    pub masks: Vec<Tensor<B, 2>>,
}

impl<B: Backend> RembgOutput<B> {
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Stacks the batch into `[N, H, W, 4]` images and `[N, H, W]` masks.
    ///
    /// # Errors
    /// `EmptyBatch` for an empty output, `InconsistentBatch` if the images do
    /// not all share the first image's resolution.
    pub fn stack(self) -> NodeResult<(Tensor<B, 4>, Tensor<B, 3>)> {
        let first = self.images.first().ok_or(NodeError::EmptyBatch)?;
        let [height, width, _] = first.dims();

        for (index, image) in self.images.iter().enumerate() {
            let [h, w, _] = image.dims();
            if [h, w] != [height, width] {
                return Err(NodeError::InconsistentBatch {
                    index,
                    expected: [height, width],
                    actual: [h, w],
                });
            }
        }

        Ok((Tensor::stack(self.images, 0), Tensor::stack(self.masks, 0)))
    }
}

/// Predicts a foreground mask for every image and attaches it as alpha.
///
/// Each `[H, W, 3]` image in `[0, 1]` is quantized to 8-bit levels, resized to
/// `input_size`x`input_size`, normalized and passed through the network. The
/// last head is turned into probabilities and resized back to `H`x`W`. Images
/// are processed one at a time; the outputs live on the device of their input.
///
/// # Errors
/// `EmptyBatch` for no images, `InvalidImageShape` for anything that is not
/// `[H, W, 3]`, and any network failure. One failing image fails the batch.
pub fn remove_background<B, N>(
    model: &LoadedModel<B, N>,
    images: Vec<Tensor<B, 3>>,
    input_size: usize,
) -> NodeResult<RembgOutput<B>>
where
    B: Backend,
    N: SegmentationNetwork<B>,
{
    if images.is_empty() {
        return Err(NodeError::EmptyBatch);
    }

    let normalizer = Normalizer::new(model.device());
    let mut output = RembgOutput {
        images: Vec::with_capacity(images.len()),
        masks: Vec::with_capacity(images.len()),
    };

    for (index, image) in images.into_iter().enumerate() {
        let [height, width, channels] = image.dims();
        if channels != 3 || height == 0 || width == 0 {
            return Err(NodeError::InvalidImageShape {
                dims: vec![height, width, channels],
            });
        }
        tracing::debug!(index, height, width, "removing background");

        let mask = predict_mask(model, &normalizer, image.clone(), input_size)?;
        let alpha = mask.clone().unsqueeze_dim::<3>(2);

        output.images.push(Tensor::cat(vec![image, alpha], 2));
        output.masks.push(mask);
    }

    Ok(output)
}

fn predict_mask<B, N>(
    model: &LoadedModel<B, N>,
    normalizer: &Normalizer<B>,
    image: Tensor<B, 3>,
    input_size: usize,
) -> NodeResult<Tensor<B, 2>>
where
    B: Backend,
    N: SegmentationNetwork<B>,
{
    let [height, width, _] = image.dims();
    let image_device = image.device();

    // Same levels the host would see after an 8-bit round trip.
    let input = image
        .to_device(model.device())
        .mul_scalar(255.0)
        .clamp(0.0, 255.0)
        .floor()
        .div_scalar(255.0)
        .permute([2, 0, 1])
        .unsqueeze::<4>();

    let input = interpolate(
        input,
        [input_size, input_size],
        InterpolateOptions::new(InterpolateMode::Bilinear),
    );
    let input = normalizer.normalize(input);

    let logits = model
        .network()
        .forward_heads(input)?
        .pop()
        .ok_or(NodeError::EmptyOutput)?;

    let [batch, mask_channels, _, _] = logits.dims();
    if batch != 1 || mask_channels != 1 {
        return Err(NodeError::Network {
            reason: format!("expected a [1, 1, h, w] head, got {:?}", logits.dims()),
        });
    }

    let mask = interpolate(
        sigmoid(logits),
        [height, width],
        InterpolateOptions::new(InterpolateMode::Bilinear),
    );

    Ok(mask.reshape([height, width]).to_device(&image_device))
}
