//! Weight file formats and record loading.

use std::path::{Path, PathBuf};

use burn::{
    module::Module,
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
    tensor::backend::Backend,
};
use burn_import::{
    pytorch::{LoadArgs as PyTorchLoadArgs, PyTorchFileRecorder},
    safetensors::{LoadArgs as SafetensorsLoadArgs, SafetensorsFileRecorder},
};

use crate::{
    error::{WeightError, WeightResult},
    layout::compile_pattern,
};

/// Extensions the weight store lists and [`WeightFormat::from_path`] accepts.
pub const SUPPORTED_WEIGHT_EXTENSIONS: [&str; 8] =
    ["safetensors", "sft", "pth", "pt", "ckpt", "bin", "pkl", "mpk"];

/// Serialized layouts a weight file can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightFormat {
    /// Flat tensor mapping (`.safetensors`, `.sft`).
    SafeTensors,
    /// Pickled PyTorch state dict (`.pth`, `.pt`, `.ckpt`, `.bin`, `.pkl`).
    PyTorch,
    /// Burn named MessagePack record (`.mpk`).
    MessagePack,
}

impl WeightFormat {
    pub const ALL: [Self; 3] = [Self::SafeTensors, Self::PyTorch, Self::MessagePack];

    /// Lower-case extensions of this format, without the dot.
    pub const fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::SafeTensors => &["safetensors", "sft"],
            Self::PyTorch => &["pth", "pt", "ckpt", "bin", "pkl"],
            Self::MessagePack => &["mpk"],
        }
    }

    /// Detects the format from the file extension (case-insensitive).
    ///
    /// # Errors
    /// Returns `WeightError::UnsupportedFormat` for any other extension.
    pub fn from_path(path: &Path) -> WeightResult<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        extension
            .and_then(|extension| {
                Self::ALL
                    .into_iter()
                    .find(|format| format.extensions().contains(&extension.as_str()))
            })
            .ok_or_else(|| WeightError::UnsupportedFormat {
                path: path.to_path_buf(),
            })
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SafeTensors => "safetensors",
            Self::PyTorch => "pytorch",
            Self::MessagePack => "messagepack",
        }
    }
}

/// Rewrites the parameter names of legacy training checkpoints.
pub trait StateDictNormalizer {
    /// `(pattern, replacement)` regex pairs applied to every key, in order.
    fn key_remaps(&self) -> Vec<(String, String)>;

    /// Entry of the pickled object that holds the state dict, if it is nested.
    fn top_level_key(&self) -> Option<&str> {
        None
    }
}

/// Strips the wrappers training scripts leave on parameter names.
///
/// `module.` comes from `DataParallel`, `_orig_mod.` from compiled models.
#[derive(Debug, Clone, Default)]
pub struct CheckpointNormalizer {
    top_level_key: Option<String>,
}

impl CheckpointNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the state dict from `key` (e.g. `"state_dict"`) instead of the root.
    #[must_use]
    pub fn with_top_level_key(mut self, key: impl Into<String>) -> Self {
        self.top_level_key = Some(key.into());
        self
    }
}

impl StateDictNormalizer for CheckpointNormalizer {
    fn key_remaps(&self) -> Vec<(String, String)> {
        vec![
            (r"^module\.(.+)".to_owned(), "$1".to_owned()),
            (r"^_orig_mod\.(.+)".to_owned(), "$1".to_owned()),
        ]
    }

    fn top_level_key(&self) -> Option<&str> {
        self.top_level_key.as_deref()
    }
}

/// Reads the record of module `M` from `path`.
///
/// `remaps` are regex pairs applied to every tensor name before matching it
/// against the module's parameter names. Legacy checkpoints go through
/// `normalizer` first.
///
/// # Errors
/// `UnsupportedFormat` for unknown extensions and `RecordLoad` when the file
/// cannot be read or does not fit the module.
pub fn load_record<B, M>(
    path: &Path,
    remaps: &[(&str, &str)],
    normalizer: &dyn StateDictNormalizer,
    device: &B::Device,
) -> WeightResult<M::Record>
where
    B: Backend,
    M: Module<B>,
{
    let format = WeightFormat::from_path(path)?;
    let record_error = |error: burn::record::RecorderError| WeightError::RecordLoad {
        format: format.as_str(),
        path: path.to_path_buf(),
        reason: error.to_string(),
    };

    tracing::debug!(path = %path.display(), format = format.as_str(), "reading weight record");

    // burn-import panics on invalid patterns.
    for (pattern, _) in remaps {
        compile_pattern(pattern)?;
    }

    match format {
        WeightFormat::SafeTensors => {
            let load_args = remaps.iter().fold(
                SafetensorsLoadArgs::new(path.to_path_buf()),
                |args, (pattern, replacement)| args.with_key_remap(pattern, replacement),
            );
            let recorder = SafetensorsFileRecorder::<FullPrecisionSettings>::default();
            Recorder::<B>::load(&recorder, load_args, device).map_err(record_error)
        }
        WeightFormat::PyTorch => {
            let legacy_remaps = normalizer.key_remaps();
            for (pattern, _) in &legacy_remaps {
                compile_pattern(pattern)?;
            }
            let mut load_args = legacy_remaps
                .iter()
                .map(|(pattern, replacement)| (pattern.as_str(), replacement.as_str()))
                .chain(remaps.iter().copied())
                .fold(
                    PyTorchLoadArgs::new(path.to_path_buf()),
                    |args, (pattern, replacement)| args.with_key_remap(pattern, replacement),
                );
            if let Some(key) = normalizer.top_level_key() {
                load_args = load_args.with_top_level_key(key);
            }
            let recorder = PyTorchFileRecorder::<FullPrecisionSettings>::default();
            Recorder::<B>::load(&recorder, load_args, device).map_err(record_error)
        }
        WeightFormat::MessagePack => {
            let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
            Recorder::<B>::load(&recorder, PathBuf::from(path), device).map_err(record_error)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use burn::{backend::NdArray, module::Param, prelude::*};
    use safetensors::{tensor::TensorView, Dtype};

    use super::*;

    type TestBackend = NdArray<f32>;

    #[derive(Module, Debug)]
    struct Scale<B: Backend> {
        scale: Param<Tensor<B, 1>>,
    }

    impl<B: Backend> Scale<B> {
        fn new(device: &B::Device) -> Self {
            Self {
                scale: Param::from_tensor(Tensor::zeros([3], device)),
            }
        }
    }

    fn write_safetensors(path: &Path, name: &str, values: &[f32]) {
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        let view = TensorView::new(Dtype::F32, vec![values.len()], &bytes).unwrap();
        let tensors = HashMap::from([(name.to_owned(), view)]);
        let serialized = safetensors::serialize(&tensors, &None).unwrap();
        std::fs::write(path, serialized).unwrap();
    }

    #[test]
    fn from_path_detects_formats_by_extension() {
        let cases = [
            ("General.safetensors", WeightFormat::SafeTensors),
            ("model.SFT", WeightFormat::SafeTensors),
            ("BiRefNet-epoch_244.pth", WeightFormat::PyTorch),
            ("weights.ckpt", WeightFormat::PyTorch),
            ("pytorch_model.bin", WeightFormat::PyTorch),
            ("legacy.pkl", WeightFormat::PyTorch),
            ("converted.mpk", WeightFormat::MessagePack),
        ];
        for (name, expected) in cases {
            assert_eq!(WeightFormat::from_path(Path::new(name)).unwrap(), expected);
        }
    }

    #[test]
    fn supported_extensions_are_exactly_the_loadable_ones() {
        for extension in SUPPORTED_WEIGHT_EXTENSIONS {
            let path = PathBuf::from(format!("weights.{extension}"));
            assert!(WeightFormat::from_path(&path).is_ok(), "{extension}");
        }
        let loadable: usize = WeightFormat::ALL
            .into_iter()
            .map(|format| format.extensions().len())
            .sum();
        assert_eq!(loadable, SUPPORTED_WEIGHT_EXTENSIONS.len());
    }

    #[test]
    fn from_path_rejects_unknown_extensions() {
        for name in ["weights.onnx", "weights", "weights.pt2"] {
            assert!(matches!(
                WeightFormat::from_path(Path::new(name)),
                Err(WeightError::UnsupportedFormat { .. })
            ));
        }
    }

    #[test]
    fn checkpoint_normalizer_strips_wrapper_prefixes() {
        let normalizer = CheckpointNormalizer::new();
        let patterns: Vec<_> = normalizer
            .key_remaps()
            .into_iter()
            .map(|(pattern, _)| pattern)
            .collect();

        assert_eq!(patterns, [r"^module\.(.+)", r"^_orig_mod\.(.+)"]);
        assert_eq!(normalizer.top_level_key(), None);
        assert_eq!(
            normalizer.with_top_level_key("state_dict").top_level_key(),
            Some("state_dict")
        );
    }

    #[test]
    fn load_record_reads_safetensors_with_remap() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scale.safetensors");
        write_safetensors(&path, "net.scale", &[0.5, -1.0, 2.0]);
        let device = Default::default();

        let record = load_record::<TestBackend, Scale<TestBackend>>(
            &path,
            &[(r"^net\.(.+)", "$1")],
            &CheckpointNormalizer::new(),
            &device,
        )
        .unwrap();
        let scale_net = Scale::<TestBackend>::new(&device).load_record(record);

        scale_net
            .scale
            .val()
            .into_data()
            .assert_eq(&TensorData::from([0.5f32, -1.0, 2.0]), true);
    }

    #[test]
    fn load_record_reads_named_messagepack() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("converted.mpk");
        let device = Default::default();
        let mut scale_net = Scale::<TestBackend>::new(&device);
        scale_net.scale = Param::from_tensor(Tensor::from_floats([4.0, 0.25, -3.0], &device));

        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        Recorder::<TestBackend>::record(&recorder, scale_net.into_record(), path.clone()).unwrap();

        let record = load_record::<TestBackend, Scale<TestBackend>>(
            &path,
            &[],
            &CheckpointNormalizer::new(),
            &device,
        )
        .unwrap();
        let loaded = Scale::<TestBackend>::new(&device).load_record(record);

        loaded
            .scale
            .val()
            .into_data()
            .assert_eq(&TensorData::from([4.0f32, 0.25, -3.0]), true);
    }

    #[test]
    fn load_record_reports_unreadable_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.safetensors");
        std::fs::write(&path, b"not a tensor file").unwrap();

        let result = load_record::<TestBackend, Scale<TestBackend>>(
            &path,
            &[],
            &CheckpointNormalizer::new(),
            &Default::default(),
        );

        assert!(matches!(
            result,
            Err(WeightError::RecordLoad {
                format: "safetensors",
                ..
            })
        ));
    }
}
