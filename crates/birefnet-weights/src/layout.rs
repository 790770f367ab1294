//! Parameter layouts: the name and shape of every tensor a module expects or a
//! weight file provides.
//!
//! The recorders fill a module record by name and quietly skip tensors nobody
//! asked for, so a checkpoint for a different network can load without error
//! and only fail on the first forward pass. Comparing layouts up front turns
//! that into a load-time error naming the offending tensor.

use std::{
    collections::BTreeMap,
    fmt,
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

use burn::{
    module::Module,
    record::{FullPrecisionSettings, Record},
    tensor::backend::Backend,
};
use regex::Regex;
use safetensors::tensor::Metadata;
use serde::{ser, Serialize};
use thiserror::Error;

use crate::{
    error::{WeightError, WeightResult},
    format::{StateDictNormalizer, WeightFormat},
};

/// Dot-separated tensor names mapped to their shapes.
pub type ParameterLayout = BTreeMap<String, Vec<usize>>;

/// Same cap the safetensors crate applies to headers.
const MAX_HEADER_SIZE: u64 = 100_000_000;

/// First difference found between two layouts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutMismatch {
    #[error("tensor '{name}' has shape {found:?}, expected {expected:?}")]
    Shape {
        name: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("missing tensor '{name}'")]
    Missing { name: String },

    /// The file holds a tensor no parameter of the module is named after.
    #[error("unexpected tensor '{name}'")]
    Unexpected { name: String },
}

/// Checks that `found` holds exactly the tensors of `expected`, shape for shape.
///
/// # Errors
/// The first mismatch, in name order.
pub fn check_layout(
    expected: &ParameterLayout,
    found: &ParameterLayout,
) -> Result<(), LayoutMismatch> {
    for (name, shape) in expected {
        match found.get(name) {
            None => return Err(LayoutMismatch::Missing { name: name.clone() }),
            Some(found_shape) if found_shape != shape => {
                return Err(LayoutMismatch::Shape {
                    name: name.clone(),
                    expected: shape.clone(),
                    found: found_shape.clone(),
                })
            }
            Some(_) => {}
        }
    }

    match found.keys().find(|name| !expected.contains_key(*name)) {
        Some(name) => Err(LayoutMismatch::Unexpected { name: name.clone() }),
        None => Ok(()),
    }
}

/// Tensors of a module, named the way burn records name them and the way
/// PyTorch checkpoints name the same parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleLayout {
    /// Layout of the module's own record.
    pub burn: ParameterLayout,
    /// Layout burn-import's PyTorch adapter maps onto `burn`: linear weights
    /// transposed, norm `gamma`/`beta` called `weight`/`bias`.
    pub pytorch: ParameterLayout,
}

/// Collects the name and shape of every tensor in the record of `module`.
///
/// # Errors
/// Returns `WeightError::ParameterLayout` if the record cannot be walked.
pub fn module_layout<B, M>(module: &M) -> WeightResult<ModuleLayout>
where
    B: Backend,
    M: Module<B>,
{
    let item = module
        .clone()
        .into_record()
        .into_item::<FullPrecisionSettings>();

    let mut layout = ModuleLayout::default();
    item.serialize(LayoutWalker {
        layout: &mut layout,
        path: TensorPath::default(),
    })
    .map_err(|error| WeightError::ParameterLayout {
        reason: error.to_string(),
    })?;

    Ok(layout)
}

/// Reads tensor names and shapes from a weight file without loading the data.
///
/// Names are rewritten the way [`load_record`](crate::load_record) rewrites
/// them; names matching one of the `ignored` patterns afterwards are dropped.
/// The result follows the [`ModuleLayout::pytorch`] convention.
/// Returns `None` for burn records, whose layout is only known once loaded.
///
/// # Errors
/// `UnsupportedFormat` for unknown extensions, `InvalidKeyPattern` for bad
/// patterns and `RecordLoad` if the header cannot be read.
pub fn file_layout(
    path: &Path,
    remaps: &[(&str, &str)],
    ignored: &[&str],
    normalizer: &dyn StateDictNormalizer,
) -> WeightResult<Option<ParameterLayout>> {
    let (tensors, rules) = match WeightFormat::from_path(path)? {
        WeightFormat::SafeTensors => (
            read_safetensors_layout(path)?,
            compile_remaps(remaps.iter().copied())?,
        ),
        WeightFormat::PyTorch => {
            let legacy = normalizer.key_remaps();
            let rules = compile_remaps(
                legacy
                    .iter()
                    .map(|(pattern, replacement)| (pattern.as_str(), replacement.as_str()))
                    .chain(remaps.iter().copied()),
            )?;
            (read_pytorch_layout(path, normalizer.top_level_key())?, rules)
        }
        WeightFormat::MessagePack => return Ok(None),
    };

    let ignored = ignored
        .iter()
        .map(|pattern| compile_pattern(pattern))
        .collect::<WeightResult<Vec<_>>>()?;

    Ok(Some(
        tensors
            .into_iter()
            .map(|(name, shape)| (remap_key(name, &rules), shape))
            .filter(|(name, _)| !ignored.iter().any(|pattern| pattern.is_match(name)))
            .collect(),
    ))
}

pub(crate) fn compile_pattern(pattern: &str) -> WeightResult<Regex> {
    Regex::new(pattern).map_err(|source| WeightError::InvalidKeyPattern {
        pattern: pattern.to_owned(),
        source,
    })
}

fn compile_remaps<'a>(
    remaps: impl Iterator<Item = (&'a str, &'a str)>,
) -> WeightResult<Vec<(Regex, String)>> {
    remaps
        .map(|(pattern, replacement)| Ok((compile_pattern(pattern)?, replacement.to_owned())))
        .collect()
}

/// Applies every rule in order, as the burn-import recorders do.
fn remap_key(name: String, rules: &[(Regex, String)]) -> String {
    rules.iter().fold(name, |name, (pattern, replacement)| {
        pattern.replace_all(&name, replacement.as_str()).into_owned()
    })
}

fn read_safetensors_layout(path: &Path) -> WeightResult<ParameterLayout> {
    let header_error = |reason: String| WeightError::RecordLoad {
        format: WeightFormat::SafeTensors.as_str(),
        path: path.to_path_buf(),
        reason,
    };

    let file = File::open(path).map_err(|source| WeightError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = BufReader::new(file);

    let mut length = [0u8; 8];
    reader
        .read_exact(&mut length)
        .map_err(|error| header_error(format!("cannot read header length: {error}")))?;
    let length = u64::from_le_bytes(length);
    if length > MAX_HEADER_SIZE {
        return Err(header_error(format!("header of {length} bytes is too large")));
    }

    let mut header = Vec::new();
    reader
        .take(length)
        .read_to_end(&mut header)
        .map_err(|error| header_error(format!("cannot read header: {error}")))?;
    if header.len() as u64 != length {
        return Err(header_error("truncated header".to_owned()));
    }

    let metadata: Metadata = serde_json::from_slice(&header)
        .map_err(|error| header_error(format!("invalid header: {error}")))?;

    Ok(metadata
        .tensors()
        .into_iter()
        .map(|(name, info)| (name, info.shape.clone()))
        .collect())
}

fn read_pytorch_layout(path: &Path, top_level_key: Option<&str>) -> WeightResult<ParameterLayout> {
    let tensors = candle_core::pickle::read_pth_tensor_info(path, false, top_level_key)
        .map_err(|error| WeightError::RecordLoad {
            format: WeightFormat::PyTorch.as_str(),
            path: path.to_path_buf(),
            reason: error.to_string(),
        })?;

    Ok(tensors
        .into_iter()
        .map(|info| (info.name, info.layout.dims().to_vec()))
        .collect())
}

#[derive(Debug, Error)]
#[error("{0}")]
struct WalkError(String);

impl ser::Error for WalkError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Self(msg.to_string())
    }
}

/// What a serialized value was, as far as layouts are concerned.
enum Walked {
    Other,
    Dim(usize),
    Dims(Vec<usize>),
}

/// Where the walker is, under both naming conventions.
#[derive(Debug, Clone, Default)]
struct TensorPath {
    burn: String,
    pytorch: String,
    /// The PyTorch side stores this 2-D tensor transposed.
    transpose: bool,
}

impl TensorPath {
    fn child(&self, burn: &str, pytorch: &str, transpose: bool) -> Self {
        Self {
            burn: join(&self.burn, burn),
            pytorch: join(&self.pytorch, pytorch),
            transpose,
        }
    }
}

fn join(path: &str, segment: &str) -> String {
    if path.is_empty() {
        segment.to_owned()
    } else {
        format!("{path}.{segment}")
    }
}

/// PyTorch name of field `key` of module record `module`, and whether the
/// tensor is stored transposed there. Mirrors burn-import's PyTorch adapter.
fn pytorch_field(module: &str, key: &'static str) -> (&'static str, bool) {
    match (module.strip_suffix("RecordItem").unwrap_or(module), key) {
        ("Linear", "weight") => (key, true),
        ("BatchNorm" | "LayerNorm" | "GroupNorm", "gamma") => ("weight", false),
        ("BatchNorm" | "LayerNorm" | "GroupNorm", "beta") => ("bias", false),
        _ => (key, false),
    }
}

/// Serializer that records the path and shape of every tensor in a record
/// item and skips the tensor data.
///
/// Params serialize as `ParamSerde { id, param }` and tensors as
/// `TensorData { bytes, shape, dtype }`; every other struct field and sequence
/// index adds one segment to the path.
struct LayoutWalker<'a> {
    layout: &'a mut ModuleLayout,
    path: TensorPath,
}

impl<'a> ser::Serializer for LayoutWalker<'a> {
    type Ok = Walked;
    type Error = WalkError;
    type SerializeSeq = SeqWalker<'a>;
    type SerializeTuple = SeqWalker<'a>;
    type SerializeTupleStruct = SeqWalker<'a>;
    type SerializeTupleVariant = SeqWalker<'a>;
    type SerializeMap = ser::Impossible<Walked, WalkError>;
    type SerializeStruct = StructWalker<'a>;
    type SerializeStructVariant = StructWalker<'a>;

    fn serialize_bool(self, _v: bool) -> Result<Walked, WalkError> {
        Ok(Walked::Other)
    }

    fn serialize_i8(self, _v: i8) -> Result<Walked, WalkError> {
        Ok(Walked::Other)
    }

    fn serialize_i16(self, _v: i16) -> Result<Walked, WalkError> {
        Ok(Walked::Other)
    }

    fn serialize_i32(self, _v: i32) -> Result<Walked, WalkError> {
        Ok(Walked::Other)
    }

    fn serialize_i64(self, _v: i64) -> Result<Walked, WalkError> {
        Ok(Walked::Other)
    }

    fn serialize_u8(self, _v: u8) -> Result<Walked, WalkError> {
        Ok(Walked::Other)
    }

    fn serialize_u16(self, _v: u16) -> Result<Walked, WalkError> {
        Ok(Walked::Other)
    }

    fn serialize_u32(self, _v: u32) -> Result<Walked, WalkError> {
        Ok(Walked::Other)
    }

    // `usize` serializes as `u64`.
    fn serialize_u64(self, v: u64) -> Result<Walked, WalkError> {
        Ok(usize::try_from(v).map_or(Walked::Other, Walked::Dim))
    }

    fn serialize_f32(self, _v: f32) -> Result<Walked, WalkError> {
        Ok(Walked::Other)
    }

    fn serialize_f64(self, _v: f64) -> Result<Walked, WalkError> {
        Ok(Walked::Other)
    }

    fn serialize_char(self, _v: char) -> Result<Walked, WalkError> {
        Ok(Walked::Other)
    }

    fn serialize_str(self, _v: &str) -> Result<Walked, WalkError> {
        Ok(Walked::Other)
    }

    fn serialize_bytes(self, _v: &[u8]) -> Result<Walked, WalkError> {
        Ok(Walked::Other)
    }

    fn serialize_none(self) -> Result<Walked, WalkError> {
        Ok(Walked::Other)
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<Walked, WalkError> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Walked, WalkError> {
        Ok(Walked::Other)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Walked, WalkError> {
        Ok(Walked::Other)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
    ) -> Result<Walked, WalkError> {
        Ok(Walked::Other)
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Walked, WalkError> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        value: &T,
    ) -> Result<Walked, WalkError> {
        value.serialize(self)
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<SeqWalker<'a>, WalkError> {
        Ok(SeqWalker::new(self))
    }

    fn serialize_tuple(self, _len: usize) -> Result<SeqWalker<'a>, WalkError> {
        Ok(SeqWalker::new(self))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<SeqWalker<'a>, WalkError> {
        Ok(SeqWalker::new(self))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<SeqWalker<'a>, WalkError> {
        Ok(SeqWalker::new(self))
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, WalkError> {
        Err(WalkError(format!(
            "map-valued record at '{}' has no fixed parameter names",
            self.path.burn
        )))
    }

    fn serialize_struct(
        self,
        name: &'static str,
        _len: usize,
    ) -> Result<StructWalker<'a>, WalkError> {
        Ok(StructWalker::new(StructKind::of(name), self))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<StructWalker<'a>, WalkError> {
        Ok(StructWalker::new(StructKind::Module(""), self))
    }
}

struct SeqWalker<'a> {
    layout: &'a mut ModuleLayout,
    path: TensorPath,
    index: usize,
    /// Stays `Some` while every element is an index, as in a tensor shape.
    dims: Option<Vec<usize>>,
}

impl<'a> SeqWalker<'a> {
    fn new(walker: LayoutWalker<'a>) -> Self {
        Self {
            layout: walker.layout,
            path: walker.path,
            index: 0,
            dims: Some(Vec::new()),
        }
    }

    fn element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), WalkError> {
        let index = self.index.to_string();
        let walked = value.serialize(LayoutWalker {
            layout: &mut *self.layout,
            path: self.path.child(&index, &index, false),
        })?;
        self.index += 1;

        match walked {
            Walked::Dim(dim) => {
                if let Some(dims) = &mut self.dims {
                    dims.push(dim);
                }
            }
            _ => self.dims = None,
        }
        Ok(())
    }

    fn finish(self) -> Walked {
        self.dims.map_or(Walked::Other, Walked::Dims)
    }
}

impl ser::SerializeSeq for SeqWalker<'_> {
    type Ok = Walked;
    type Error = WalkError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), WalkError> {
        self.element(value)
    }

    fn end(self) -> Result<Walked, WalkError> {
        Ok(self.finish())
    }
}

impl ser::SerializeTuple for SeqWalker<'_> {
    type Ok = Walked;
    type Error = WalkError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), WalkError> {
        self.element(value)
    }

    fn end(self) -> Result<Walked, WalkError> {
        Ok(self.finish())
    }
}

impl ser::SerializeTupleStruct for SeqWalker<'_> {
    type Ok = Walked;
    type Error = WalkError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), WalkError> {
        self.element(value)
    }

    fn end(self) -> Result<Walked, WalkError> {
        Ok(self.finish())
    }
}

impl ser::SerializeTupleVariant for SeqWalker<'_> {
    type Ok = Walked;
    type Error = WalkError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), WalkError> {
        self.element(value)
    }

    fn end(self) -> Result<Walked, WalkError> {
        Ok(self.finish())
    }
}

enum StructKind {
    Param,
    TensorData,
    /// Any other record item, by serde name.
    Module(&'static str),
}

impl StructKind {
    fn of(name: &'static str) -> Self {
        match name {
            "ParamSerde" => Self::Param,
            "TensorData" => Self::TensorData,
            _ => Self::Module(name),
        }
    }
}

struct StructWalker<'a> {
    kind: StructKind,
    layout: &'a mut ModuleLayout,
    path: TensorPath,
}

impl<'a> StructWalker<'a> {
    fn new(kind: StructKind, walker: LayoutWalker<'a>) -> Self {
        Self {
            kind,
            layout: walker.layout,
            path: walker.path,
        }
    }

    fn field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), WalkError> {
        match (&self.kind, key) {
            (StructKind::Param, "param") => {
                value.serialize(LayoutWalker {
                    layout: &mut *self.layout,
                    path: self.path.clone(),
                })?;
            }
            (StructKind::TensorData, "shape") => {
                let walked = value.serialize(LayoutWalker {
                    layout: &mut *self.layout,
                    path: self.path.clone(),
                })?;
                if let Walked::Dims(shape) = walked {
                    let mut pytorch_shape = shape.clone();
                    if self.path.transpose {
                        pytorch_shape.reverse();
                    }
                    self.layout.burn.insert(self.path.burn.clone(), shape);
                    self.layout
                        .pytorch
                        .insert(self.path.pytorch.clone(), pytorch_shape);
                }
            }
            (StructKind::Param | StructKind::TensorData, _) => {}
            (StructKind::Module(module), _) => {
                let (pytorch_key, transpose) = pytorch_field(module, key);
                value.serialize(LayoutWalker {
                    layout: &mut *self.layout,
                    path: self.path.child(key, pytorch_key, transpose),
                })?;
            }
        }
        Ok(())
    }
}

impl ser::SerializeStruct for StructWalker<'_> {
    type Ok = Walked;
    type Error = WalkError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), WalkError> {
        self.field(key, value)
    }

    fn end(self) -> Result<Walked, WalkError> {
        Ok(Walked::Other)
    }
}

impl ser::SerializeStructVariant for StructWalker<'_> {
    type Ok = Walked;
    type Error = WalkError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), WalkError> {
        self.field(key, value)
    }

    fn end(self) -> Result<Walked, WalkError> {
        Ok(Walked::Other)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use burn::{
        backend::NdArray,
        module::Param,
        nn::{LayerNorm, LayerNormConfig, Linear, LinearConfig},
        prelude::*,
    };
    use safetensors::{tensor::TensorView, Dtype};

    use super::*;
    use crate::format::CheckpointNormalizer;

    type TestBackend = NdArray<f32>;

    #[derive(Module, Debug)]
    struct Block<B: Backend> {
        proj: Linear<B>,
        norm: LayerNorm<B>,
        gamma: Param<Tensor<B, 1>>,
    }

    #[derive(Module, Debug)]
    struct Stack<B: Backend> {
        blocks: Vec<Block<B>>,
        head: Option<Linear<B>>,
    }

    fn stack(device: &<TestBackend as Backend>::Device) -> Stack<TestBackend> {
        let block = || Block {
            proj: LinearConfig::new(3, 2).init(device),
            norm: LayerNormConfig::new(2).init(device),
            gamma: Param::from_tensor(Tensor::ones([2], device)),
        };
        Stack {
            blocks: vec![block(), block()],
            head: Some(LinearConfig::new(2, 1).with_bias(false).init(device)),
        }
    }

    fn write_zero_tensors(path: &Path, tensors: &[(&str, Vec<usize>)]) {
        let bytes: Vec<Vec<u8>> = tensors
            .iter()
            .map(|(_, shape)| vec![0u8; shape.iter().product::<usize>() * 4])
            .collect();
        let views: HashMap<String, TensorView<'_>> = tensors
            .iter()
            .zip(&bytes)
            .map(|((name, shape), data)| {
                let view = TensorView::new(Dtype::F32, shape.clone(), data).unwrap();
                ((*name).to_owned(), view)
            })
            .collect();
        std::fs::write(path, safetensors::serialize(&views, &None).unwrap()).unwrap();
    }

    fn layout(entries: &[(&str, &[usize])]) -> ParameterLayout {
        entries
            .iter()
            .map(|(name, shape)| ((*name).to_owned(), shape.to_vec()))
            .collect()
    }

    #[test]
    fn module_layout_names_nested_and_repeated_parameters() {
        let layout = module_layout::<TestBackend, _>(&stack(&Default::default())).unwrap();

        assert_eq!(
            layout.burn.keys().map(String::as_str).collect::<Vec<_>>(),
            [
                "blocks.0.gamma",
                "blocks.0.norm.beta",
                "blocks.0.norm.gamma",
                "blocks.0.proj.bias",
                "blocks.0.proj.weight",
                "blocks.1.gamma",
                "blocks.1.norm.beta",
                "blocks.1.norm.gamma",
                "blocks.1.proj.bias",
                "blocks.1.proj.weight",
                "head.weight",
            ]
        );
        assert_eq!(layout.burn["blocks.1.proj.weight"], [3, 2]);
        assert_eq!(layout.burn["head.weight"], [2, 1]);
    }

    #[test]
    fn pytorch_layout_follows_checkpoint_conventions() {
        let layout = module_layout::<TestBackend, _>(&stack(&Default::default())).unwrap();
        let pytorch = &layout.pytorch;

        assert_eq!(pytorch.len(), layout.burn.len());
        assert_eq!(pytorch["blocks.0.proj.weight"], [2, 3]);
        assert_eq!(pytorch["blocks.0.proj.bias"], [2]);
        assert_eq!(pytorch["head.weight"], [1, 2]);
        assert_eq!(pytorch["blocks.1.norm.weight"], [2]);
        assert_eq!(pytorch["blocks.1.norm.bias"], [2]);
        assert!(!pytorch.contains_key("blocks.1.norm.gamma"));
        // Only norm layers are renamed.
        assert_eq!(pytorch["blocks.0.gamma"], [2]);
    }

    #[test]
    fn file_layout_applies_remaps_and_ignores() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.safetensors");
        write_zero_tensors(
            &path,
            &[
                ("model.head.weight", vec![2, 1]),
                ("model.norm.num_batches_tracked", vec![1]),
            ],
        );

        let found = file_layout(
            &path,
            &[(r"^model\.(.+)", "$1")],
            &[r"num_batches_tracked$"],
            &CheckpointNormalizer::new(),
        )
        .unwrap()
        .unwrap();

        assert_eq!(found, layout(&[("head.weight", &[2, 1])]));
    }

    #[test]
    fn pytorch_checkpoint_matches_module_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stack.safetensors");
        let expected = module_layout::<TestBackend, _>(&stack(&Default::default())).unwrap();
        let tensors: Vec<(&str, Vec<usize>)> = expected
            .pytorch
            .iter()
            .map(|(name, shape)| (name.as_str(), shape.clone()))
            .collect();
        write_zero_tensors(&path, &tensors);

        let found = file_layout(&path, &[], &[], &CheckpointNormalizer::new())
            .unwrap()
            .unwrap();

        assert_eq!(check_layout(&expected.pytorch, &found), Ok(()));
        assert!(matches!(
            check_layout(&expected.burn, &found),
            Err(LayoutMismatch::Shape { .. } | LayoutMismatch::Missing { .. })
        ));
    }

    #[test]
    fn file_layout_is_unknown_for_burn_records() {
        let found = file_layout(
            Path::new("converted.mpk"),
            &[],
            &[],
            &CheckpointNormalizer::new(),
        )
        .unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn file_layout_rejects_bad_patterns_and_headers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.safetensors");
        write_zero_tensors(&path, &[("head.weight", vec![2, 1])]);
        assert!(matches!(
            file_layout(&path, &[("(", "")], &[], &CheckpointNormalizer::new()),
            Err(WeightError::InvalidKeyPattern { .. })
        ));

        let broken = dir.path().join("broken.safetensors");
        std::fs::write(&broken, b"not a tensor file").unwrap();
        assert!(matches!(
            file_layout(&broken, &[], &[], &CheckpointNormalizer::new()),
            Err(WeightError::RecordLoad { .. })
        ));
    }

    #[test]
    fn check_layout_reports_first_difference() {
        let expected = layout(&[("stem.bias", &[4]), ("stem.weight", &[4, 3, 1, 1])]);

        assert_eq!(check_layout(&expected, &expected.clone()), Ok(()));
        assert_eq!(
            check_layout(
                &expected,
                &layout(&[("stem.bias", &[4]), ("stem.weight", &[3, 4, 1, 1])])
            ),
            Err(LayoutMismatch::Shape {
                name: "stem.weight".to_owned(),
                expected: vec![4, 3, 1, 1],
                found: vec![3, 4, 1, 1],
            })
        );
        assert_eq!(
            check_layout(&expected, &layout(&[("stem.bias", &[4])])),
            Err(LayoutMismatch::Missing {
                name: "stem.weight".to_owned()
            })
        );

        let mut extra = expected.clone();
        extra.insert("decoder.unused".to_owned(), vec![1]);
        assert_eq!(
            check_layout(&expected, &extra),
            Err(LayoutMismatch::Unexpected {
                name: "decoder.unused".to_owned()
            })
        );
    }
}
