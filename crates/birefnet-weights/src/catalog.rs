//! Pretrained model catalog.
//!
//! Maps the logical model names offered to users onto the HuggingFace
//! repositories that publish their weights, and onto the backbone each
//! checkpoint was trained with.

use core::{fmt, str::FromStr};

use crate::error::WeightError;

/// Owner of every published BiRefNet checkpoint on HuggingFace.
pub const DEFAULT_REPO_OWNER: &str = "ZhengPeng7";

/// File name of the weights inside each HuggingFace repository.
pub const REMOTE_WEIGHTS_FILE: &str = "model.safetensors";

/// Extension used for weights stored in the local model folder.
pub const LOCAL_WEIGHTS_EXTENSION: &str = "safetensors";

/// Backbone networks known to BiRefNet, in configuration-index order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backbone {
    Vgg16,
    Vgg16bn,
    Resnet50,
    SwinV1T,
    SwinV1S,
    SwinV1B,
    SwinV1L,
    PvtV2B0,
    PvtV2B1,
    PvtV2B2,
    PvtV2B5,
}

impl Backbone {
    pub const ALL: [Self; 11] = [
        Self::Vgg16,
        Self::Vgg16bn,
        Self::Resnet50,
        Self::SwinV1T,
        Self::SwinV1S,
        Self::SwinV1B,
        Self::SwinV1L,
        Self::PvtV2B0,
        Self::PvtV2B1,
        Self::PvtV2B2,
        Self::PvtV2B5,
    ];

    /// Position of this backbone in the configuration list.
    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Vgg16 => "vgg16",
            Self::Vgg16bn => "vgg16bn",
            Self::Resnet50 => "resnet50",
            Self::SwinV1T => "swin_v1_t",
            Self::SwinV1S => "swin_v1_s",
            Self::SwinV1B => "swin_v1_b",
            Self::SwinV1L => "swin_v1_l",
            Self::PvtV2B0 => "pvt_v2_b0",
            Self::PvtV2B1 => "pvt_v2_b1",
            Self::PvtV2B2 => "pvt_v2_b2",
            Self::PvtV2B5 => "pvt_v2_b5",
        }
    }
}

impl fmt::Display for Backbone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical names of the pretrained checkpoints that can be downloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelName {
    General,
    GeneralLite,
    Portrait,
    Dis,
    Hrsod,
    Cod,
    DisTrTes,
}

impl ModelName {
    /// Every name, in the order offered to users.
    pub const ALL: [Self; 7] = [
        Self::General,
        Self::GeneralLite,
        Self::Portrait,
        Self::Dis,
        Self::Hrsod,
        Self::Cod,
        Self::DisTrTes,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::General => "General",
            Self::GeneralLite => "General-Lite",
            Self::Portrait => "Portrait",
            Self::Dis => "DIS",
            Self::Hrsod => "HRSOD",
            Self::Cod => "COD",
            Self::DisTrTes => "DIS-TR_TEs",
        }
    }

    /// HuggingFace repository holding this checkpoint.
    pub const fn weights_repo(self) -> &'static str {
        match self {
            Self::General => "BiRefNet",
            Self::GeneralLite => "BiRefNet_T",
            Self::Portrait => "BiRefNet-portrait",
            Self::Dis => "BiRefNet-DIS5K",
            Self::Hrsod => "BiRefNet-HRSOD",
            Self::Cod => "BiRefNet-COD",
            Self::DisTrTes => "BiRefNet-DIS5K-TR_TEs",
        }
    }

    /// Backbone the checkpoint was trained with.
    pub const fn backbone(self) -> Backbone {
        match self {
            Self::GeneralLite => Backbone::SwinV1T,
            _ => Backbone::SwinV1L,
        }
    }

    /// File name of this checkpoint inside the local model folder.
    pub fn weights_file_name(self) -> String {
        format!("{}.{LOCAL_WEIGHTS_EXTENSION}", self.as_str())
    }

    /// Download URL of this checkpoint below `endpoint`.
    pub fn weights_url(self, endpoint: &str, owner: &str) -> String {
        format!(
            "{}/{owner}/{}/resolve/main/{REMOTE_WEIGHTS_FILE}",
            endpoint.trim_end_matches('/'),
            self.weights_repo()
        )
    }

    pub fn available_names() -> String {
        Self::ALL.map(Self::as_str).join(", ")
    }
}

impl FromStr for ModelName {
    type Err = WeightError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| WeightError::UnknownModel {
                model_name: s.to_owned(),
                available_models: Self::available_names(),
            })
    }
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
