//! Backend and device selection.
//!
//! The backend is chosen at build time through cargo features, the device at
//! load time from the node's `device` input.

use core::{fmt, str::FromStr};

use burn::tensor::backend::Backend;
use cfg_if::cfg_if;
use serde::{Deserialize, Serialize};

use crate::error::{NodeError, NodeResult};

cfg_if! {
    if #[cfg(feature = "cuda")] {
        /// Backend the binary is built for.
        pub type SelectedBackend = burn::backend::Cuda;
        pub const BACKEND_NAME: &str = "CUDA (NVIDIA GPU)";
    } else if #[cfg(feature = "wgpu")] {
        /// Backend the binary is built for.
        pub type SelectedBackend = burn::backend::Wgpu;
        pub const BACKEND_NAME: &str = "WGPU (GPU)";
    } else {
        /// Backend the binary is built for.
        pub type SelectedBackend = burn::backend::NdArray;
        pub const BACKEND_NAME: &str = "NdArray (CPU)";
    }
}

/// Device choice offered by the loader nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DevicePreference {
    /// Best device the backend offers.
    #[default]
    Auto,
    Cpu,
}

impl DevicePreference {
    pub const ALL: [Self; 2] = [Self::Auto, Self::Cpu];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "AUTO",
            Self::Cpu => "CPU",
        }
    }
}

impl FromStr for DevicePreference {
    type Err = NodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|preference| preference.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| NodeError::UnknownDevice {
                value: s.to_owned(),
            })
    }
}

impl fmt::Display for DevicePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps a [`DevicePreference`] onto a concrete device of the backend.
pub trait ResolveDevice: Backend {
    /// # Errors
    /// Returns `NodeError::DeviceUnavailable` if the backend has no such device.
    fn resolve_device(preference: DevicePreference) -> NodeResult<Self::Device>;
}

#[cfg(any(test, feature = "ndarray"))]
impl ResolveDevice for burn::backend::NdArray {
    fn resolve_device(_preference: DevicePreference) -> NodeResult<Self::Device> {
        Ok(burn::backend::ndarray::NdArrayDevice::Cpu)
    }
}

#[cfg(feature = "wgpu")]
impl ResolveDevice for burn::backend::Wgpu {
    fn resolve_device(preference: DevicePreference) -> NodeResult<Self::Device> {
        use burn::backend::wgpu::WgpuDevice;

        Ok(match preference {
            DevicePreference::Auto => WgpuDevice::default(),
            DevicePreference::Cpu => WgpuDevice::Cpu,
        })
    }
}

#[cfg(feature = "cuda")]
impl ResolveDevice for burn::backend::Cuda {
    fn resolve_device(preference: DevicePreference) -> NodeResult<Self::Device> {
        match preference {
            DevicePreference::Auto => Ok(burn::backend::cuda::CudaDevice::default()),
            DevicePreference::Cpu => Err(NodeError::DeviceUnavailable {
                backend: "CUDA",
                device: preference.to_string(),
            }),
        }
    }
}
