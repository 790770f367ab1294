//! Local weight store.
//!
//! Owns the model-folder registry handed over by the host and makes sure the
//! BiRefNet folder is part of it.

use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{
    catalog::{ModelName, LOCAL_WEIGHTS_EXTENSION},
    error::{WeightError, WeightResult},
    format::SUPPORTED_WEIGHT_EXTENSIONS,
    registry::ModelFolderRegistry,
};

/// Registry key the BiRefNet folder is registered under.
pub const DEFAULT_FOLDER_KEY: &str = "birefnet";

/// Sub-directory of the models directory holding BiRefNet weights.
pub const DEFAULT_FOLDER_NAME: &str = "BiRefNet";

/// Resolves model names to weight files inside the registered folders.
#[derive(Debug, Clone)]
pub struct WeightStore {
    registry: ModelFolderRegistry,
    key: String,
    root: PathBuf,
}

impl WeightStore {
    /// Creates `<models_dir>/<folder_name>` and registers it under `key`.
    ///
    /// A key the registry already knows keeps its directories and gains the
    /// default one at the end; an unknown key is registered with the default
    /// directory and the supported weight extensions. The store root is the
    /// first directory registered under the key.
    ///
    /// # Errors
    /// Returns `WeightError::CreateDir` if the directory cannot be created.
    pub fn open(
        mut registry: ModelFolderRegistry,
        models_dir: impl AsRef<Path>,
        key: &str,
        folder_name: &str,
    ) -> WeightResult<Self> {
        let default_dir = models_dir.as_ref().join(folder_name);
        fs::create_dir_all(&default_dir).map_err(|source| WeightError::CreateDir {
            path: default_dir.clone(),
            source,
        })?;

        if registry.contains(key) {
            registry.add_path(key, default_dir.clone());
        } else {
            registry.register_folder(key, [default_dir.clone()], SUPPORTED_WEIGHT_EXTENSIONS);
        }

        let root = registry
            .folder_paths(key)?
            .first()
            .cloned()
            .unwrap_or(default_dir);

        tracing::info!(key, root = %root.display(), "registered BiRefNet model folder");

        Ok(Self {
            registry,
            key: key.to_owned(),
            root,
        })
    }

    /// Opens the store with the default key and folder name.
    ///
    /// # Errors
    /// See [`open`](Self::open).
    pub fn open_default(
        registry: ModelFolderRegistry,
        models_dir: impl AsRef<Path>,
    ) -> WeightResult<Self> {
        Self::open(registry, models_dir, DEFAULT_FOLDER_KEY, DEFAULT_FOLDER_NAME)
    }

    /// Directory downloads are written to.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn registry(&self) -> &ModelFolderRegistry {
        &self.registry
    }

    /// Path the weights for `model_name` live at inside the store root.
    pub fn get_model_path(&self, model_name: &str) -> PathBuf {
        self.root.join(format!("{model_name}.{LOCAL_WEIGHTS_EXTENSION}"))
    }

    /// Path of the checkpoint for a catalog entry.
    pub fn model_path(&self, name: ModelName) -> PathBuf {
        self.get_model_path(name.as_str())
    }

    /// Looks `file_name` up in every directory registered under the store key.
    pub fn resolve(&self, file_name: &str) -> Option<PathBuf> {
        self.registry.resolve(&self.key, file_name)
    }

    /// Like [`resolve`](Self::resolve), but reports why nothing was found.
    ///
    /// # Errors
    /// See [`ModelFolderRegistry::try_resolve`].
    pub fn try_resolve(&self, file_name: &str) -> WeightResult<PathBuf> {
        self.registry.try_resolve(&self.key, file_name)
    }

    /// Weight files visible through the registry.
    pub fn list_weight_files(&self) -> Vec<String> {
        self.registry.list_filenames(&self.key)
    }
}
