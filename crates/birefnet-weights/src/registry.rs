//! # Model Folder Registry
//!
//! The host runtime keeps a table of searchable model folders keyed by a
//! well-known name. Each entry holds an ordered list of directories and the
//! file extensions that count as model files. The registry here is a plain
//! value owned by whoever hosts the nodes, so it can be built and inspected in
//! isolation instead of living in process-wide state.

use std::{
    collections::{BTreeSet, HashMap},
    path::{Component, Path, PathBuf},
};

use walkdir::WalkDir;

use crate::error::{WeightError, WeightResult};

#[derive(Debug, Clone, Default)]
struct ModelFolder {
    paths: Vec<PathBuf>,
    /// Lower-case extensions without the leading dot. Empty accepts everything.
    extensions: BTreeSet<String>,
}

impl ModelFolder {
    fn accepts(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.contains(&ext.to_ascii_lowercase()))
    }
}

/// Searchable model folders keyed by name.
#[derive(Debug, Clone, Default)]
pub struct ModelFolderRegistry {
    folders: HashMap<String, ModelFolder>,
}

impl ModelFolderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if a folder is registered under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.folders.contains_key(key)
    }

    /// Registers `key` with the given directories and extensions, replacing any
    /// previous registration.
    pub fn register_folder<P, E>(
        &mut self,
        key: impl Into<String>,
        paths: impl IntoIterator<Item = P>,
        extensions: impl IntoIterator<Item = E>,
    ) where
        P: Into<PathBuf>,
        E: AsRef<str>,
    {
        let folder = ModelFolder {
            paths: paths.into_iter().map(Into::into).collect(),
            extensions: extensions
                .into_iter()
                .map(|ext| normalize_extension(ext.as_ref()))
                .collect(),
        };
        self.folders.insert(key.into(), folder);
    }

    /// Appends `path` to the directories registered under `key`.
    ///
    /// An unknown key is registered with no extension filter. A path that is
    /// already present is left where it is.
    pub fn add_path(&mut self, key: &str, path: impl Into<PathBuf>) {
        let path = path.into();
        let folder = self.folders.entry(key.to_owned()).or_default();
        if !folder.paths.contains(&path) {
            folder.paths.push(path);
        }
    }

    /// Directories registered under `key`, in search order.
    ///
    /// # Errors
    /// Returns `WeightError::UnknownFolderKey` if nothing is registered under `key`.
    pub fn folder_paths(&self, key: &str) -> WeightResult<&[PathBuf]> {
        self.folders
            .get(key)
            .map(|folder| folder.paths.as_slice())
            .ok_or_else(|| WeightError::UnknownFolderKey {
                key: key.to_owned(),
            })
    }

    /// Finds `file_name` in the directories registered under `key`.
    ///
    /// Directories are searched in registration order and the first existing
    /// file wins.
    ///
    /// # Errors
    /// Fails if the key is unknown, the name is absolute or climbs out of the
    /// folder, or no registered directory contains the file.
    pub fn try_resolve(&self, key: &str, file_name: &str) -> WeightResult<PathBuf> {
        let folder = self
            .folders
            .get(key)
            .ok_or_else(|| WeightError::UnknownFolderKey {
                key: key.to_owned(),
            })?;

        let relative = Path::new(file_name);
        let is_plain = !file_name.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !is_plain {
            return Err(WeightError::InvalidFileName {
                file_name: file_name.to_owned(),
            });
        }

        folder
            .paths
            .iter()
            .map(|dir| dir.join(relative))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| WeightError::WeightNotFound {
                key: key.to_owned(),
                file_name: file_name.to_owned(),
            })
    }

    /// Like [`try_resolve`](Self::try_resolve), but collapses every failure to `None`.
    pub fn resolve(&self, key: &str, file_name: &str) -> Option<PathBuf> {
        self.try_resolve(key, file_name).ok()
    }

    /// Lists model files below the directories registered under `key`.
    ///
    /// Names are relative to their directory, use `/` as separator, are sorted
    /// and appear once even if several directories hold the same name.
    pub fn list_filenames(&self, key: &str) -> Vec<String> {
        let Some(folder) = self.folders.get(key) else {
            return Vec::new();
        };

        let mut names = BTreeSet::new();
        for root in &folder.paths {
            let files = WalkDir::new(root)
                .follow_links(true)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|entry| entry.file_type().is_file());

            for entry in files {
                if !folder.accepts(entry.path()) {
                    continue;
                }
                let Ok(relative) = entry.path().strip_prefix(root) else {
                    continue;
                };
                let name = relative
                    .components()
                    .map(|component| component.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                names.insert(name);
            }
        }

        names.into_iter().collect()
    }
}

fn normalize_extension(extension: &str) -> String {
    extension.trim_start_matches('.').to_ascii_lowercase()
}
