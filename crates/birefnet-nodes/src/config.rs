//! Node configuration.

use std::path::PathBuf;

use birefnet_weights::{
    DEFAULT_ENDPOINT, DEFAULT_FOLDER_KEY, DEFAULT_FOLDER_NAME, DEFAULT_REPO_OWNER,
};
use burn::config::Config;

use crate::inference::DEFAULT_INPUT_SIZE;

/// Settings shared by every node instance.
#[derive(Config, Debug)]
pub struct NodeConfig {
    /// Root models directory; BiRefNet weights live in `folder_name` below it.
    pub models_dir: PathBuf,
    /// Registry key of the BiRefNet folder.
    #[config(default = "String::from(DEFAULT_FOLDER_KEY)")]
    pub folder_key: String,
    #[config(default = "String::from(DEFAULT_FOLDER_NAME)")]
    pub folder_name: String,
    /// Extra directories searched before the default folder.
    #[config(default = "Vec::new()")]
    pub extra_model_paths: Vec<PathBuf>,
    /// HuggingFace endpoint or mirror weights are downloaded from.
    #[config(default = "String::from(DEFAULT_ENDPOINT)")]
    pub endpoint: String,
    #[config(default = "String::from(DEFAULT_REPO_OWNER)")]
    pub repo_owner: String,
    /// Square resolution images are resized to before the forward pass.
    #[config(default = "DEFAULT_INPUT_SIZE")]
    pub input_size: usize,
}

/// `<data dir>/birefnet-nodes/models`, or `./models` when the platform has no data dir.
pub fn default_models_dir() -> PathBuf {
    dirs::data_dir().map_or_else(
        || PathBuf::from("models"),
        |dir| dir.join("birefnet-nodes").join("models"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_published_layout() {
        let config = NodeConfig::new(PathBuf::from("/models"));

        assert_eq!(config.folder_key, "birefnet");
        assert_eq!(config.folder_name, "BiRefNet");
        assert_eq!(config.endpoint, "https://huggingface.co");
        assert_eq!(config.repo_owner, "ZhengPeng7");
        assert_eq!(config.input_size, 1024);
        assert!(config.extra_model_paths.is_empty());
    }

    #[test]
    fn config_round_trips_through_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nodes.json");
        let config = NodeConfig::new(dir.path().join("models"))
            .with_endpoint("https://hf-mirror.example".to_string())
            .with_input_size(512);

        config.save(&path).unwrap();
        let loaded = NodeConfig::load(&path).unwrap();

        assert_eq!(loaded.models_dir, dir.path().join("models"));
        assert_eq!(loaded.endpoint, "https://hf-mirror.example");
        assert_eq!(loaded.input_size, 512);
    }
}
