use std::path::PathBuf;

use anyhow::{Context, Result};
use birefnet_nodes::{
    default_models_dir, node_schemas,
    weights::{ModelFolderRegistry, ModelName},
    DevicePreference, NodeConfig, NodeContext, ResolveDevice, SelectedBackend, BACKEND_NAME,
};
use burn::config::Config;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "birefnet-nodes")]
#[command(about = "Host harness for the BiRefNet background removal nodes")]
struct Cli {
    /// Node configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Root models directory; overrides the configuration file
    #[arg(long, global = true)]
    models_dir: Option<PathBuf>,

    /// Additional directory searched for BiRefNet weights (repeatable)
    #[arg(long = "extra-model-path", global = true)]
    extra_model_paths: Vec<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the node schemas as JSON
    Schema,

    /// List pretrained models and the weight files on disk
    Models,

    /// Download the weights of a pretrained model if they are missing
    Fetch {
        /// Pretrained model name (e.g. "General", "General-Lite", "Portrait")
        model_name: String,
    },

    /// Show backend information
    Info,
}

fn load_config(cli: &Cli) -> Result<NodeConfig> {
    let mut config = match &cli.config {
        Some(path) => NodeConfig::load(path)
            .with_context(|| format!("failed to read config {}", path.display()))?,
        None => NodeConfig::new(default_models_dir()),
    };

    if let Some(models_dir) = &cli.models_dir {
        config.models_dir = models_dir.clone();
    }
    config
        .extra_model_paths
        .extend(cli.extra_model_paths.iter().cloned());

    Ok(config)
}

fn open_context(cli: &Cli) -> Result<NodeContext> {
    let config = load_config(cli)?;
    NodeContext::from_config(config, ModelFolderRegistry::new())
        .context("failed to open the BiRefNet model folder")
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Schema => {
            let ctx = open_context(&cli)?;
            println!("{}", serde_json::to_string_pretty(&node_schemas(&ctx))?);
        }

        Commands::Models => {
            let ctx = open_context(&cli)?;
            let owner = &ctx.config().repo_owner;
            println!("Pretrained models ({}):", ctx.store().root().display());
            for name in ModelName::ALL {
                let status = if ctx.store().resolve(&name.weights_file_name()).is_some() {
                    "downloaded"
                } else {
                    "missing"
                };
                let repo = format!("{owner}/{}", name.weights_repo());
                println!("  {:<12} {repo:<36} {status}", name.as_str());
            }

            println!("Weight files:");
            for file in ctx.store().list_weight_files() {
                println!("  {file}");
            }
        }

        Commands::Fetch { model_name } => {
            let ctx = open_context(&cli)?;
            let path = ctx
                .fetcher()
                .ensure_downloaded(model_name)
                .with_context(|| format!("failed to fetch '{model_name}'"))?;
            println!("{}", path.display());
        }

        Commands::Info => {
            println!("BiRefNet Nodes Information:");
            println!("  Backend: {BACKEND_NAME}");
            for preference in DevicePreference::ALL {
                match SelectedBackend::resolve_device(preference) {
                    Ok(device) => println!("  {preference}: {device:?}"),
                    Err(error) => println!("  {preference}: unavailable ({error})"),
                }
            }
        }
    }

    Ok(())
}
