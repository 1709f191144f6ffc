use std::path::{Path, PathBuf};

use clap::Parser;
use miette::{IntoDiagnostic, Result};
use serde::Deserialize;

mod common;
mod download;
mod feedback;
mod perf;
mod upload;

#[derive(Debug, Parser)]
#[clap(name = "Entwine")]
#[clap(bin_name = "entwine")]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Path to a config file; defaults to entwine.toml when present
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// Upload a file and its entanglement to the store
    Upload(upload::Args),
    /// Download a file, repairing missing blocks when metadata is given
    Download(download::Args),
    /// In-memory recovery microbenchmark
    Perf(perf::Args),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IpfsConfig {
    pub api_url: String,
}

impl Default for IpfsConfig {
    fn default() -> Self {
        Self {
            api_url: entwine::ipfs::DEFAULT_API_URL.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub api_url: String,
    pub replication_min: Option<i64>,
    pub replication_max: Option<i64>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            api_url: entwine::cluster::DEFAULT_API_URL.into(),
            replication_min: None,
            replication_max: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub max_level: Option<String>,
    pub include_client: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ipfs: IpfsConfig,
    pub cluster: Option<ClusterConfig>,
    pub logging: LoggingConfig,
}

impl Config {
    fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        builder = match explicit {
            Some(path) => builder.add_source(config::File::from(path)),
            None => builder.add_source(config::File::with_name("entwine").required(false)),
        };

        builder = builder.add_source(config::Environment::with_prefix("ENTWINE").separator("__"));

        builder
            .build()
            .into_diagnostic()?
            .try_deserialize()
            .into_diagnostic()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;
    common::setup_tracing(&config.logging)?;

    match cli.command {
        Command::Upload(args) => upload::run(&config, &args).await?,
        Command::Download(args) => download::run(&config, &args).await?,
        Command::Perf(args) => perf::run(&config, &args).await?,
    };

    Ok(())
}
