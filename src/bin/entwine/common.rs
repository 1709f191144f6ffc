use tracing::Level;
use tracing_subscriber::{filter::Targets, prelude::*};

use entwine::cluster::{ClusterClient, Replication};

use crate::{ClusterConfig, LoggingConfig};

pub fn setup_tracing(config: &LoggingConfig) -> miette::Result<()> {
    let level = config
        .max_level
        .as_deref()
        .and_then(|raw| raw.parse::<Level>().ok())
        .unwrap_or(Level::INFO);

    let mut filter = Targets::new()
        .with_target("entwine", level)
        .with_target("entwine_core", level);

    if config.include_client {
        filter = filter.with_target("reqwest", level);
    }

    tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(level)
        .finish()
        .with(filter)
        .init();

    Ok(())
}

pub fn cluster_client(config: &ClusterConfig) -> (ClusterClient, Option<Replication>) {
    let replication = match (config.replication_min, config.replication_max) {
        (Some(min), Some(max)) => Some(Replication { min, max }),
        _ => None,
    };

    (ClusterClient::new(&config.api_url), replication)
}
