//! Pinning through the IPFS-cluster REST API.

use serde::Serialize;
use tracing::info;

use crate::model::Cid;
use crate::prelude::Error;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:9094";

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Replication {
    #[serde(rename = "replication-min")]
    pub min: i64,
    #[serde(rename = "replication-max")]
    pub max: i64,
}

#[derive(Debug, Clone)]
pub struct ClusterClient {
    http: reqwest::Client,
    base: String,
}

impl ClusterClient {
    pub fn new(api_url: impl Into<String>) -> Self {
        let base = api_url.into().trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            base,
        }
    }

    /// Pin a block across the cluster. `None` keeps the cluster's default
    /// replication factor.
    pub async fn pin(&self, cid: &Cid, replication: Option<Replication>) -> Result<(), Error> {
        let mut request = self.http.post(format!("{}/pins/{}", self.base, cid));
        if let Some(replication) = replication {
            request = request.query(&replication);
        }

        request
            .send()
            .await
            .map_err(Error::client)?
            .error_for_status()
            .map_err(Error::client)?;

        info!(%cid, "pinned");
        Ok(())
    }
}
