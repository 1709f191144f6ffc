//! Thin client over the IPFS HTTP RPC.
//!
//! Only the handful of endpoints the coding pipeline needs: raw block get
//! and put, file add and cat, and link listing for the DAG walk. Every RPC
//! is a POST per the API convention.

use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::model::Cid;
use crate::prelude::Error;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:5001";

/// One link out of a DAG node.
#[derive(Debug, Clone)]
pub struct IpfsLink {
    pub cid: Cid,
    pub name: String,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct IpfsClient {
    http: reqwest::Client,
    base: String,
}

#[derive(Debug, Deserialize)]
struct BlockPutResponse {
    #[serde(rename = "Key")]
    key: String,
}

#[derive(Debug, Deserialize)]
struct AddResponse {
    #[serde(rename = "Hash")]
    hash: String,
}

#[derive(Debug, Deserialize)]
struct LsResponse {
    #[serde(rename = "Objects")]
    objects: Vec<LsObject>,
}

#[derive(Debug, Deserialize)]
struct LsObject {
    #[serde(rename = "Links", default)]
    links: Vec<LsLink>,
}

#[derive(Debug, Deserialize)]
struct LsLink {
    #[serde(rename = "Hash")]
    hash: String,
    #[serde(rename = "Name", default)]
    name: String,
    #[serde(rename = "Size", default)]
    size: u64,
}

impl IpfsClient {
    pub fn new(api_url: impl Into<String>) -> Self {
        let base = api_url.into().trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            base,
        }
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/api/v0/{}", self.base, method)
    }

    /// Raw bytes of a single block.
    pub async fn block_get(&self, cid: &str) -> Result<Vec<u8>, Error> {
        let response = self
            .http
            .post(self.endpoint("block/get"))
            .query(&[("arg", cid)])
            .send()
            .await
            .map_err(Error::client)?
            .error_for_status()
            .map_err(Error::client)?;

        Ok(response.bytes().await.map_err(Error::client)?.to_vec())
    }

    /// Store raw bytes as a single block, returning its identifier.
    pub async fn block_put(&self, bytes: Vec<u8>) -> Result<Cid, Error> {
        let part = reqwest::multipart::Part::bytes(bytes).file_name("block");
        let form = reqwest::multipart::Form::new().part("data", part);

        let response: BlockPutResponse = self
            .http
            .post(self.endpoint("block/put"))
            .multipart(form)
            .send()
            .await
            .map_err(Error::client)?
            .error_for_status()
            .map_err(Error::client)?
            .json()
            .await
            .map_err(Error::client)?;

        Ok(response.key)
    }

    /// Whole-file bytes, reassembled by the store.
    pub async fn cat(&self, cid: &str) -> Result<Vec<u8>, Error> {
        let response = self
            .http
            .post(self.endpoint("cat"))
            .query(&[("arg", cid)])
            .send()
            .await
            .map_err(Error::client)?
            .error_for_status()
            .map_err(Error::client)?;

        Ok(response.bytes().await.map_err(Error::client)?.to_vec())
    }

    pub async fn get_file(&self, cid: &str, path: &Path) -> Result<(), Error> {
        let bytes = self.cat(cid).await?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    pub async fn add_file(&self, path: &Path) -> Result<Cid, Error> {
        let bytes = std::fs::read(path)?;
        self.add_bytes(bytes).await
    }

    /// Add a file to the store, returning the root identifier.
    pub async fn add_bytes(&self, bytes: Vec<u8>) -> Result<Cid, Error> {
        let part = reqwest::multipart::Part::bytes(bytes).file_name("file");
        let form = reqwest::multipart::Form::new().part("file", part);

        let response: AddResponse = self
            .http
            .post(self.endpoint("add"))
            .query(&[("pin", "true")])
            .multipart(form)
            .send()
            .await
            .map_err(Error::client)?
            .error_for_status()
            .map_err(Error::client)?
            .json()
            .await
            .map_err(Error::client)?;

        Ok(response.hash)
    }

    /// Children of a DAG node, in link order.
    pub async fn links(&self, cid: &str) -> Result<Vec<IpfsLink>, Error> {
        let response: LsResponse = self
            .http
            .post(self.endpoint("ls"))
            .query(&[("arg", cid)])
            .send()
            .await
            .map_err(Error::client)?
            .error_for_status()
            .map_err(Error::client)?
            .json()
            .await
            .map_err(Error::client)?;

        let links = response
            .objects
            .into_iter()
            .flat_map(|object| object.links)
            .map(|link| IpfsLink {
                cid: link.hash,
                name: link.name,
                size: link.size,
            })
            .collect::<Vec<_>>();

        debug!(cid, count = links.len(), "listed links");
        Ok(links)
    }
}
