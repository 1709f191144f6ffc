use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::prelude::*;

/// Opaque content identifier assigned by the block store.
pub type Cid = String;

/// Metadata envelope persisted next to an entangled file.
///
/// The field names are wire-stable: envelopes written by earlier
/// deployments must keep parsing, so renames map the exact stored keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(rename = "Alpha")]
    pub alpha: usize,

    #[serde(rename = "S")]
    pub s: usize,

    #[serde(rename = "P")]
    pub p: usize,

    #[serde(rename = "RootCID")]
    pub root_cid: Cid,

    /// 1-based lattice index of every data block.
    #[serde(rename = "DataCIDIndexMap")]
    pub data_cid_index: HashMap<Cid, BlockIndex>,

    /// Per-strand parity identifiers, in left-index order.
    #[serde(rename = "ParityCIDs")]
    pub parity_cids: Vec<Vec<Cid>>,
}

impl Metadata {
    pub fn params(&self) -> Result<EntanglementParams, ParamError> {
        EntanglementParams::new(self.alpha, self.s, self.p)
    }

    /// Number of data blocks in the lattice.
    pub fn len(&self) -> usize {
        self.data_cid_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data_cid_index.is_empty()
    }

    /// Reverse of `data_cid_index`.
    pub fn index_to_cid(&self) -> HashMap<BlockIndex, Cid> {
        self.data_cid_index
            .iter()
            .map(|(cid, index)| (*index, cid.clone()))
            .collect()
    }

    pub fn to_json(&self) -> Result<Vec<u8>, Error> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, Error> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
