//! Block-source adapter over the content-addressed store.

use std::collections::HashMap;

use tracing::debug;

use crate::ipfs::IpfsClient;
use crate::model::{Cid, Metadata};
use crate::prelude::*;

/// Maps lattice coordinates to store fetches through the identifier maps of
/// a metadata envelope. Store failures surface as `NotAvailable` so the
/// recovery engine falls through to XOR reconstruction.
pub struct StoreSource {
    client: IpfsClient,
    data_cids: HashMap<BlockIndex, Cid>,
    parity_cids: Vec<Vec<Cid>>,
}

impl StoreSource {
    pub fn from_metadata(client: IpfsClient, metadata: &Metadata) -> Self {
        Self {
            client,
            data_cids: metadata.index_to_cid(),
            parity_cids: metadata.parity_cids.clone(),
        }
    }

    fn parity_cid(&self, index: BlockIndex, strand: Strand) -> Option<&Cid> {
        self.parity_cids
            .get(strand.index())?
            .get(index as usize - 1)
    }
}

impl BlockSource for StoreSource {
    async fn data(&self, index: BlockIndex) -> Result<BlockData, SourceError> {
        let cid = self
            .data_cids
            .get(&index)
            .ok_or(SourceError::DataNotAvailable(index))?;

        self.client.block_get(cid).await.map_err(|err| {
            debug!(index, %cid, %err, "data block fetch failed");
            SourceError::DataNotAvailable(index)
        })
    }

    async fn parity(&self, index: BlockIndex, strand: Strand) -> Result<BlockData, SourceError> {
        let cid = self
            .parity_cid(index, strand)
            .ok_or(SourceError::ParityNotAvailable { index, strand })?;

        self.client.block_get(cid).await.map_err(|err| {
            debug!(index, %strand, %cid, %err, "parity block fetch failed");
            SourceError::ParityNotAvailable { index, strand }
        })
    }
}
