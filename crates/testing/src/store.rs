//! In-memory content-addressed store.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use entwine_core::{BlockData, BlockIndex, BlockSource, SourceError, Strand};

/// Deterministic mock content identifier.
pub fn mock_cid(bytes: &[u8]) -> String {
    format!("bafk{}", blake3::hash(bytes).to_hex())
}

/// Content-addressed block store living entirely in memory. Blocks are
/// keyed by [`mock_cid`] of their bytes, mirroring how the real store
/// derives identifiers from content.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    blocks: Arc<RwLock<HashMap<String, BlockData>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, bytes: BlockData) -> String {
        let cid = mock_cid(&bytes);
        self.blocks.write().unwrap().insert(cid.clone(), bytes);
        cid
    }

    pub fn get(&self, cid: &str) -> Option<BlockData> {
        self.blocks.read().unwrap().get(cid).cloned()
    }

    /// Drop a block, simulating loss in the store.
    pub fn remove(&self, cid: &str) {
        self.blocks.write().unwrap().remove(cid);
    }

    pub fn contains(&self, cid: &str) -> bool {
        self.blocks.read().unwrap().contains_key(cid)
    }

    pub fn len(&self) -> usize {
        self.blocks.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Block source resolving lattice indexes to [`MemoryStore`] lookups via
/// identifier maps, the same shape the real store adapter has.
#[derive(Debug, Clone)]
pub struct StoreBackedSource {
    store: MemoryStore,
    data_cids: Vec<String>,
    parity_cids: Vec<Vec<String>>,
}

impl StoreBackedSource {
    /// `data_cids` in lattice order; `parity_cids[k]` in left-index order.
    pub fn new(store: MemoryStore, data_cids: Vec<String>, parity_cids: Vec<Vec<String>>) -> Self {
        Self {
            store,
            data_cids,
            parity_cids,
        }
    }
}

impl BlockSource for StoreBackedSource {
    async fn data(&self, index: BlockIndex) -> Result<BlockData, SourceError> {
        self.data_cids
            .get(index as usize - 1)
            .and_then(|cid| self.store.get(cid))
            .ok_or(SourceError::DataNotAvailable(index))
    }

    async fn parity(&self, index: BlockIndex, strand: Strand) -> Result<BlockData, SourceError> {
        self.parity_cids
            .get(strand.index())
            .and_then(|cids| cids.get(index as usize - 1))
            .and_then(|cid| self.store.get(cid))
            .ok_or(SourceError::ParityNotAvailable { index, strand })
    }
}
