//! Synthetic entangled files.

use rand::{Rng, SeedableRng};

use entwine_core::{BlockData, EntangledBlock, EntanglementParams, Entangler};

use crate::store::{MemoryStore, StoreBackedSource};

/// Seeded random data blocks.
pub fn random_blocks(count: usize, size: usize, seed: u64) -> Vec<BlockData> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let mut block = vec![0u8; size];
            rng.fill(block.as_mut_slice());
            block
        })
        .collect()
}

/// Run the full entanglement over a batch of blocks.
pub fn entangle(params: EntanglementParams, blocks: &[BlockData]) -> Vec<EntangledBlock> {
    let mut entangler = Entangler::new(params).expect("valid parameters");
    let mut parities = Vec::with_capacity(params.alpha * blocks.len());
    for block in blocks {
        parities.extend(entangler.push(block.clone()));
    }
    parities.extend(entangler.finish());
    parities
}

/// A fully uploaded entangled file: every data and parity block stored,
/// with the identifier maps a metadata envelope would carry.
pub struct SeededFile {
    pub store: MemoryStore,
    pub data_cids: Vec<String>,
    pub parity_cids: Vec<Vec<String>>,
}

impl SeededFile {
    pub fn source(&self) -> StoreBackedSource {
        StoreBackedSource::new(
            self.store.clone(),
            self.data_cids.clone(),
            self.parity_cids.clone(),
        )
    }

    /// Drop data blocks from the store, 1-based indexes.
    pub fn drop_data(&self, indexes: impl IntoIterator<Item = usize>) {
        for index in indexes {
            self.store.remove(&self.data_cids[index - 1]);
        }
    }

    /// Drop parity blocks from the store, 1-based left indexes.
    pub fn drop_parity(&self, strand: usize, indexes: impl IntoIterator<Item = usize>) {
        for index in indexes {
            self.store.remove(&self.parity_cids[strand][index - 1]);
        }
    }
}

/// Entangle `blocks` and store everything, as an upload would.
pub fn seed_entangled_file(params: EntanglementParams, blocks: &[BlockData]) -> SeededFile {
    let store = MemoryStore::new();

    let data_cids: Vec<String> = blocks.iter().map(|block| store.put(block.clone())).collect();

    let mut parity_cids = vec![vec![String::new(); blocks.len()]; params.alpha];
    for parity in entangle(params, blocks) {
        parity_cids[parity.strand.index()][parity.left as usize - 1] = store.put(parity.bytes);
    }

    SeededFile {
        store,
        data_cids,
        parity_cids,
    }
}
