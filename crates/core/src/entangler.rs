//! Streaming producer of parity strands.
//!
//! The entangler consumes data blocks in lattice order and emits one parity
//! record per strand per block. The first parity of every chain is held back
//! until the wrap pass closes the chain, otherwise the on-disk sequence
//! would differ from what the lattice reconstructs.

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use crate::geometry::Geometry;
use crate::xor::xor_bytes;
use crate::{BlockData, BlockIndex, EntanglementParams, ParamError, Strand};

/// A parity block joining two data blocks on one strand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntangledBlock {
    pub strand: Strand,
    pub left: BlockIndex,
    pub right: BlockIndex,
    pub bytes: BlockData,
}

#[derive(Debug, Error)]
pub enum EntangleError {
    #[error(transparent)]
    InvalidParameters(#[from] ParamError),

    #[error("parity consumer dropped before the stream completed")]
    PartialEntanglement,
}

/// Streaming entanglement state machine.
///
/// Feed blocks in order with [`push`](Self::push), then close every chain
/// with [`finish`](Self::finish). `push` and `finish` together emit exactly
/// `alpha * len` parity records.
pub struct Entangler {
    geometry: Geometry,
    alpha: usize,
    /// One row per strand; each slot holds the latest parity of its chain.
    caches: Vec<Vec<Option<EntangledBlock>>>,
    /// Payloads of the first `max_period` blocks, kept for the wrap pass.
    chain_start_data: Vec<BlockData>,
    /// Held-back first parity of each chain, keyed by chain start index - 1.
    to_wrap: Vec<Vec<Option<EntangledBlock>>>,
    max_period: usize,
    count: i64,
}

impl Entangler {
    pub fn new(params: EntanglementParams) -> Result<Self, ParamError> {
        params.validate()?;

        let caches = Strand::take(params.alpha)
            .map(|strand| vec![None; params.cache_width(strand)])
            .collect();
        let max_period = params.s.max(params.p);

        Ok(Self {
            geometry: Geometry::new(params),
            alpha: params.alpha,
            caches,
            chain_start_data: Vec::with_capacity(max_period),
            to_wrap: vec![vec![None; max_period]; params.alpha],
            max_period,
            count: 0,
        })
    }

    /// Number of data blocks consumed so far.
    pub fn len(&self) -> usize {
        self.count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Feed the next data block. Returns the parity records that become
    /// final with this step; the first parity of each chain stays held back
    /// for the wrap pass.
    pub fn push(&mut self, data: BlockData) -> Vec<EntangledBlock> {
        self.count += 1;
        let index = self.count;

        let slots = self.geometry.chain_indexes(index);
        let forward = self.geometry.forward_neighbors(index);
        let starts = self.geometry.chain_start_indexes(index);

        let mut emitted = Vec::new();
        for k in 0..self.alpha {
            let previous = self.caches[k][slots[k]]
                .as_ref()
                .map(|parity| parity.bytes.as_slice())
                .unwrap_or(&[]);

            let parity = EntangledBlock {
                strand: Strand::ALL[k],
                left: index,
                right: forward[k],
                bytes: xor_bytes(&data, previous),
            };

            if starts[k] == index {
                self.to_wrap[k][(index - 1) as usize] = Some(parity.clone());
            } else {
                emitted.push(parity.clone());
            }
            self.caches[k][slots[k]] = Some(parity);
        }

        if index as usize <= self.max_period {
            self.chain_start_data.push(data);
        }

        emitted
    }

    /// Wrap pass: retarget the last parity of every chain back to its chain
    /// start, recompute the chain's first parity against that wrap edge and
    /// flush all held-back records.
    pub fn finish(mut self) -> Vec<EntangledBlock> {
        let len = self.count;
        let mut emitted = Vec::new();

        for k in 0..self.alpha {
            for slot in 0..self.caches[k].len() {
                let Some(mut cached) = self.caches[k][slot].take() else {
                    continue;
                };

                // Close the cycle: the last parity of the chain points back
                // at the chain start.
                let start = self.geometry.chain_start_indexes(cached.right)[k];
                cached.right = start;

                let forward = self.geometry.forward_neighbors(start)[k];
                let held = &mut self.to_wrap[k][(start - 1) as usize];

                if self.geometry.is_valid(forward, len) {
                    // Fold the wrap edge into the chain's first parity.
                    *held = Some(EntangledBlock {
                        strand: cached.strand,
                        left: start,
                        right: forward,
                        bytes: xor_bytes(
                            &self.chain_start_data[(start - 1) as usize],
                            &cached.bytes,
                        ),
                    });
                } else if let Some(first) = held.as_mut() {
                    // Single-block chain: the held-back parity closes on
                    // itself.
                    first.right = start;
                }

                if let Some(first) = held.take() {
                    emitted.push(first);
                }
            }
        }

        debug!(blocks = len, parities = emitted.len(), "lattice wrapped");
        emitted
    }

    /// Channel driver: consume an ordered, finite stream of data blocks and
    /// send every parity record to `output`. End of stream is signaled by
    /// the input side closing; the output side closing early aborts the run.
    pub async fn run(
        params: EntanglementParams,
        mut input: mpsc::Receiver<BlockData>,
        output: mpsc::Sender<EntangledBlock>,
    ) -> Result<usize, EntangleError> {
        let mut entangler = Entangler::new(params)?;

        while let Some(block) = input.recv().await {
            for parity in entangler.push(block) {
                output
                    .send(parity)
                    .await
                    .map_err(|_| EntangleError::PartialEntanglement)?;
            }
        }

        let len = entangler.len();
        for parity in entangler.finish() {
            output
                .send(parity)
                .await
                .map_err(|_| EntangleError::PartialEntanglement)?;
        }

        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;

    fn blocks(n: usize) -> Vec<BlockData> {
        (0..n).map(|i| vec![i as u8 + 1; 16]).collect()
    }

    fn entangle_all(params: EntanglementParams, blocks: Vec<BlockData>) -> Vec<EntangledBlock> {
        let mut entangler = Entangler::new(params).unwrap();
        let mut out = Vec::new();
        for block in blocks {
            out.extend(entangler.push(block));
        }
        out.extend(entangler.finish());
        out
    }

    #[test]
    fn emits_alpha_parities_per_block() {
        let params = EntanglementParams::new(3, 5, 5).unwrap();
        let emitted = entangle_all(params, blocks(21));
        assert_eq!(emitted.len(), 3 * 21);
    }

    #[test]
    fn left_indexes_form_a_permutation_per_strand() {
        let params = EntanglementParams::new(3, 5, 5).unwrap();
        let emitted = entangle_all(params, blocks(21));

        for strand in Strand::take(3) {
            let lefts: Vec<_> = emitted
                .iter()
                .filter(|parity| parity.strand == strand)
                .map(|parity| parity.left)
                .sorted()
                .collect();
            assert_eq!(lefts, (1..=21).collect::<Vec<_>>());
        }
    }

    #[test]
    fn first_parity_of_each_chain_is_held_back() {
        let params = EntanglementParams::new(3, 5, 5).unwrap();
        let mut entangler = Entangler::new(params).unwrap();

        // Block 1 starts a chain on every strand, so nothing is emittable.
        assert!(entangler.push(vec![1; 16]).is_empty());
        // Block 2 starts the horizontal chain h=1 and the helical chains
        // through the second column; with s = p = 5 all three are fresh.
        assert!(entangler.push(vec![2; 16]).is_empty());
    }

    #[test]
    fn chain_parity_is_the_running_xor() {
        // Linear code: parity i must be the XOR prefix of blocks 1..=i,
        // except the wrapped first parity which closes the single chain.
        let params = EntanglementParams::new(1, 1, 0).unwrap();
        let data = blocks(4);
        let emitted = entangle_all(params, data.clone());
        assert_eq!(emitted.len(), 4);

        let mut prefix = Vec::new();
        let mut expected = Vec::new();
        for block in &data {
            prefix = xor_bytes(&prefix, block);
            expected.push(prefix.clone());
        }

        for parity in &emitted {
            if parity.left == 1 {
                // First chain parity after the wrap: data 1 folded with the
                // whole-chain XOR.
                assert_eq!(parity.right, 2);
                assert_eq!(parity.bytes, xor_bytes(&data[0], &expected[3]));
            } else {
                assert_eq!(parity.bytes, expected[(parity.left - 1) as usize]);
            }
        }
    }

    #[test]
    fn wrap_retargets_single_block_chain_to_itself() {
        let params = EntanglementParams::new(1, 1, 0).unwrap();
        let emitted = entangle_all(params, blocks(1));
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].left, 1);
        assert_eq!(emitted[0].right, 1);
        assert_eq!(emitted[0].bytes, vec![1; 16]);
    }

    #[tokio::test]
    async fn channel_driver_reports_partial_entanglement() {
        let params = EntanglementParams::new(3, 5, 5).unwrap();
        let (block_tx, block_rx) = mpsc::channel(8);
        let (parity_tx, parity_rx) = mpsc::channel(1);

        // A consumer that is already gone must abort the producer at its
        // first emission.
        drop(parity_rx);
        let driver = tokio::spawn(Entangler::run(params, block_rx, parity_tx));

        for block in blocks(21) {
            if block_tx.send(block).await.is_err() {
                break;
            }
        }
        drop(block_tx);

        let err = driver.await.unwrap().unwrap_err();
        assert!(matches!(err, EntangleError::PartialEntanglement));
    }

    #[tokio::test]
    async fn channel_driver_streams_all_parities() {
        let params = EntanglementParams::new(3, 5, 5).unwrap();
        let (block_tx, block_rx) = mpsc::channel(8);
        let (parity_tx, mut parity_rx) = mpsc::channel(256);

        let driver = tokio::spawn(Entangler::run(params, block_rx, parity_tx));
        for block in blocks(21) {
            block_tx.send(block).await.unwrap();
        }
        drop(block_tx);

        let mut received = Vec::new();
        while let Some(parity) = parity_rx.recv().await {
            received.push(parity);
        }

        assert_eq!(driver.await.unwrap().unwrap(), 21);
        assert_eq!(received.len(), 3 * 21);
    }
}
