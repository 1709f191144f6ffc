//! Hybrid sequential/parallel recovery over the block graph.
//!
//! Every top-level request walks the graph from the cell it wants: fetch
//! first, then chase recovery pairs. A bounded-depth sequential walk runs
//! first; only when it comes back empty does the engine fan out into
//! parallel tasks with a cancellation scope, where the first pair to
//! produce both operands wins.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::block::{BlockNode, CellId};
use crate::lattice::{Chunk, LatticeGraph};
use crate::source::{BlockSource, SourceError};
use crate::{BlockData, BlockIndex, RequestId};

#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("index {0} is outside the lattice")]
    OutOfRange(BlockIndex),

    #[error("failed to recover data block {index}: no recovery pair yields both operands")]
    Exhausted { index: BlockIndex },

    #[error("recovery request cancelled")]
    Cancelled,
}

/// State shared by every task of one recovery request.
pub(crate) struct RepairRun<S> {
    graph: Arc<LatticeGraph>,
    source: Arc<S>,
    request: RequestId,
    switch_depth: usize,
    cancel: CancellationToken,
}

impl<S: BlockSource> RepairRun<S> {
    pub(crate) fn new(
        graph: Arc<LatticeGraph>,
        source: Arc<S>,
        request: RequestId,
        switch_depth: usize,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            graph,
            source,
            request,
            switch_depth,
            cancel,
        })
    }

    /// Derive the run for a nested cancellation scope.
    fn scoped(&self, cancel: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            graph: self.graph.clone(),
            source: self.source.clone(),
            request: self.request,
            switch_depth: self.switch_depth,
            cancel,
        })
    }

    /// Drive one top-level request for a data cell to completion.
    pub(crate) async fn get(self: Arc<Self>, cell: CellId) -> Result<Chunk, RecoveryError> {
        self.clone().solve_sequential(cell, self.switch_depth).await;

        if !self.graph.cell(cell).is_available() {
            debug!(
                index = self.graph.cell(cell).index(),
                request = self.request,
                "sequential recovery exhausted, going parallel"
            );
            self.clone().solve_parallel(cell).await;
        }

        // Reap any stragglers of the parallel phase.
        let cancelled = self.cancel.is_cancelled();
        self.cancel.cancel();

        let node = self.graph.cell(cell);
        match node.data() {
            Ok(bytes) => Ok(Chunk {
                bytes,
                repaired: node.repaired(),
            }),
            Err(_) if cancelled => Err(RecoveryError::Cancelled),
            Err(_) => Err(RecoveryError::Exhausted {
                index: node.index(),
            }),
        }
    }

    async fn fetch(&self, node: &BlockNode) -> Result<BlockData, SourceError> {
        match node.strand() {
            None => self.source.data(node.index()).await,
            Some(strand) => self.source.parity(node.index(), strand).await,
        }
    }

    /// Depth-bounded recursive walk. Pairs are tried in declaration order;
    /// each operand is materialized in turn before the XOR.
    fn solve_sequential(self: Arc<Self>, cell: CellId, depth: usize) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let this = self;
            let node = this.graph.cell(cell);
            if !node.start_repair(&this.cancel, this.request).await {
                return;
            }

            match this.fetch(node).await {
                Ok(bytes) => {
                    node.install(bytes, false);
                    node.finish_repair(true);
                    return;
                }
                Err(err) => {
                    debug!(index = node.index(), parity = node.is_parity(), %err, "fetch failed");
                }
            }

            if depth == 0 {
                node.finish_repair(false);
                return;
            }

            for pair in this.graph.recover_pairs(cell) {
                if pair.left == pair.right {
                    // Self-wrap: the single operand holds this cell's bytes.
                    this.clone().solve_sequential(pair.left, depth - 1).await;
                    if let Ok(bytes) = this.graph.cell(pair.left).data() {
                        node.install(bytes, true);
                        node.finish_repair(true);
                        return;
                    }
                    continue;
                }

                this.clone().solve_sequential(pair.left, depth - 1).await;
                let Ok(left) = this.graph.cell(pair.left).data() else {
                    continue;
                };

                this.clone().solve_sequential(pair.right, depth - 1).await;
                let Ok(right) = this.graph.cell(pair.right).data() else {
                    continue;
                };

                if node.recover(&left, &right).is_ok() {
                    node.finish_repair(true);
                    return;
                }
            }

            node.finish_repair(false);
        })
    }

    /// Parallel walk: one task per recovery pair, operands solved as
    /// concurrent child tasks. The first pair producing both operands wins
    /// and trips the scope shared by its siblings.
    fn solve_parallel(self: Arc<Self>, cell: CellId) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let this = self;
            let node = this.graph.cell(cell);
            if !node.start_repair(&this.cancel, this.request).await {
                return;
            }

            match this.fetch(node).await {
                Ok(bytes) => {
                    node.install(bytes, false);
                    node.finish_repair(true);
                    return;
                }
                Err(err) => {
                    debug!(index = node.index(), parity = node.is_parity(), %err, "fetch failed");
                }
            }

            let scope = this.cancel.child_token();
            let mut attempts: JoinSet<Option<(BlockData, Option<BlockData>)>> = JoinSet::new();

            for pair in this.graph.recover_pairs(cell) {
                let pair = *pair;
                let run = this.scoped(scope.clone());

                attempts.spawn(async move {
                    if pair.left == pair.right {
                        run.clone().solve_parallel(pair.left).await;
                        let bytes = run.graph.cell(pair.left).data().ok()?;
                        return Some((bytes, None));
                    }

                    let left_task = tokio::spawn({
                        let run = run.clone();
                        async move { run.solve_parallel(pair.left).await }
                    });
                    let right_task = tokio::spawn({
                        let run = run.clone();
                        async move { run.solve_parallel(pair.right).await }
                    });
                    let _ = left_task.await;
                    let _ = right_task.await;

                    let left = run.graph.cell(pair.left).data().ok()?;
                    let right = run.graph.cell(pair.right).data().ok()?;
                    Some((left, Some(right)))
                });
            }

            let mut recovered = false;
            while let Some(outcome) = attempts.join_next().await {
                let Ok(Some((left, right))) = outcome else {
                    continue;
                };

                recovered = match right {
                    Some(right) => node.recover(&left, &right).is_ok(),
                    // Self-wrap: install the single operand directly.
                    None => {
                        node.install(left, true);
                        true
                    }
                };

                if recovered {
                    break;
                }
            }

            // Trip the scope, then let the losing tasks unwind on their
            // own; aborting them could strand cells in RepairPending.
            scope.cancel();
            while attempts.join_next().await.is_some() {}

            node.finish_repair(recovered);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::Lattice;
    use crate::source::{FilteredSource, MemorySource};
    use crate::{EntanglementParams, Entangler, Strand};

    fn blocks(n: usize, size: usize) -> Vec<BlockData> {
        (0..n)
            .map(|i| {
                (0..size)
                    .map(|j| (i * 31 + j * 7 + 1) as u8)
                    .collect::<Vec<u8>>()
            })
            .collect()
    }

    fn entangle(params: EntanglementParams, data: &[BlockData]) -> MemorySource {
        let mut entangler = Entangler::new(params).unwrap();
        let mut parities = Vec::new();
        for block in data {
            parities.extend(entangler.push(block.clone()));
        }
        parities.extend(entangler.finish());
        MemorySource::load(data.to_vec(), parities)
    }

    #[tokio::test]
    async fn round_trip_without_loss() {
        let params = EntanglementParams::new(3, 5, 5).unwrap();
        let data = blocks(21, 64);
        let source = entangle(params, &data);

        let lattice = Lattice::new(params, 21, source).unwrap();
        let (recovered, repaired) = lattice.get_all_data().await.unwrap();

        assert_eq!(recovered, data);
        assert!(!repaired);
    }

    #[tokio::test]
    async fn single_data_loss_is_repaired() {
        let params = EntanglementParams::new(3, 5, 5).unwrap();
        let data = blocks(21, 64);
        let source = FilteredSource::new(entangle(params, &data)).without_data([13]);

        let lattice = Lattice::new(params, 21, source).unwrap();

        let chunk = lattice.get_chunk(13).await.unwrap();
        assert_eq!(chunk.bytes, data[12]);
        assert!(chunk.repaired);

        let chunk = lattice.get_chunk(14).await.unwrap();
        assert!(!chunk.repaired);
    }

    #[tokio::test]
    async fn full_data_loss_recovers_from_parities() {
        let params = EntanglementParams::new(3, 5, 5).unwrap();
        let data = blocks(21, 64);
        let source = FilteredSource::new(entangle(params, &data)).without_data(1..=21);

        let lattice = Lattice::new(params, 21, source).unwrap();
        let (recovered, repaired) = lattice.get_all_data().await.unwrap();

        assert_eq!(recovered, data);
        assert!(repaired);
        for index in 1..=21 {
            assert!(lattice.graph().cell(lattice.graph().data_id(index)).repaired());
        }
    }

    #[tokio::test]
    async fn two_step_recovery_crosses_strands() {
        let params = EntanglementParams::new(3, 5, 5).unwrap();
        let data = blocks(25, 64);
        let mut source = FilteredSource::new(entangle(params, &data)).without_data([13]);
        for strand in Strand::take(3) {
            source = source.without_parity(strand, [13]);
        }

        let lattice = Lattice::new(params, 25, source).unwrap();
        let chunk = lattice.get_chunk(13).await.unwrap();
        assert_eq!(chunk.bytes, data[12]);
        assert!(chunk.repaired);
    }

    #[tokio::test]
    async fn isolated_block_exhausts_recovery() {
        // Five blocks with s = 5 put every block on single-member chains:
        // losing a block and all three of its parities is unrecoverable.
        let params = EntanglementParams::new(3, 5, 5).unwrap();
        let data = blocks(5, 32);
        let mut source = FilteredSource::new(entangle(params, &data)).without_data([1]);
        for strand in Strand::take(3) {
            source = source.without_parity(strand, [1]);
        }

        let lattice = Lattice::new(params, 5, source).unwrap();
        let err = lattice.get_chunk(1).await.unwrap_err();
        assert!(matches!(err, RecoveryError::Exhausted { index: 1 }));

        // The rest of the lattice is still served.
        assert!(lattice.get_chunk(2).await.is_ok());
    }

    #[tokio::test]
    async fn linear_round_trip() {
        let params = EntanglementParams::new(1, 1, 0).unwrap();
        let data = blocks(10, 128);
        let source = entangle(params, &data);

        let lattice = Lattice::new(params, 10, source).unwrap();
        let (recovered, repaired) = lattice.get_all_data().await.unwrap();
        assert_eq!(recovered, data);
        assert!(!repaired);
    }

    #[tokio::test]
    async fn repeated_requests_reuse_available_cells() {
        let params = EntanglementParams::new(3, 5, 5).unwrap();
        let data = blocks(21, 64);
        let source = FilteredSource::new(entangle(params, &data)).without_data([5]);

        let lattice = Lattice::new(params, 21, source).unwrap();

        let first = lattice.get_chunk(5).await.unwrap();
        let second = lattice.get_chunk(5).await.unwrap();
        assert_eq!(first, second);
        assert!(second.repaired);
    }

    #[tokio::test]
    async fn concurrent_requests_agree() {
        let params = EntanglementParams::new(3, 5, 5).unwrap();
        let data = blocks(21, 64);
        let source = FilteredSource::new(entangle(params, &data)).without_data(1..=21);

        let lattice = std::sync::Arc::new(Lattice::new(params, 21, source).unwrap());

        let mut tasks = JoinSet::new();
        for index in 1..=21 {
            let lattice = lattice.clone();
            tasks.spawn(async move { (index, lattice.get_chunk(index).await.unwrap()) });
        }

        while let Some(result) = tasks.join_next().await {
            let (index, chunk) = result.unwrap();
            assert_eq!(chunk.bytes, data[index as usize - 1], "block {index}");
            assert!(chunk.repaired);
        }
    }

    #[tokio::test]
    async fn cancelled_scope_surfaces_as_cancelled() {
        let params = EntanglementParams::new(3, 5, 5).unwrap();
        let data = blocks(21, 16);
        let lattice = Lattice::new(params, 21, entangle(params, &data)).unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = lattice.get_chunk_with_cancel(3, cancel).await.unwrap_err();
        assert!(matches!(err, RecoveryError::Cancelled));
    }

    #[tokio::test]
    async fn out_of_range_index_is_rejected() {
        let params = EntanglementParams::new(3, 5, 5).unwrap();
        let data = blocks(21, 16);
        let lattice = Lattice::new(params, 21, entangle(params, &data)).unwrap();

        assert!(matches!(
            lattice.get_chunk(0).await,
            Err(RecoveryError::OutOfRange(0))
        ));
        assert!(matches!(
            lattice.get_chunk(22).await,
            Err(RecoveryError::OutOfRange(22))
        ));
    }
}
