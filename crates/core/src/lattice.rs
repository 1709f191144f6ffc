//! The block graph: data cells, parity cells and the wrap edges that close
//! every chain into a cycle.
//!
//! Cells live in one arena and refer to each other by [`CellId`]; links are
//! wired once at construction and frozen. All byte-level mutation happens
//! through the per-cell state machine in [`crate::block`].

use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::block::{BlockNode, CellId, RecoverPair};
use crate::geometry::Geometry;
use crate::recovery::{RecoveryError, RepairRun};
use crate::source::BlockSource;
use crate::{BlockData, BlockIndex, EntanglementParams, ParamError, RequestId, Strand};

/// Sequential recovery explores this many hops of XOR-chasing before the
/// engine falls back to the parallel phase.
pub const DEFAULT_SWITCH_DEPTH: usize = 2;

/// The wired cell arena. Data cells occupy positions `0..len`, parity cells
/// follow strand-major: parity (k, i) sits at `len * (k + 1) + i - 1`.
pub struct LatticeGraph {
    geometry: Geometry,
    alpha: usize,
    len: i64,
    cells: Vec<BlockNode>,
}

impl LatticeGraph {
    pub fn new(params: EntanglementParams, len: usize) -> Result<Self, ParamError> {
        params.validate()?;

        let alpha = params.alpha;
        let count = len as i64;

        let mut cells = Vec::with_capacity(len * (alpha + 1));
        for index in 1..=count {
            cells.push(BlockNode::data_cell(index, alpha));
        }
        for strand in Strand::take(alpha) {
            for index in 1..=count {
                cells.push(BlockNode::parity_cell(index, strand));
            }
        }

        let mut graph = Self {
            geometry: Geometry::new(params),
            alpha,
            len: count,
            cells,
        };
        graph.wire();

        debug!(blocks = len, alpha, "lattice initialized");
        Ok(graph)
    }

    /// Linking pass: every data cell gets alpha left and alpha right parity
    /// links; every parity joins its left data cell to the forward neighbor,
    /// wrapping to the chain start at the lattice edge.
    fn wire(&mut self) {
        for index in 1..=self.len {
            let forward = self.geometry.forward_neighbors(index);
            let starts = self.geometry.chain_start_indexes(index);

            for k in 0..self.alpha {
                let data = self.data_id(index);
                let parity = self.parity_id(index, k);

                self.cells[parity.0].left[0] = data;
                self.cells[data.0].right[k] = parity;

                let right_index = if self.geometry.is_valid(forward[k], self.len) {
                    forward[k]
                } else {
                    let start = starts[k];
                    if start != index {
                        // The chain wraps onto a cell it has already
                        // crossed; its first parity was rewritten by the
                        // entangler's wrap pass.
                        let first_parity = self.parity_id(start, k);
                        self.cells[first_parity.0].wrap_modified = true;
                    }
                    start
                };

                let right_data = self.data_id(right_index);
                self.cells[parity.0].right[0] = right_data;
                self.cells[right_data.0].left[k] = parity;
            }
        }
    }

    /// Number of data blocks.
    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn alpha(&self) -> usize {
        self.alpha
    }

    pub fn data_id(&self, index: BlockIndex) -> CellId {
        debug_assert!(self.geometry.is_valid(index, self.len));
        CellId(index as usize - 1)
    }

    pub fn parity_id(&self, index: BlockIndex, strand: usize) -> CellId {
        debug_assert!(self.geometry.is_valid(index, self.len) && strand < self.alpha);
        CellId(self.len as usize * (strand + 1) + index as usize - 1)
    }

    pub fn cell(&self, id: CellId) -> &BlockNode {
        &self.cells[id.0]
    }

    pub fn contains(&self, index: BlockIndex) -> bool {
        self.geometry.is_valid(index, self.len)
    }

    /// Recovery pairs of a cell, computed once and memoized.
    ///
    /// For a parity cell the backward pair joins the previous parity on the
    /// strand with the cell's left data block; unless the parity was wrap
    /// modified, the forward pair joins its right data block with the next
    /// parity. For a data cell each strand contributes its surrounding
    /// parity pair. Wrap-modified operands are substituted: a rewritten
    /// left parity stands in for the chain-start data block it folded in,
    /// and a rewritten right parity adds the pair one hop forward, whose
    /// XOR equals the pre-wrap parity, i.e. this cell's bytes.
    pub fn recover_pairs(&self, id: CellId) -> &[RecoverPair] {
        self.cell(id).pairs.get_or_init(|| self.compute_pairs(id))
    }

    fn compute_pairs(&self, id: CellId) -> Vec<RecoverPair> {
        let node = self.cell(id);
        let mut pairs = Vec::new();

        if let Some(strand) = node.strand() {
            let k = strand.index();

            let right = node.left[0];
            let mut left = self.cell(right).left[k];
            if self.cell(left).is_wrap_modified() {
                left = self.cell(left).left[0];
            }
            pairs.push(RecoverPair { left, right });

            if !node.is_wrap_modified() {
                let left = node.right[0];
                let right = self.cell(left).right[k];
                pairs.push(RecoverPair { left, right });
            }
        } else {
            for k in 0..self.alpha {
                let mut left = node.left[k];
                let right = node.right[k];
                if self.cell(left).is_wrap_modified() {
                    left = self.cell(left).left[0];
                }
                pairs.push(RecoverPair { left, right });

                if self.cell(right).is_wrap_modified() {
                    let forward_left = self.cell(right).right[0];
                    let forward_right = self.cell(forward_left).right[k];
                    pairs.push(RecoverPair {
                        left: forward_left,
                        right: forward_right,
                    });
                }
            }
        }

        pairs
    }
}

/// One recovered chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub bytes: BlockData,
    /// True iff at least one XOR step contributed to the returned bytes.
    pub repaired: bool,
}

/// The lattice together with its fetch policy: builds the graph over a
/// block source and serves per-block recovery requests.
pub struct Lattice<S> {
    graph: Arc<LatticeGraph>,
    source: Arc<S>,
    switch_depth: usize,
    requests: Mutex<RequestId>,
}

impl<S: BlockSource> Lattice<S> {
    pub fn new(params: EntanglementParams, len: usize, source: S) -> Result<Self, ParamError> {
        Ok(Self {
            graph: Arc::new(LatticeGraph::new(params, len)?),
            source: Arc::new(source),
            switch_depth: DEFAULT_SWITCH_DEPTH,
            requests: Mutex::new(0),
        })
    }

    /// Bound on the sequential phase of the recovery engine.
    pub fn with_switch_depth(mut self, depth: usize) -> Self {
        self.switch_depth = depth;
        self
    }

    pub fn graph(&self) -> &LatticeGraph {
        &self.graph
    }

    fn next_request(&self) -> RequestId {
        let mut counter = self.requests.lock().unwrap();
        *counter += 1;
        *counter
    }

    /// Fetch or recover the data block at the 1-based index.
    pub async fn get_chunk(&self, index: BlockIndex) -> Result<Chunk, RecoveryError> {
        self.get_chunk_with_cancel(index, CancellationToken::new())
            .await
    }

    /// Like [`get_chunk`](Self::get_chunk), but observing an external
    /// cancellation scope. A tripped scope surfaces as
    /// [`RecoveryError::Cancelled`] once in-flight work has unwound.
    pub async fn get_chunk_with_cancel(
        &self,
        index: BlockIndex,
        cancel: CancellationToken,
    ) -> Result<Chunk, RecoveryError> {
        if !self.graph.contains(index) {
            return Err(RecoveryError::OutOfRange(index));
        }

        let run = RepairRun::new(
            self.graph.clone(),
            self.source.clone(),
            self.next_request(),
            self.switch_depth,
            cancel.child_token(),
        );
        run.get(self.graph.data_id(index)).await
    }

    /// All data blocks in lattice order, halting on the first cell that
    /// cannot be recovered. The flag reports whether any block was repaired.
    pub async fn get_all_data(&self) -> Result<(Vec<BlockData>, bool), RecoveryError> {
        let mut blocks = Vec::with_capacity(self.graph.len());
        let mut repaired = false;

        for index in 1..=self.graph.len() as BlockIndex {
            let chunk = self.get_chunk(index).await?;
            repaired |= chunk.repaired;
            blocks.push(chunk.bytes);
        }

        Ok((blocks, repaired))
    }
}
