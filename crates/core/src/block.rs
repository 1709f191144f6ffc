//! Per-cell state machine of the lattice.
//!
//! Every cell owns its own mutex and wakeup primitive; neighbor links are
//! frozen once the lattice is wired. Status only ever advances
//! `NoData -> RepairPending -> DataAvailable`, falling back to `NoData`
//! when a repair attempt fails.

use std::sync::{Mutex, OnceLock};

use thiserror::Error;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::xor::xor_bytes;
use crate::{BlockData, BlockIndex, RequestId, Strand};

/// Position of a cell in the lattice arena. Stable for the lattice
/// lifetime; data cells come first, parity cells follow strand-major.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    NoData,
    RepairPending,
    DataAvailable,
}

#[derive(Debug, Error)]
pub enum BlockError {
    #[error("block has no data")]
    NoData,

    #[error("cannot recover from an empty operand")]
    NoInput,
}

/// Two adjacent cells whose XOR yields the bytes of a third one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoverPair {
    pub left: CellId,
    pub right: CellId,
}

struct CellState {
    status: BlockStatus,
    bytes: BlockData,
    repaired: bool,
    request: RequestId,
}

/// One lattice cell: a data block or a parity block together with its
/// repair coordination state.
pub struct BlockNode {
    index: BlockIndex,
    strand: Option<Strand>,
    pub(crate) wrap_modified: bool,
    pub(crate) left: Vec<CellId>,
    pub(crate) right: Vec<CellId>,
    pub(crate) pairs: OnceLock<Vec<RecoverPair>>,
    state: Mutex<CellState>,
    repair_done: Notify,
}

impl BlockNode {
    pub(crate) fn data_cell(index: BlockIndex, alpha: usize) -> Self {
        Self::new(index, None, alpha)
    }

    pub(crate) fn parity_cell(index: BlockIndex, strand: Strand) -> Self {
        Self::new(index, Some(strand), 1)
    }

    fn new(index: BlockIndex, strand: Option<Strand>, degree: usize) -> Self {
        Self {
            index,
            strand,
            wrap_modified: false,
            left: vec![CellId(usize::MAX); degree],
            right: vec![CellId(usize::MAX); degree],
            pairs: OnceLock::new(),
            state: Mutex::new(CellState {
                status: BlockStatus::NoData,
                bytes: Vec::new(),
                repaired: false,
                request: 0,
            }),
            repair_done: Notify::new(),
        }
    }

    /// 1-based lattice index; for parity cells this is the left data index.
    pub fn index(&self) -> BlockIndex {
        self.index
    }

    /// `None` for data cells.
    pub fn strand(&self) -> Option<Strand> {
        self.strand
    }

    pub fn is_parity(&self) -> bool {
        self.strand.is_some()
    }

    /// True on the parity whose bytes were rewritten by the wrap pass.
    pub fn is_wrap_modified(&self) -> bool {
        self.wrap_modified
    }

    pub fn status(&self) -> BlockStatus {
        self.state.lock().unwrap().status
    }

    pub fn is_available(&self) -> bool {
        self.status() == BlockStatus::DataAvailable
    }

    /// True when the final bytes came from an XOR reconstruction rather
    /// than a successful fetch.
    pub fn repaired(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.status == BlockStatus::DataAvailable && state.repaired
    }

    pub fn data(&self) -> Result<BlockData, BlockError> {
        let state = self.state.lock().unwrap();
        match state.status {
            BlockStatus::DataAvailable => Ok(state.bytes.clone()),
            _ => Err(BlockError::NoData),
        }
    }

    /// Install bytes, marking the cell available and waking every waiter.
    /// A cell that already holds data keeps it.
    pub fn install(&self, bytes: BlockData, repaired: bool) {
        let mut state = self.state.lock().unwrap();
        if state.status == BlockStatus::DataAvailable {
            return;
        }
        state.bytes = bytes;
        state.repaired = repaired;
        state.status = BlockStatus::DataAvailable;
        drop(state);

        self.repair_done.notify_waiters();
    }

    /// Reconstruct the cell from a recovery pair.
    pub fn recover(&self, left: &[u8], right: &[u8]) -> Result<(), BlockError> {
        if left.is_empty() || right.is_empty() {
            return Err(BlockError::NoInput);
        }
        self.install(xor_bytes(left, right), true);
        Ok(())
    }

    /// Try to take ownership of the cell's repair for `request`.
    ///
    /// Returns false when there is nothing to do: the data is already
    /// there, the same request has already visited this cell (cycle), or
    /// the scope was cancelled. When another request holds the cell, waits
    /// for its outcome and re-evaluates.
    pub async fn start_repair(&self, cancel: &CancellationToken, request: RequestId) -> bool {
        loop {
            if cancel.is_cancelled() {
                // Unblock anyone parked on this cell before giving up.
                self.repair_done.notify_waiters();
                return false;
            }

            let wait = self.repair_done.notified();
            tokio::pin!(wait);

            let should_wait = {
                let mut state = self.state.lock().unwrap();
                match state.status {
                    BlockStatus::DataAvailable => return false,
                    BlockStatus::RepairPending if state.request == request => return false,
                    BlockStatus::RepairPending => {
                        // Register before releasing the lock so a wakeup
                        // between unlock and await is not lost.
                        wait.as_mut().enable();
                        true
                    }
                    BlockStatus::NoData => {
                        state.status = BlockStatus::RepairPending;
                        state.request = request;
                        return true;
                    }
                }
            };

            if should_wait {
                tokio::select! {
                    _ = &mut wait => {}
                    _ = cancel.cancelled() => {}
                }
            }
        }
    }

    /// Settle a pending repair. Success broadcasts to every waiter; failure
    /// resets the cell and hands the attempt to a single waiter.
    pub fn finish_repair(&self, success: bool) {
        let mut state = self.state.lock().unwrap();
        if state.status != BlockStatus::RepairPending {
            return;
        }

        if success {
            state.status = BlockStatus::DataAvailable;
            drop(state);
            self.repair_done.notify_waiters();
        } else {
            state.status = BlockStatus::NoData;
            drop(state);
            self.repair_done.notify_one();
        }
    }
}
