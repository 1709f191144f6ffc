//! Boundary to the external block store.
//!
//! The recovery engine only ever sees this trait: indexes in, bytes out.
//! Loss injection for tests and the in-memory source used by benchmarks
//! live here as well, so every adapter shares the same failure surface.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::{BlockData, BlockIndex, Strand};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("data block {0} is not available")]
    DataNotAvailable(BlockIndex),

    #[error("parity block {index} on the {strand} strand is not available")]
    ParityNotAvailable { index: BlockIndex, strand: Strand },

    #[error("source error: {0}")]
    Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl SourceError {
    pub fn internal<T>(value: T) -> Self
    where
        T: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        SourceError::Internal(value.into())
    }
}

/// Fetch capability over the block store, addressed by lattice coordinates.
#[trait_variant::make(Send)]
pub trait BlockSource: Send + Sync + 'static {
    /// Bytes of the data block at the 1-based lattice index.
    async fn data(&self, index: BlockIndex) -> Result<BlockData, SourceError>;

    /// Bytes of the parity block whose left end is `index` on `strand`.
    async fn parity(&self, index: BlockIndex, strand: Strand) -> Result<BlockData, SourceError>;
}

/// Wraps a source with loss filters: listed indexes report
/// `NotAvailable` regardless of the underlying store state.
#[derive(Debug, Clone, Default)]
pub struct FilteredSource<S> {
    inner: S,
    missing_data: HashSet<BlockIndex>,
    missing_parity: HashMap<Strand, HashSet<BlockIndex>>,
}

impl<S> FilteredSource<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            missing_data: HashSet::new(),
            missing_parity: HashMap::new(),
        }
    }

    pub fn without_data(mut self, indexes: impl IntoIterator<Item = BlockIndex>) -> Self {
        self.missing_data.extend(indexes);
        self
    }

    pub fn without_parity(
        mut self,
        strand: Strand,
        indexes: impl IntoIterator<Item = BlockIndex>,
    ) -> Self {
        self.missing_parity.entry(strand).or_default().extend(indexes);
        self
    }
}

impl<S: BlockSource> BlockSource for FilteredSource<S> {
    async fn data(&self, index: BlockIndex) -> Result<BlockData, SourceError> {
        if self.missing_data.contains(&index) {
            return Err(SourceError::DataNotAvailable(index));
        }
        self.inner.data(index).await
    }

    async fn parity(&self, index: BlockIndex, strand: Strand) -> Result<BlockData, SourceError> {
        if self
            .missing_parity
            .get(&strand)
            .is_some_and(|missing| missing.contains(&index))
        {
            return Err(SourceError::ParityNotAvailable { index, strand });
        }
        self.inner.parity(index, strand).await
    }
}

/// Map-backed source for unit tests and microbenchmarks.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    data: HashMap<BlockIndex, BlockData>,
    parity: HashMap<(Strand, BlockIndex), BlockData>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a full entanglement: data blocks in lattice order plus every
    /// emitted parity record.
    pub fn load(
        blocks: impl IntoIterator<Item = BlockData>,
        parities: impl IntoIterator<Item = crate::EntangledBlock>,
    ) -> Self {
        let mut source = Self::new();
        for (offset, bytes) in blocks.into_iter().enumerate() {
            source.put_data(offset as BlockIndex + 1, bytes);
        }
        for parity in parities {
            source.put_parity(parity.left, parity.strand, parity.bytes);
        }
        source
    }

    pub fn put_data(&mut self, index: BlockIndex, bytes: BlockData) {
        self.data.insert(index, bytes);
    }

    pub fn put_parity(&mut self, index: BlockIndex, strand: Strand, bytes: BlockData) {
        self.parity.insert((strand, index), bytes);
    }

    pub fn remove_data(&mut self, index: BlockIndex) {
        self.data.remove(&index);
    }

    pub fn remove_parity(&mut self, index: BlockIndex, strand: Strand) {
        self.parity.remove(&(strand, index));
    }
}

impl BlockSource for MemorySource {
    async fn data(&self, index: BlockIndex) -> Result<BlockData, SourceError> {
        self.data
            .get(&index)
            .cloned()
            .ok_or(SourceError::DataNotAvailable(index))
    }

    async fn parity(&self, index: BlockIndex, strand: Strand) -> Result<BlockData, SourceError> {
        self.parity
            .get(&(strand, index))
            .cloned()
            .ok_or(SourceError::ParityNotAvailable { index, strand })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn filters_hide_listed_indexes() {
        let mut inner = MemorySource::new();
        inner.put_data(1, vec![1]);
        inner.put_data(2, vec![2]);
        inner.put_parity(1, Strand::Horizontal, vec![3]);
        inner.put_parity(1, Strand::Right, vec![4]);

        let source = FilteredSource::new(inner)
            .without_data([1])
            .without_parity(Strand::Horizontal, [1]);

        assert!(matches!(
            source.data(1).await,
            Err(SourceError::DataNotAvailable(1))
        ));
        assert_eq!(source.data(2).await.unwrap(), vec![2]);
        assert!(matches!(
            source.parity(1, Strand::Horizontal).await,
            Err(SourceError::ParityNotAvailable { .. })
        ));
        // Filters are per strand.
        assert_eq!(source.parity(1, Strand::Right).await.unwrap(), vec![4]);
    }
}
