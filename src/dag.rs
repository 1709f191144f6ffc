//! Merkle-DAG walk and the lattice ordering of a file's blocks.
//!
//! The flattened order is what gives every block its 1-based lattice index
//! at upload time; downloads only ever see the index map recorded in the
//! metadata envelope.

use futures_util::future::BoxFuture;

use crate::ipfs::IpfsClient;
use crate::model::Cid;
use crate::prelude::*;

/// One node of a file's Merkle tree, loaded with its raw bytes.
pub struct MerkleNode {
    pub cid: Cid,
    pub bytes: BlockData,
    pub children: Vec<MerkleNode>,
    preorder: usize,
}

impl MerkleNode {
    /// Fetch the whole tree below `cid`, depth first.
    pub async fn load(client: &IpfsClient, cid: &Cid) -> Result<Self, Error> {
        let mut root = Self::fetch(client, cid.clone()).await?;
        let mut counter = 0;
        root.assign_preorder(&mut counter);
        Ok(root)
    }

    fn fetch(client: &IpfsClient, cid: Cid) -> BoxFuture<'_, Result<MerkleNode, Error>> {
        Box::pin(async move {
            let bytes = client.block_get(&cid).await?;
            let links = client.links(&cid).await?;

            let mut children = Vec::with_capacity(links.len());
            for link in links {
                children.push(Self::fetch(client, link.cid).await?);
            }

            Ok(MerkleNode {
                cid,
                bytes,
                children,
                preorder: 0,
            })
        })
    }

    fn assign_preorder(&mut self, counter: &mut usize) {
        self.preorder = *counter;
        *counter += 1;
        for child in &mut self.children {
            child.assign_preorder(counter);
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn tree_size(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(MerkleNode::tree_size)
            .sum::<usize>()
    }

    /// All tree nodes in lattice order.
    ///
    /// The base order is the pre-order traversal. With `swap`, every
    /// internal node (except the root) is moved at least one lattice window
    /// away from its children when a leaf slot allows it, so that losing a
    /// window never takes out a parent together with its subtree.
    pub fn flattened(&self, s: usize, p: usize, swap: bool) -> Vec<&MerkleNode> {
        let mut nodes = Vec::with_capacity(self.tree_size());
        let mut internals = Vec::new();
        self.collect(&mut nodes, &mut internals, true);

        if swap {
            let window = (s * p) as i64;
            for internal in internals {
                let lowest = internal.children.first().map_or(0, |c| c.preorder) as i64;
                let highest = internal.children.last().map_or(0, |c| c.preorder) as i64;

                let here = nodes
                    .iter()
                    .position(|node| node.preorder == internal.preorder)
                    .unwrap_or(0);

                let mut slot = window as usize;
                while slot < nodes.len() {
                    let candidate = nodes[slot];
                    let in_window = (candidate.preorder as i64) > lowest - window
                        && (candidate.preorder as i64) < highest + window;
                    if !in_window && candidate.is_leaf() {
                        nodes.swap(slot, here);
                        break;
                    }
                    slot += s;
                }
            }
        }

        nodes
    }

    /// Leaf nodes only, in pre-order.
    pub fn leaves(&self) -> Vec<&MerkleNode> {
        let mut nodes = Vec::new();
        let mut internals = Vec::new();
        self.collect(&mut nodes, &mut internals, true);
        nodes.retain(|node| node.is_leaf());
        nodes
    }

    fn collect<'a>(
        &'a self,
        nodes: &mut Vec<&'a MerkleNode>,
        internals: &mut Vec<&'a MerkleNode>,
        root: bool,
    ) {
        nodes.push(self);
        for child in &self.children {
            child.collect(nodes, internals, false);
        }
        // Moving the root away from its children is meaningless; it is the
        // entry point of every walk.
        if !self.is_leaf() && !root {
            internals.push(self);
        }
    }
}
