/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The hash tree that state proofs are built from.
//!
//! ## Hashing
//!
//! - The hash of a leaf is `SHA256(0x00 || borsh(payload))`.
//! - The hash of an internal node is `SHA256(0x01 || u32_le(number of children) || child hashes)`,
//!   with the child hashes in order.
//!
//! The distinct prefixes keep a leaf from ever hashing to the same value as an internal node.

use std::fmt::{self, Display, Formatter};

use crate::types::{
    crypto_primitives::{CryptoHasher, Digest},
    data_types::{CryptoHash, Payload},
};

const LEAF_PREFIX: u8 = 0x00;
const INTERNAL_PREFIX: u8 = 0x01;

/// A node of a hash tree. The leaves carry the ledger data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MerkleNode {
    Leaf(Payload),
    Internal(Vec<MerkleNode>),
}

impl MerkleNode {
    /// Create a leaf carrying `payload`.
    pub fn leaf(payload: impl Into<Payload>) -> MerkleNode {
        MerkleNode::Leaf(payload.into())
    }

    /// Create an internal node with `children` in order.
    pub fn internal(children: Vec<MerkleNode>) -> MerkleNode {
        MerkleNode::Internal(children)
    }

    /// Compute the hash of the subtree rooted at this node.
    pub fn hash(&self) -> CryptoHash {
        match self {
            MerkleNode::Leaf(payload) => leaf_hash(payload),
            MerkleNode::Internal(children) => {
                let child_hashes: Vec<CryptoHash> = children.iter().map(MerkleNode::hash).collect();
                internal_hash(&child_hashes)
            }
        }
    }

    /// Get the node that `route` leads to, starting from this node.
    pub fn node_at(&self, route: &MerkleRoute) -> Option<&MerkleNode> {
        route
            .indices()
            .iter()
            .try_fold(self, |node, &index| match node {
                MerkleNode::Internal(children) => children.get(index as usize),
                MerkleNode::Leaf(_) => None,
            })
    }

    /// Check whether this node is a leaf.
    pub fn is_leaf(&self) -> bool {
        matches!(self, MerkleNode::Leaf(_))
    }
}

/// The path from the root of a hash tree to one of its nodes, as the child index taken at every
/// level. The empty route leads to the root itself.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MerkleRoute(Vec<u32>);

impl MerkleRoute {
    /// Create a route that takes the child `indices` in order.
    pub fn new(indices: Vec<u32>) -> Self {
        Self(indices)
    }

    /// The route that leads to the root.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Get the route to the `index`-th child of the node this route leads to.
    pub fn child(&self, index: u32) -> Self {
        let mut indices = self.0.clone();
        indices.push(index);
        Self(indices)
    }

    /// Get the child indices of this route.
    pub fn indices(&self) -> &[u32] {
        &self.0
    }
}

impl From<Vec<u32>> for MerkleRoute {
    fn from(indices: Vec<u32>) -> Self {
        Self::new(indices)
    }
}

impl Display for MerkleRoute {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "/")?;
        let indices: Vec<String> = self.0.iter().map(u32::to_string).collect();
        write!(f, "{}", indices.join("/"))
    }
}

pub(crate) fn leaf_hash(payload: &Payload) -> CryptoHash {
    let mut hasher = CryptoHasher::new();
    hasher.update([LEAF_PREFIX]);
    // Borsh encoding of the payload.
    hasher.update((payload.len() as u32).to_le_bytes());
    hasher.update(payload.bytes());
    CryptoHash::new(hasher.finalize().into())
}

pub(crate) fn internal_hash(child_hashes: &[CryptoHash]) -> CryptoHash {
    let mut hasher = CryptoHasher::new();
    hasher.update([INTERNAL_PREFIX]);
    hasher.update((child_hashes.len() as u32).to_le_bytes());
    for child_hash in child_hashes {
        hasher.update(child_hash.bytes());
    }
    CryptoHash::new(hasher.finalize().into())
}
