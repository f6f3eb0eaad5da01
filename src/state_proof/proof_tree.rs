/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The pruned copy of a [`MerkleNode`] tree that a state proof carries.
//!
//! A proof tree keeps the ancestors of every proven payload. Every other subtree is replaced by its
//! hash. Payload bytes are not stored in the tree itself: a payload leaf is a reference to the
//! proof's payload list, and the `n`-th payload leaf in pre-order refers to the `n`-th payload.

use std::collections::BTreeSet;

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::data_types::{CryptoHash, Payload};

use super::{
    merkle::{internal_hash, leaf_hash, MerkleNode, MerkleRoute},
    types::StateProofLimits,
    implementation::StateProofDecodeError,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum ProofNode {
    Pruned(CryptoHash),
    Payload,
    Internal(Vec<ProofNode>),
}

impl ProofNode {
    /// Prune `root` down to the paths to `targets`, appending the payloads found at `targets` to
    /// `payloads` in pre-order.
    ///
    /// Every route in `targets` must lead to a leaf of `root`.
    pub(crate) fn prune(
        root: &MerkleNode,
        targets: &BTreeSet<MerkleRoute>,
        payloads: &mut Vec<Payload>,
    ) -> ProofNode {
        Self::prune_at(root, &MerkleRoute::root(), targets, payloads)
    }

    fn prune_at(
        node: &MerkleNode,
        route: &MerkleRoute,
        targets: &BTreeSet<MerkleRoute>,
        payloads: &mut Vec<Payload>,
    ) -> ProofNode {
        match node {
            MerkleNode::Leaf(payload) if targets.contains(route) => {
                payloads.push(payload.clone());
                ProofNode::Payload
            }
            MerkleNode::Internal(children) if has_target_below(route, targets) => {
                ProofNode::Internal(
                    children
                        .iter()
                        .enumerate()
                        .map(|(i, child)| {
                            Self::prune_at(child, &route.child(i as u32), targets, payloads)
                        })
                        .collect(),
                )
            }
            _ => ProofNode::Pruned(node.hash()),
        }
    }

    /// Compute the root hash of this tree, taking payload leaves from `payloads` in pre-order.
    ///
    /// Returns `None` if the tree refers to more payloads than `payloads` has, or leaves some of them
    /// unreferenced.
    pub(crate) fn root_hash(&self, payloads: &[Payload]) -> Option<CryptoHash> {
        let mut payloads = payloads.iter();
        let root_hash = self.hash_with(&mut payloads)?;
        if payloads.next().is_some() {
            return None;
        }
        Some(root_hash)
    }

    fn hash_with<'a>(&self, payloads: &mut impl Iterator<Item = &'a Payload>) -> Option<CryptoHash> {
        match self {
            ProofNode::Pruned(hash) => Some(*hash),
            ProofNode::Payload => payloads.next().map(leaf_hash),
            ProofNode::Internal(children) => {
                let child_hashes = children
                    .iter()
                    .map(|child| child.hash_with(payloads))
                    .collect::<Option<Vec<CryptoHash>>>()?;
                Some(internal_hash(&child_hashes))
            }
        }
    }

    /// Count the payload leaves in this tree.
    pub(crate) fn payload_count(&self) -> usize {
        match self {
            ProofNode::Pruned(_) => 0,
            ProofNode::Payload => 1,
            ProofNode::Internal(children) => children.iter().map(ProofNode::payload_count).sum(),
        }
    }

    /// Flatten this tree into its pre-order wire representation.
    pub(crate) fn to_flat(&self) -> Vec<ProofNodeBytes> {
        let mut flat = Vec::new();
        self.push_flat(&mut flat, &mut 0);
        flat
    }

    fn push_flat(&self, flat: &mut Vec<ProofNodeBytes>, next_payload: &mut u32) {
        match self {
            ProofNode::Pruned(hash) => flat.push(ProofNodeBytes::Pruned(*hash)),
            ProofNode::Payload => {
                flat.push(ProofNodeBytes::Payload(*next_payload));
                *next_payload += 1;
            }
            ProofNode::Internal(children) => {
                flat.push(ProofNodeBytes::Internal(children.len() as u32));
                children
                    .iter()
                    .for_each(|child| child.push_flat(flat, next_payload));
            }
        }
    }

    /// Rebuild a tree from its pre-order wire representation, enforcing `limits`.
    ///
    /// The flat representation must describe exactly one tree, and its payload leaves must refer to
    /// the payloads `0, 1, 2, ..` in pre-order.
    pub(crate) fn from_flat(
        flat: &[ProofNodeBytes],
        limits: &StateProofLimits,
    ) -> Result<ProofNode, StateProofDecodeError> {
        let mut parser = FlatParser {
            nodes: flat.iter(),
            next_payload: 0,
            max_depth: limits.max_depth,
        };
        let root = parser.parse(0)?;
        if parser.nodes.next().is_some() {
            return Err(StateProofDecodeError::Malformed(
                "proof tree has nodes after its root subtree",
            ));
        }
        Ok(root)
    }
}

/// Intermediate representation of a [`ProofNode`] on the wire. A proof tree is serialized as the
/// pre-order sequence of its nodes.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub(crate) enum ProofNodeBytes {
    /// The hash of a pruned subtree.
    Pruned(CryptoHash),

    /// A leaf carrying the payload with this index.
    Payload(u32),

    /// An internal node followed by the subtrees of this many children.
    Internal(u32),
}

struct FlatParser<'a> {
    nodes: std::slice::Iter<'a, ProofNodeBytes>,
    next_payload: u32,
    max_depth: usize,
}

impl<'a> FlatParser<'a> {
    fn parse(&mut self, depth: usize) -> Result<ProofNode, StateProofDecodeError> {
        if depth > self.max_depth {
            return Err(StateProofDecodeError::TooDeep {
                limit: self.max_depth,
            });
        }

        match self.nodes.next() {
            Some(ProofNodeBytes::Pruned(hash)) => Ok(ProofNode::Pruned(*hash)),
            Some(ProofNodeBytes::Payload(index)) => {
                if *index != self.next_payload {
                    return Err(StateProofDecodeError::Malformed(
                        "payload leaves are not in pre-order",
                    ));
                }
                self.next_payload += 1;
                Ok(ProofNode::Payload)
            }
            Some(ProofNodeBytes::Internal(child_count)) => {
                // Every child takes at least one node, so this bounds the claimed count.
                if *child_count as usize > self.nodes.len() {
                    return Err(StateProofDecodeError::Malformed(
                        "internal node has more children than the remaining nodes",
                    ));
                }
                let children = (0..*child_count)
                    .map(|_| self.parse(depth + 1))
                    .collect::<Result<Vec<ProofNode>, StateProofDecodeError>>()?;
                Ok(ProofNode::Internal(children))
            }
            None => Err(StateProofDecodeError::Malformed("proof tree ends early")),
        }
    }
}

/// Check whether some route in `targets` passes through the node at `route` (without ending there).
fn has_target_below(route: &MerkleRoute, targets: &BTreeSet<MerkleRoute>) -> bool {
    // Routes are ordered lexicographically, so the first target after `route` is a descendant of
    // `route` if any target is.
    targets
        .range(route.clone()..)
        .find(|target| *target != route)
        .map_or(false, |target| target.indices().starts_with(route.indices()))
}
