/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types that store information about the nodes that can attest to ledger data.

use std::{
    collections::{btree_map, BTreeMap},
    fmt::{self, Display, Formatter},
};

use borsh::{BorshDeserialize, BorshSerialize};

use super::{
    crypto_primitives::VerifyingKey,
    data_types::{NodeId, TotalWeight, Weight},
};

/// Bytes of an Ed25519 verifying key.
pub type VerifyingKeyBytes = [u8; 32];

/// The stake weight and signature verifying key of a single node in a [`Roster`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RosterEntry {
    weight: Weight,
    public_key: VerifyingKey,
}

impl RosterEntry {
    /// Create a new `RosterEntry`.
    pub fn new(weight: Weight, public_key: VerifyingKey) -> Self {
        Self { weight, public_key }
    }

    /// Get the stake weight of the node.
    pub fn weight(&self) -> Weight {
        self.weight
    }

    /// Get the key with which the node's signatures are verified.
    pub fn public_key(&self) -> &VerifyingKey {
        &self.public_key
    }
}

/// Stores the identities of nodes, their stake weights, and their signature verifying keys.
///
/// ## Snapshots
///
/// A `Roster` is treated as an immutable snapshot by everything that reads it. When membership
/// changes, build (or clone and modify) a new `Roster` instead of mutating one that may be in use by
/// an in-flight validation.
///
/// ## Ordering of nodes
///
/// `Roster` keeps its nodes in ascending order of their [`NodeId`]s, and [`iter`](Roster::iter)
/// walks through them in this order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Roster {
    entries: BTreeMap<NodeId, RosterEntry>,
}

impl Roster {
    /// Create an empty roster.
    pub fn new() -> Roster {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Put a `node` with the specified `weight` and `public_key` into the roster.
    ///
    /// If `node` already exists in the roster, this function replaces its entry instead.
    pub fn put(&mut self, node: NodeId, weight: Weight, public_key: VerifyingKey) {
        self.entries
            .insert(node, RosterEntry::new(weight, public_key));
    }

    /// Remove `node` from the roster, returning its entry if it was actually in the roster.
    pub fn remove(&mut self, node: &NodeId) -> Option<RosterEntry> {
        self.entries.remove(node)
    }

    /// Get the entry of the specified `node`.
    pub fn get(&self, node: &NodeId) -> Option<&RosterEntry> {
        self.entries.get(node)
    }

    /// Get the weight of the specified `node`.
    pub fn weight(&self, node: &NodeId) -> Option<Weight> {
        self.entries.get(node).map(|entry| entry.weight)
    }

    /// Get the verifying key of the specified `node`.
    pub fn public_key(&self, node: &NodeId) -> Option<&VerifyingKey> {
        self.entries.get(node).map(|entry| &entry.public_key)
    }

    /// Get the sum of the weights of all of the nodes in the roster.
    pub fn total_weight(&self) -> TotalWeight {
        let mut total_weight = TotalWeight::new(0);
        for entry in self.entries.values() {
            total_weight += entry.weight
        }
        total_weight
    }

    /// Check whether the roster contains `node`.
    pub fn contains(&self, node: &NodeId) -> bool {
        self.entries.contains_key(node)
    }

    /// Iterate through the nodes of the roster in ascending order of their ids.
    pub fn iter(&self) -> btree_map::Iter<'_, NodeId, RosterEntry> {
        self.entries.iter()
    }

    /// Get the number of nodes in the roster.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the roster is empty (i.e., `self.len() == 0`).
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Intermediate representation of [`Roster`] for safe serialization and deserialization.
///
/// To serialize an instance of `Roster`, convert it into a `RosterBytes` using the former type's
/// implementation of `From<&Roster>`, then serialize the `RosterBytes` using Borsh. Reverse the steps
/// to deserialize a `Roster`.
///
/// ## Rationale
///
/// [`ed25519_dalek::VerifyingKey`] does not implement the Borsh traits. This type replaces it with
/// [`VerifyingKeyBytes`], which means that instances of this type are not guaranteed to contain
/// valid Ed25519 verifying keys, and therefore conversion into `Roster` using `TryFrom` is fallible.
#[derive(Clone, BorshSerialize, BorshDeserialize)]
pub struct RosterBytes {
    // Entries are included here in ascending order of node id.
    entries: Vec<(NodeId, Weight, VerifyingKeyBytes)>,
}

impl TryFrom<RosterBytes> for Roster {
    type Error = RosterDecodeError;

    fn try_from(value: RosterBytes) -> Result<Self, Self::Error> {
        let mut roster = Roster::new();
        for (node, weight, key_bytes) in value.entries {
            if roster.contains(&node) {
                return Err(RosterDecodeError::DuplicateNode { node });
            }
            let public_key = VerifyingKey::from_bytes(&key_bytes)
                .map_err(|source| RosterDecodeError::InvalidVerifyingKey { node, source })?;
            roster.put(node, weight, public_key);
        }
        Ok(roster)
    }
}

impl From<&Roster> for RosterBytes {
    fn from(roster: &Roster) -> Self {
        RosterBytes {
            entries: roster
                .iter()
                .map(|(node, entry)| (*node, entry.weight, entry.public_key.to_bytes()))
                .collect(),
        }
    }
}

/// The ways converting [`RosterBytes`] into a [`Roster`] can fail.
#[derive(Debug)]
pub enum RosterDecodeError {
    /// The same node id appears more than once.
    DuplicateNode { node: NodeId },

    /// The bytes stored for a node are not a valid Ed25519 verifying key.
    InvalidVerifyingKey {
        node: NodeId,
        source: ed25519_dalek::SignatureError,
    },
}

impl Display for RosterDecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            RosterDecodeError::DuplicateNode { node } => {
                write!(f, "node {} appears more than once in the roster", node)
            }
            RosterDecodeError::InvalidVerifyingKey { node, source } => {
                write!(f, "invalid verifying key for node {}: {}", node, source)
            }
        }
    }
}

impl std::error::Error for RosterDecodeError {}
