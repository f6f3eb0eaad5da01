/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types that exist only to store bytes or integers, and do not have any major "active" behavior.

use std::{
    fmt::{self, Debug, Display, Formatter},
    hash::Hash,
    ops::{Add, AddAssign},
};

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use borsh::{BorshDeserialize, BorshSerialize};

/// Number that uniquely identifies a node in a [`Roster`](super::roster::Roster).
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct NodeId(u64);

impl NodeId {
    /// Create a new `NodeId` with an `int` value.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the `u64` value of this `NodeId`.
    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Number of a consensus round. Rounds are decided, and therefore delivered, in ascending order.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct RoundNumber(u64);

impl RoundNumber {
    /// Create a new `RoundNumber` with an `int` value.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the `u64` value of this `RoundNumber`.
    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl Display for RoundNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Add<u64> for RoundNumber {
    type Output = RoundNumber;
    fn add(self, rhs: u64) -> Self::Output {
        RoundNumber(self.0 + rhs)
    }
}

/// Position of an event in the stream written by the persistent event log.
///
/// Stream sequence numbers start at 0. The value `-1` ([`SequenceNumber::init`]) means "no event
/// yet", and is the initial durability watermark.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct SequenceNumber(i64);

impl SequenceNumber {
    /// Create a new `SequenceNumber` with an `int` value.
    pub const fn new(int: i64) -> Self {
        Self(int)
    }

    /// The sequence number that precedes every event in the stream.
    pub const fn init() -> Self {
        Self(-1)
    }

    /// Get the `i64` value of this `SequenceNumber`.
    pub const fn int(&self) -> i64 {
        self.0
    }
}

impl Display for SequenceNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Stake weight of a single node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct Weight(u64);

impl Weight {
    /// Create a new `Weight` with an `int` value.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the `u64` value of this `Weight`.
    pub const fn int(&self) -> u64 {
        self.0
    }
}

/// Total weight obtained by summing up the [`Weight`]s of a set of nodes.
///
/// Sums are kept in a `u128` so that adding any number of `u64` weights, and multiplying the sum by
/// the small constants used in threshold comparisons, never overflows in practice.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct TotalWeight(u128);

impl TotalWeight {
    /// Create a new `TotalWeight` with an `int` value.
    pub const fn new(int: u128) -> Self {
        Self(int)
    }

    /// Get the `u128` value of this `TotalWeight`.
    pub const fn int(&self) -> u128 {
        self.0
    }

    /// Check whether no weight at all has been summed.
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl AddAssign<Weight> for TotalWeight {
    fn add_assign(&mut self, rhs: Weight) {
        self.0.add_assign(rhs.0 as u128)
    }
}

impl Display for TotalWeight {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// 32-byte cryptographic hash. Within this crate, always a SHA-256 digest.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize)]
pub struct CryptoHash([u8; 32]);

impl CryptoHash {
    /// Create a new `CryptoHash` wrapping `bytes`.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the inner `[u8; 32]` value of this `CryptoHash`.
    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }
}

impl Display for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", STANDARD_NO_PAD.encode(self.0))
    }
}

impl Debug for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Ed25519 digital signature.
///
/// Within this crate, these are produced using the [`ed25519_dalek`] crate, whose main definitions
/// are re-exported from the [`crypto_primitives`](super::crypto_primitives) module.
#[derive(Clone, Copy, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct SignatureBytes([u8; 64]);

impl SignatureBytes {
    /// Create a new `SignatureBytes` wrapping `bytes`.
    pub const fn new(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Get the inner `[u8; 64]` value of this `SignatureBytes`.
    pub const fn bytes(&self) -> [u8; 64] {
        self.0
    }
}

impl Debug for SignatureBytes {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SignatureBytes").field(&&self.0[..]).finish()
    }
}

/// Arbitrary ledger data stored in a leaf of a hash tree, and proven by a
/// [`StateProof`](crate::state_proof::StateProof).
#[derive(Clone, Debug, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct Payload(Vec<u8>);

impl Payload {
    /// Create a new `Payload` wrapping `bytes`.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Get a reference to the bytes of this `Payload`.
    pub fn bytes(&self) -> &[u8] {
        &self.0
    }

    /// Get the number of bytes in this `Payload`.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check whether this `Payload` contains no bytes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::new(bytes)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Payload::new(bytes.to_vec())
    }
}
