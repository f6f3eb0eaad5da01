/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Stake-weighted signature counting.
//!
//! Given a [`Roster`] and a collection of `(NodeId, SignatureBytes)` pairs over some message,
//! [`valid_weight`] sums up the weight of the nodes whose signatures are correct, and
//! [`meets_threshold`] checks that sum against one of three [`ThresholdKind`]s.
//!
//! ## Counting rules
//!
//! - A signer that is not in the roster contributes nothing.
//! - A signer whose signature does not verify over the message with its roster key contributes
//!   nothing. This includes correct signatures attributed to the wrong node.
//! - If a node appears more than once, only its first occurrence is evaluated. A node can therefore
//!   never contribute its weight twice.
//!
//! All arithmetic is done on [`TotalWeight`]s (`u128`), which cannot overflow for rosters of `u64`
//! weights.

use std::collections::HashSet;

use crate::types::{
    crypto_primitives::verify,
    data_types::{NodeId, SignatureBytes, TotalWeight},
    roster::Roster,
};

/// How much of a roster's total weight a set of signers must hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ThresholdKind {
    /// At least a third of the total weight. At least one honest node is among the signers as long
    /// as less than a third of the weight is held by byzantine nodes.
    StrongMinority,

    /// More than half of the total weight.
    Majority,

    /// More than two thirds of the total weight.
    SuperMajority,
}

impl ThresholdKind {
    /// Check whether `valid` out of `total` weight satisfies this threshold.
    pub fn is_satisfied_by(&self, valid: TotalWeight, total: TotalWeight) -> bool {
        let (valid, total) = (valid.int(), total.int());
        match self {
            // valid >= total / 3
            ThresholdKind::StrongMinority => valid.saturating_mul(3) >= total,
            // valid > total / 2
            ThresholdKind::Majority => valid.saturating_mul(2) > total,
            // valid > 2 * total / 3
            ThresholdKind::SuperMajority => valid.saturating_mul(3) > total.saturating_mul(2),
        }
    }
}

/// Sum up the weights of the nodes in `roster` that produced a correct signature over `message`.
///
/// See the [module-level documentation](self) for the counting rules.
pub fn valid_weight<'a>(
    roster: &Roster,
    message: &[u8],
    signatures: impl IntoIterator<Item = (&'a NodeId, &'a SignatureBytes)>,
) -> TotalWeight {
    let mut seen = HashSet::new();
    let mut total = TotalWeight::new(0);
    for (node, signature) in signatures {
        if !seen.insert(*node) {
            continue;
        }

        if let Some(entry) = roster.get(node) {
            if entry.weight().int() > 0 && verify(entry.public_key(), message, signature) {
                total += entry.weight();
            }
        }
    }

    total
}

/// Check whether `valid` out of `total` weight satisfies `threshold`.
pub fn meets_threshold(valid: TotalWeight, total: TotalWeight, threshold: ThresholdKind) -> bool {
    threshold.is_satisfied_by(valid, total)
}
