/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions of types specific to [state proofs](super::StateProof).

use typed_builder::TypedBuilder;

/// Bounds that [`StateProof::from_bytes_with_limits`](super::StateProof::from_bytes_with_limits)
/// enforces on untrusted input.
///
/// ## Example
///
/// ```
/// use keystone_rs::state_proof::StateProofLimits;
///
/// let limits = StateProofLimits::builder().max_signatures(64).build();
/// assert_eq!(limits.max_depth, 64);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, TypedBuilder)]
pub struct StateProofLimits {
    #[builder(
        default = 4 * 1024 * 1024,
        setter(doc = "Set the maximum size of a serialized proof, in bytes. Default: 4 MiB.")
    )]
    pub max_bytes: usize,
    #[builder(
        default = 1024,
        setter(doc = "Set the maximum number of signatures in a proof. Default: 1024.")
    )]
    pub max_signatures: usize,
    #[builder(
        default = 1024,
        setter(doc = "Set the maximum number of payloads in a proof. Default: 1024.")
    )]
    pub max_payloads: usize,
    #[builder(
        default = 65536,
        setter(doc = "Set the maximum number of nodes in a proof tree. Default: 65536.")
    )]
    pub max_nodes: usize,
    #[builder(
        default = 64,
        setter(doc = "Set the maximum depth of a proof tree. The root is at depth 0. Default: 64.")
    )]
    pub max_depth: usize,
}

impl Default for StateProofLimits {
    fn default() -> Self {
        StateProofLimits::builder().build()
    }
}
