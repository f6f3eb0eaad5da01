/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Portable proofs that pieces of ledger data were attested by the network.
//!
//! A [`StateProof`] binds one or more [`Payload`](crate::types::data_types::Payload)s (leaves of a
//! hash tree of ledger data) to signatures over the tree's root hash. A verifier who trusts a
//! [`Roster`](crate::types::roster::Roster) (obtained out-of-band) can check the proof without
//! access to the rest of the tree.
//!
//! ## Exporting a proof
//!
//! ```
//! use keystone_rs::state_proof::{MerkleNode, MerkleRoute, StateProof};
//! use keystone_rs::quorum::ThresholdKind;
//! use keystone_rs::types::{crypto_primitives::{Keypair, SigningKey}, data_types::{NodeId, Weight}, roster::Roster};
//! use rand_core::OsRng;
//!
//! let keypair = Keypair::new(SigningKey::generate(&mut OsRng));
//! let mut roster = Roster::new();
//! roster.put(NodeId::new(0), Weight::new(1), keypair.public());
//!
//! let tree = MerkleNode::internal(vec![MerkleNode::leaf(b"a".to_vec()), MerkleNode::leaf(b"b".to_vec())]);
//! let signature = keypair.sign_hash(&tree.hash());
//! let proof = StateProof::build(&tree, [(NodeId::new(0), signature)], &[MerkleRoute::new(vec![1])]).unwrap();
//!
//! let received = StateProof::from_bytes(&proof.to_bytes()).unwrap();
//! assert!(received.is_valid(&roster, ThresholdKind::SuperMajority));
//! assert_eq!(received.payloads()[0].bytes(), b"b");
//! ```
//!
//! ## Building
//!
//! [`StateProof::build`] walks the source tree ([`MerkleNode`]) along the
//! [routes](MerkleRoute) of the requested leaves. The proof keeps every node on these paths, and
//! replaces every other subtree with its hash. A proof that is still being built is never visible
//! outside of `build` and the decoder: every `StateProof` value has at least one signature and at
//! least one payload, and its tree refers to every payload exactly once.
//!
//! ## Validation
//!
//! [`StateProof::is_valid`] recomputes the root hash from the pruned tree and the payloads, then
//! counts the weight of the correct signatures over it using the [quorum](crate::quorum) rules. A
//! proof that was tampered with (payload, pruned hash, tree shape, or signature) recomputes a
//! different root or loses signatures, and fails validation.
//!
//! ## Wire format
//!
//! [`StateProof::to_bytes`] produces the borsh encoding of:
//! 1. The signatures, as `(NodeId, SignatureBytes)` pairs sorted by node id.
//! 2. The proof tree, flattened in pre-order. Each node is a pruned hash, a reference to the next
//!    payload, or an internal node followed by its children.
//! 3. The payloads, in the pre-order of their leaves.
//!
//! The encoding depends only on the proof, not on the order in which signatures or routes were
//! supplied to `build`. Decoding untrusted bytes is bounded by [`StateProofLimits`].

pub mod implementation;

pub mod merkle;

pub(crate) mod proof_tree;

pub mod types;

pub use implementation::{StateProof, StateProofDecodeError, StateProofError};

pub use merkle::{MerkleNode, MerkleRoute};

pub use types::StateProofLimits;
