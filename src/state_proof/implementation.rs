/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The [`StateProof`] type, its wire format, and the ways building or decoding one can fail.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::{self, Display, Formatter},
    io,
};

use borsh::{BorshDeserialize, BorshSerialize};

use crate::{
    logging::first_seven_base64_chars,
    quorum::{meets_threshold, valid_weight, ThresholdKind},
    types::{
        data_types::{CryptoHash, NodeId, Payload, SignatureBytes},
        roster::Roster,
    },
};

use super::{
    merkle::{MerkleNode, MerkleRoute},
    proof_tree::{ProofNode, ProofNodeBytes},
    types::StateProofLimits,
};

/// One or more payloads of a hash tree, together with the pruned tree needed to recompute its root
/// and signatures over that root. See the [module-level documentation](super).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateProof {
    signatures: BTreeMap<NodeId, SignatureBytes>,
    tree: ProofNode,
    payloads: Vec<Payload>,
}

impl StateProof {
    /// Build a proof of the leaves of `root` that `payload_routes` lead to.
    ///
    /// `signatures` are the signatures of the nodes over `root`'s hash. If a node appears more than
    /// once, its first signature is kept. Repeated routes are proven once.
    ///
    /// # Errors
    ///
    /// Fails if `signatures` or `payload_routes` is empty, or if a route does not lead to a leaf.
    pub fn build(
        root: &MerkleNode,
        signatures: impl IntoIterator<Item = (NodeId, SignatureBytes)>,
        payload_routes: &[MerkleRoute],
    ) -> Result<StateProof, StateProofError> {
        let mut signature_map = BTreeMap::new();
        for (node, signature) in signatures {
            signature_map.entry(node).or_insert(signature);
        }
        if signature_map.is_empty() {
            return Err(StateProofError::NoSignatures);
        }
        if payload_routes.is_empty() {
            return Err(StateProofError::NoPayloads);
        }

        for route in payload_routes {
            if !root.node_at(route).map_or(false, MerkleNode::is_leaf) {
                return Err(StateProofError::InvalidRoute {
                    route: route.clone(),
                });
            }
        }

        let targets: BTreeSet<MerkleRoute> = payload_routes.iter().cloned().collect();
        let mut payloads = Vec::with_capacity(targets.len());
        let tree = ProofNode::prune(root, &targets, &mut payloads);

        Ok(StateProof {
            signatures: signature_map,
            tree,
            payloads,
        })
    }

    /// Check that this proof's signatures, over its recomputed root hash, satisfy `threshold` of
    /// `roster`'s total weight.
    ///
    /// A roster whose total weight is zero never validates a proof.
    pub fn is_valid(&self, roster: &Roster, threshold: ThresholdKind) -> bool {
        let total_weight = roster.total_weight();
        if total_weight.is_zero() {
            log::debug!("Rejecting state proof: roster has no weight");
            return false;
        }

        let root_hash = match self.tree.root_hash(&self.payloads) {
            Some(root_hash) => root_hash,
            None => {
                log::debug!("Rejecting state proof: proof tree does not match its payloads");
                return false;
            }
        };

        let valid = valid_weight(roster, &root_hash.bytes(), self.signatures.iter());
        if !meets_threshold(valid, total_weight, threshold) {
            log::debug!(
                "Rejecting state proof for root {}: valid weight {} of {} does not meet {:?}",
                first_seven_base64_chars(&root_hash.bytes()),
                valid,
                total_weight,
                threshold
            );
            return false;
        }

        true
    }

    /// Get the proven payloads, in the pre-order of their leaves in the source tree.
    pub fn payloads(&self) -> &[Payload] {
        &self.payloads
    }

    /// Get the signatures carried by this proof, keyed by signer.
    pub fn signatures(&self) -> &BTreeMap<NodeId, SignatureBytes> {
        &self.signatures
    }

    /// Recompute the root hash of the source tree from the proof tree and the payloads.
    pub fn root_hash(&self) -> CryptoHash {
        // A StateProof's tree refers to exactly its payloads: `build` prunes them together, and
        // `from_bytes_with_limits` checks it. The fallback is unreachable.
        self.tree
            .root_hash(&self.payloads)
            .unwrap_or_else(|| CryptoHash::new([0u8; 32]))
    }

    /// Serialize this proof. Equal proofs always serialize to equal bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        // Safety: serializing into a Vec cannot fail.
        StateProofBytes::from(self).try_to_vec().unwrap()
    }

    /// Deserialize a proof, enforcing the default [`StateProofLimits`].
    pub fn from_bytes(bytes: &[u8]) -> Result<StateProof, StateProofDecodeError> {
        Self::from_bytes_with_limits(bytes, &StateProofLimits::default())
    }

    /// Deserialize a proof, enforcing `limits`.
    ///
    /// Only the structure of the proof is checked here. Whether the proof is signed by a quorum is
    /// checked by [`is_valid`](Self::is_valid).
    pub fn from_bytes_with_limits(
        bytes: &[u8],
        limits: &StateProofLimits,
    ) -> Result<StateProof, StateProofDecodeError> {
        if bytes.len() > limits.max_bytes {
            return Err(StateProofDecodeError::TooLarge {
                field: "bytes",
                limit: limits.max_bytes,
                actual: bytes.len(),
            });
        }

        let proof_bytes = StateProofBytes::try_from_slice(bytes)?;
        Self::from_proof_bytes(proof_bytes, limits)
    }

    fn from_proof_bytes(
        proof_bytes: StateProofBytes,
        limits: &StateProofLimits,
    ) -> Result<StateProof, StateProofDecodeError> {
        check_count("signatures", proof_bytes.signatures.len(), limits.max_signatures)?;
        check_count("payloads", proof_bytes.payloads.len(), limits.max_payloads)?;
        check_count("nodes", proof_bytes.tree.len(), limits.max_nodes)?;

        if proof_bytes.signatures.is_empty() {
            return Err(StateProofDecodeError::Malformed("proof has no signatures"));
        }
        if proof_bytes.payloads.is_empty() {
            return Err(StateProofDecodeError::Malformed("proof has no payloads"));
        }

        let tree = ProofNode::from_flat(&proof_bytes.tree, limits)?;
        if tree.payload_count() != proof_bytes.payloads.len() {
            return Err(StateProofDecodeError::Malformed(
                "proof tree does not refer to every payload exactly once",
            ));
        }

        let mut signatures = BTreeMap::new();
        for (node, signature) in proof_bytes.signatures {
            signatures.entry(node).or_insert(signature);
        }

        Ok(StateProof {
            signatures,
            tree,
            payloads: proof_bytes.payloads,
        })
    }
}

/// Intermediate representation of [`StateProof`] for safe serialization and deserialization.
///
/// Signatures are sorted by node id, the tree is flattened in pre-order, and payloads follow the
/// order of their leaves in the tree.
#[derive(Clone, BorshSerialize, BorshDeserialize)]
pub(crate) struct StateProofBytes {
    signatures: Vec<(NodeId, SignatureBytes)>,
    tree: Vec<ProofNodeBytes>,
    payloads: Vec<Payload>,
}

impl From<&StateProof> for StateProofBytes {
    fn from(state_proof: &StateProof) -> Self {
        StateProofBytes {
            signatures: state_proof
                .signatures
                .iter()
                .map(|(node, signature)| (*node, *signature))
                .collect(),
            tree: state_proof.tree.to_flat(),
            payloads: state_proof.payloads.clone(),
        }
    }
}

fn check_count(field: &'static str, actual: usize, limit: usize) -> Result<(), StateProofDecodeError> {
    if actual > limit {
        Err(StateProofDecodeError::TooLarge {
            field,
            limit,
            actual,
        })
    } else {
        Ok(())
    }
}

/// The ways [`StateProof::build`] can fail.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StateProofError {
    /// No signatures were supplied.
    NoSignatures,

    /// No payload routes were supplied.
    NoPayloads,

    /// A payload route does not lead to a leaf of the source tree.
    InvalidRoute { route: MerkleRoute },
}

impl Display for StateProofError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            StateProofError::NoSignatures => write!(f, "a state proof needs at least one signature"),
            StateProofError::NoPayloads => write!(f, "a state proof needs at least one payload"),
            StateProofError::InvalidRoute { route } => {
                write!(f, "route {} does not lead to a leaf", route)
            }
        }
    }
}

impl std::error::Error for StateProofError {}

/// The ways [`StateProof::from_bytes_with_limits`] can fail.
#[derive(Debug)]
pub enum StateProofDecodeError {
    /// The input exceeds one of the [`StateProofLimits`].
    TooLarge {
        field: &'static str,
        limit: usize,
        actual: usize,
    },

    /// The proof tree is deeper than [`StateProofLimits::max_depth`].
    TooDeep { limit: usize },

    /// The input is valid borsh, but does not describe a well-formed proof.
    Malformed(&'static str),

    /// The input is not a borsh-encoded proof.
    Deserialization(io::Error),
}

impl From<io::Error> for StateProofDecodeError {
    fn from(value: io::Error) -> Self {
        StateProofDecodeError::Deserialization(value)
    }
}

impl Display for StateProofDecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            StateProofDecodeError::TooLarge {
                field,
                limit,
                actual,
            } => write!(f, "state proof has {} {}, limit is {}", actual, field, limit),
            StateProofDecodeError::TooDeep { limit } => {
                write!(f, "state proof tree is deeper than {}", limit)
            }
            StateProofDecodeError::Malformed(reason) => write!(f, "malformed state proof: {}", reason),
            StateProofDecodeError::Deserialization(err) => {
                write!(f, "state proof deserialization failed: {}", err)
            }
        }
    }
}

impl std::error::Error for StateProofDecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StateProofDecodeError::Deserialization(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        crypto_primitives::{Keypair, SigningKey},
        data_types::Weight,
    };
    use rand_core::OsRng;

    struct Fixture {
        keypairs: Vec<Keypair>,
        roster: Roster,
        tree: MerkleNode,
    }

    impl Fixture {
        fn new(nodes: usize) -> Fixture {
            let keypairs: Vec<Keypair> = (0..nodes)
                .map(|_| Keypair::new(SigningKey::generate(&mut OsRng {})))
                .collect();
            let mut roster = Roster::new();
            for (i, keypair) in keypairs.iter().enumerate() {
                roster.put(NodeId::new(i as u64), Weight::new(1), keypair.public());
            }
            let tree = MerkleNode::internal(vec![
                MerkleNode::leaf(b"alpha".to_vec()),
                MerkleNode::internal(vec![
                    MerkleNode::leaf(b"beta".to_vec()),
                    MerkleNode::leaf(b"gamma".to_vec()),
                ]),
                MerkleNode::leaf(b"delta".to_vec()),
            ]);
            Fixture {
                keypairs,
                roster,
                tree,
            }
        }

        fn signatures(&self, signers: impl IntoIterator<Item = usize>) -> Vec<(NodeId, SignatureBytes)> {
            let root_hash = self.tree.hash();
            signers
                .into_iter()
                .map(|i| (NodeId::new(i as u64), self.keypairs[i].sign_hash(&root_hash)))
                .collect()
        }

        fn proof(&self, signers: impl IntoIterator<Item = usize>, routes: &[Vec<u32>]) -> StateProof {
            let routes: Vec<MerkleRoute> = routes.iter().cloned().map(MerkleRoute::new).collect();
            StateProof::build(&self.tree, self.signatures(signers), &routes).unwrap()
        }
    }

    #[test]
    fn proof_signed_by_everyone_is_valid() {
        let fixture = Fixture::new(4);
        let proof = fixture.proof(0..4, &[vec![1, 1]]);

        assert_eq!(proof.payloads(), &[Payload::new(b"gamma".to_vec())]);
        assert_eq!(proof.root_hash(), fixture.tree.hash());
        assert!(proof.is_valid(&fixture.roster, ThresholdKind::SuperMajority));
    }

    #[test]
    fn build_rejects_bad_input() {
        let fixture = Fixture::new(1);
        let route = vec![MerkleRoute::new(vec![0])];

        assert_eq!(
            StateProof::build(&fixture.tree, Vec::new(), &route),
            Err(StateProofError::NoSignatures)
        );
        assert_eq!(
            StateProof::build(&fixture.tree, fixture.signatures([0]), &[]),
            Err(StateProofError::NoPayloads)
        );
        for bad_route in [vec![1], vec![3], vec![0, 0]] {
            let bad_route = MerkleRoute::new(bad_route);
            assert_eq!(
                StateProof::build(&fixture.tree, fixture.signatures([0]), &[bad_route.clone()]),
                Err(StateProofError::InvalidRoute { route: bad_route })
            );
        }
    }

    #[test]
    fn leaf_root_can_be_proven() {
        let keypair = Keypair::new(SigningKey::generate(&mut OsRng {}));
        let mut roster = Roster::new();
        roster.put(NodeId::new(7), Weight::new(10), keypair.public());
        let tree = MerkleNode::leaf(b"only".to_vec());
        let signature = keypair.sign_hash(&tree.hash());

        let proof =
            StateProof::build(&tree, [(NodeId::new(7), signature)], &[MerkleRoute::root()]).unwrap();
        assert!(proof.is_valid(&roster, ThresholdKind::SuperMajority));
    }

    #[test]
    fn repeated_routes_are_proven_once() {
        let fixture = Fixture::new(1);
        let proof = fixture.proof([0], &[vec![2], vec![0], vec![2]]);
        assert_eq!(
            proof.payloads(),
            &[Payload::new(b"alpha".to_vec()), Payload::new(b"delta".to_vec())]
        );
    }

    #[test]
    fn thresholds_depend_on_signer_weight() {
        let fixture = Fixture::new(12);
        let cases = [
            (3, false, false, false),
            (4, true, false, false),
            (7, true, true, false),
            (9, true, true, true),
        ];
        for (signers, strong_minority, majority, super_majority) in cases {
            let proof = fixture.proof(0..signers, &[vec![0]]);
            assert_eq!(proof.is_valid(&fixture.roster, ThresholdKind::StrongMinority), strong_minority);
            assert_eq!(proof.is_valid(&fixture.roster, ThresholdKind::Majority), majority);
            assert_eq!(proof.is_valid(&fixture.roster, ThresholdKind::SuperMajority), super_majority);
        }
    }

    #[test]
    fn zero_weight_roster_never_validates() {
        let fixture = Fixture::new(2);
        let mut roster = Roster::new();
        for (i, keypair) in fixture.keypairs.iter().enumerate() {
            roster.put(NodeId::new(i as u64), Weight::new(0), keypair.public());
        }
        let proof = fixture.proof(0..2, &[vec![0]]);
        assert!(!proof.is_valid(&roster, ThresholdKind::StrongMinority));
    }

    #[test]
    fn serialization_is_independent_of_input_order() {
        let fixture = Fixture::new(4);
        let a = fixture.proof([0, 1, 2], &[vec![0], vec![1, 0]]);
        let b = fixture.proof([2, 0, 1], &[vec![1, 0], vec![0]]);
        assert_eq!(a, b);
        assert_eq!(a.to_bytes(), b.to_bytes());
    }

    #[test]
    fn round_trip_preserves_proof() {
        let fixture = Fixture::new(4);
        let proof = fixture.proof(0..3, &[vec![0], vec![1, 1], vec![2]]);
        let decoded = StateProof::from_bytes(&proof.to_bytes()).unwrap();

        assert_eq!(decoded, proof);
        assert_eq!(decoded.payloads(), proof.payloads());
        assert_eq!(decoded.signatures(), proof.signatures());
        assert!(decoded.is_valid(&fixture.roster, ThresholdKind::SuperMajority));
    }

    #[test]
    fn tampering_with_any_byte_invalidates_proof() {
        let fixture = Fixture::new(4);
        // Three of four signers is the smallest super majority, so losing any signature matters.
        let proof = fixture.proof(0..3, &[vec![1, 0]]);
        assert!(proof.is_valid(&fixture.roster, ThresholdKind::SuperMajority));
        let bytes = proof.to_bytes();

        for i in 0..bytes.len() {
            let mut tampered = bytes.clone();
            tampered[i] ^= 0x01;
            if let Ok(decoded) = StateProof::from_bytes(&tampered) {
                assert!(
                    !decoded.is_valid(&fixture.roster, ThresholdKind::SuperMajority),
                    "flipping byte {} went unnoticed",
                    i
                );
            }
        }
    }

    #[test]
    fn substituted_payload_fails_every_threshold() {
        let fixture = Fixture::new(4);
        let proof = fixture.proof(0..4, &[vec![1, 0]]);
        let mut proof_bytes = StateProofBytes::from(&proof);
        assert_eq!(proof_bytes.payloads, vec![Payload::new(b"beta".to_vec())]);
        proof_bytes.payloads[0] = Payload::new(b"bet4".to_vec());

        let decoded = StateProof::from_bytes(&proof_bytes.try_to_vec().unwrap()).unwrap();
        assert_ne!(decoded.root_hash(), fixture.tree.hash());
        for threshold in [
            ThresholdKind::StrongMinority,
            ThresholdKind::Majority,
            ThresholdKind::SuperMajority,
        ] {
            assert!(proof.is_valid(&fixture.roster, threshold));
            assert!(!decoded.is_valid(&fixture.roster, threshold));
        }

        // The untouched proof still re-encodes to the same bytes.
        let bytes = proof.to_bytes();
        assert_eq!(StateProof::from_bytes(&bytes).unwrap().to_bytes(), bytes);
    }

    #[test]
    fn decoding_enforces_limits() {
        let fixture = Fixture::new(4);
        let bytes = fixture.proof(0..4, &[vec![0], vec![2]]).to_bytes();

        let limits = StateProofLimits::builder().max_bytes(bytes.len() - 1).build();
        assert!(matches!(
            StateProof::from_bytes_with_limits(&bytes, &limits),
            Err(StateProofDecodeError::TooLarge { field: "bytes", .. })
        ));

        let limits = StateProofLimits::builder().max_signatures(3).build();
        assert!(matches!(
            StateProof::from_bytes_with_limits(&bytes, &limits),
            Err(StateProofDecodeError::TooLarge { field: "signatures", limit: 3, actual: 4 })
        ));

        let limits = StateProofLimits::builder().max_payloads(1).build();
        assert!(matches!(
            StateProof::from_bytes_with_limits(&bytes, &limits),
            Err(StateProofDecodeError::TooLarge { field: "payloads", .. })
        ));

        let limits = StateProofLimits::builder().max_depth(0).build();
        assert!(matches!(
            StateProof::from_bytes_with_limits(&bytes, &limits),
            Err(StateProofDecodeError::TooDeep { limit: 0 })
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            StateProof::from_bytes(&[1, 2, 3]),
            Err(StateProofDecodeError::Deserialization(_))
        ));
    }

    #[test]
    fn duplicate_signatures_on_the_wire_count_once() {
        let fixture = Fixture::new(4);
        let proof = fixture.proof([0], &[vec![0]]);
        let mut proof_bytes = StateProofBytes::from(&proof);
        let duplicate = proof_bytes.signatures[0];
        proof_bytes.signatures.extend([duplicate, duplicate]);
        let bytes = proof_bytes.try_to_vec().unwrap();

        let decoded = StateProof::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.signatures().len(), 1);
        assert!(!decoded.is_valid(&fixture.roster, ThresholdKind::StrongMinority));
    }
}
