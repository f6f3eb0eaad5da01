//! Rosters of freshly generated keys.

use keystone_rs::types::{
    crypto_primitives::{Keypair, SigningKey},
    data_types::{CryptoHash, NodeId, SignatureBytes, Weight},
    roster::Roster,
};
use rand_core::OsRng;

pub(crate) struct TestRoster {
    pub(crate) keypairs: Vec<Keypair>,
    pub(crate) roster: Roster,
}

impl TestRoster {
    /// Create a roster in which node `i` has weight `weights[i]`.
    pub(crate) fn new(weights: &[u64]) -> TestRoster {
        let mut csprg = OsRng {};
        let keypairs: Vec<Keypair> = weights
            .iter()
            .map(|_| Keypair::new(SigningKey::generate(&mut csprg)))
            .collect();

        let mut roster = Roster::new();
        for (i, (keypair, weight)) in keypairs.iter().zip(weights).enumerate() {
            roster.put(NodeId::new(i as u64), Weight::new(*weight), keypair.public());
        }

        TestRoster { keypairs, roster }
    }

    /// Create a roster of `n` nodes of weight 1.
    pub(crate) fn equal(n: usize) -> TestRoster {
        Self::new(&vec![1; n])
    }

    /// Get the signatures of `signers` over `root_hash`.
    pub(crate) fn sign(
        &self,
        root_hash: &CryptoHash,
        signers: impl IntoIterator<Item = usize>,
    ) -> Vec<(NodeId, SignatureBytes)> {
        signers
            .into_iter()
            .map(|i| (NodeId::new(i as u64), self.keypairs[i].sign_hash(root_hash)))
            .collect()
    }
}
