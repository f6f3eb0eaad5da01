/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Cryptographic primitives.
//!
//! The definitions and re-exports in this module provide two categories of cryptographic primitives:
//! 1. **Cryptographic Hashes**: provided by the [`sha2`] crate.
//! 2. **Digital Signatures**: provided by the [`ed25519_dalek`] crate.

use super::data_types::{CryptoHash, SignatureBytes};

// re-exports below.
pub use sha2::Digest;
pub use sha2::Sha256 as CryptoHasher;

pub use ed25519_dalek::{Signature, SignatureError, Signer, SigningKey, Verifier, VerifyingKey};

/// A facade around [`SigningKey`] that implements methods for [`sign`](Self::sign)-ing messages as
/// well as a getter for the [`public`](Self::public) key associated with the signing key.
///
/// Signature *generation* belongs to the node's signing subsystem. This facade exists so that exporters
/// (and tests) can produce the signatures over a root hash that a
/// [`StateProof`](crate::state_proof::StateProof) carries.
#[derive(Clone)]
pub struct Keypair(SigningKey);

impl Keypair {
    /// Create a `Keypair` that wraps over `signing_key`.
    pub fn new(signing_key: SigningKey) -> Keypair {
        Keypair(signing_key)
    }

    /// Sign an arbitrary `message` with the `Keypair`.
    pub fn sign(&self, message: &[u8]) -> SignatureBytes {
        SignatureBytes::new(self.0.sign(message).to_bytes())
    }

    /// Sign the bytes of a root hash.
    pub fn sign_hash(&self, hash: &CryptoHash) -> SignatureBytes {
        self.sign(&hash.bytes())
    }

    /// Get the `VerifyingKey` of this `Keypair`.
    pub fn public(&self) -> VerifyingKey {
        self.0.verifying_key()
    }
}

/// Check whether `signature` is a valid signature over `message` by the holder of `public_key`.
pub(crate) fn verify(public_key: &VerifyingKey, message: &[u8], signature: &SignatureBytes) -> bool {
    let signature = Signature::from_bytes(&signature.bytes());
    public_key.verify(message, &signature).is_ok()
}
