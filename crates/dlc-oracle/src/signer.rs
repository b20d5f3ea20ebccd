//! Signing capability used by the engine.

use dlc_oracle_core::{
    CryptoError, NonceKeypair, OracleKeypair, SchnorrPublicKey, SchnorrSignature, SecretScalar,
};

/// Everything the oracle needs from its key material.
///
/// Messages are raw bytes; implementations hash them the same way
/// [`OracleKeypair`] does so that third parties can verify the results.
pub trait SigningBackend: Send + Sync {
    /// The oracle's x-only public key.
    fn public_key(&self) -> SchnorrPublicKey;

    /// A fresh one-time nonce for a future attestation.
    fn generate_nonce(&self) -> Result<NonceKeypair, CryptoError>;

    /// Sign with the oracle key and an internally chosen nonce.
    fn sign(&self, message: &[u8]) -> Result<SchnorrSignature, CryptoError>;

    /// Sign with the oracle key and a previously committed nonce.
    fn sign_with_nonce(
        &self,
        message: &[u8],
        nonce: &SecretScalar,
    ) -> Result<SchnorrSignature, CryptoError>;

    fn verify(&self, message: &[u8], signature: &SchnorrSignature) -> Result<(), CryptoError> {
        self.public_key().verify(message, signature)
    }
}

/// A signing backend holding the key in process memory.
#[derive(Debug, Clone)]
pub struct LocalSigner {
    keypair: OracleKeypair,
}

impl LocalSigner {
    pub fn new(keypair: OracleKeypair) -> Self {
        Self { keypair }
    }
}

impl SigningBackend for LocalSigner {
    fn public_key(&self) -> SchnorrPublicKey {
        self.keypair.public_key()
    }

    fn generate_nonce(&self) -> Result<NonceKeypair, CryptoError> {
        Ok(NonceKeypair::generate())
    }

    fn sign(&self, message: &[u8]) -> Result<SchnorrSignature, CryptoError> {
        self.keypair.sign(message)
    }

    fn sign_with_nonce(
        &self,
        message: &[u8],
        nonce: &SecretScalar,
    ) -> Result<SchnorrSignature, CryptoError> {
        self.keypair.sign_with_nonce(message, nonce)
    }
}
