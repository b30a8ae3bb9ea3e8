//! Writer identities and signatures.
//!
//! The log only needs three things from an identity: a stable id, a public
//! key (which becomes the replica's clock id), and the ability to sign and
//! verify bytes. [`IdentityProvider`] captures that; [`Ed25519Identity`] is
//! the reference provider.

use std::fmt;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

/// Identity type tag written into entries by [`Ed25519Identity`].
pub const ED25519_IDENTITY_TYPE: &str = "ed25519";

/// Public description of a writer, embedded in every entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Human or application level id of the writer.
    pub id: String,
    /// Hex-encoded public key.
    #[serde(rename = "publicKey")]
    pub public_key: String,
    /// Provider type tag.
    #[serde(rename = "type")]
    pub kind: String,
}

/// Errors from signing or signature decoding.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// The public key is not valid hex or not a valid curve point.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// The signature is not valid hex or has the wrong length.
    #[error("invalid signature encoding: {0}")]
    InvalidSignature(String),

    /// The provider could not produce a signature.
    #[error("signing failed: {0}")]
    Signing(String),
}

/// Signs entries on behalf of one writer and verifies others' signatures.
#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The identity entries are signed as.
    fn identity(&self) -> &Identity;

    /// Sign `data`, returning an encoded signature.
    async fn sign(&self, data: &[u8]) -> Result<String, IdentityError>;

    /// Verify `signature` over `data` against `public_key`.
    ///
    /// Returns `Ok(false)` for a well-formed signature that does not match.
    async fn verify(
        &self,
        signature: &str,
        public_key: &str,
        data: &[u8],
    ) -> Result<bool, IdentityError>;
}

/// Ed25519 identity with hex-encoded keys and signatures.
pub struct Ed25519Identity {
    identity: Identity,
    signing_key: SigningKey,
}

impl Ed25519Identity {
    /// Build an identity from a 32-byte secret seed.
    #[must_use]
    pub fn from_seed(id: impl Into<String>, seed: [u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(&seed);
        let public_key = hex::encode(signing_key.verifying_key().to_bytes());
        Self {
            identity: Identity {
                id: id.into(),
                public_key,
                kind: ED25519_IDENTITY_TYPE.to_owned(),
            },
            signing_key,
        }
    }

    /// Verify an ed25519 signature without needing a signing key.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::InvalidPublicKey`] or
    /// [`IdentityError::InvalidSignature`] when the encodings are unusable.
    pub fn verify_detached(
        signature: &str,
        public_key: &str,
        data: &[u8],
    ) -> Result<bool, IdentityError> {
        let key_bytes: [u8; 32] = hex::decode(public_key)
            .map_err(|e| IdentityError::InvalidPublicKey(e.to_string()))?
            .try_into()
            .map_err(|_| IdentityError::InvalidPublicKey("expected 32 bytes".into()))?;
        let verifying_key = VerifyingKey::from_bytes(&key_bytes)
            .map_err(|e| IdentityError::InvalidPublicKey(e.to_string()))?;

        let sig_bytes: [u8; 64] = hex::decode(signature)
            .map_err(|e| IdentityError::InvalidSignature(e.to_string()))?
            .try_into()
            .map_err(|_| IdentityError::InvalidSignature("expected 64 bytes".into()))?;
        let signature = Signature::from_bytes(&sig_bytes);

        Ok(verifying_key.verify(data, &signature).is_ok())
    }
}

impl fmt::Debug for Ed25519Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ed25519Identity")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl IdentityProvider for Ed25519Identity {
    fn identity(&self) -> &Identity {
        &self.identity
    }

    async fn sign(&self, data: &[u8]) -> Result<String, IdentityError> {
        let signature: Signature = self.signing_key.sign(data);
        Ok(hex::encode(signature.to_bytes()))
    }

    async fn verify(
        &self,
        signature: &str,
        public_key: &str,
        data: &[u8],
    ) -> Result<bool, IdentityError> {
        Self::verify_detached(signature, public_key, data)
    }
}
