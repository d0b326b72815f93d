//! Asymmetric sealing of the MAC chain.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

use trail_events::AuditError;

/// Signature primitives known to the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    Ed25519,
}

impl SignatureAlgorithm {
    pub fn from_name(name: &str) -> Result<Self, AuditError> {
        match name {
            "ed25519" => Ok(Self::Ed25519),
            other => Err(AuditError::Crypto(format!(
                "unknown signature algorithm '{other}'"
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Ed25519 => "ed25519",
        }
    }
}

/// Signs signature rows. The input binds the previous signature (empty on
/// the first) to the most recent MAC cell text, so each signature seals
/// the whole chain prefix.
pub struct RowSigner {
    algorithm: SignatureAlgorithm,
    key: SigningKey,
}

impl std::fmt::Debug for RowSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowSigner")
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

impl RowSigner {
    pub fn new(algorithm: SignatureAlgorithm, key: SigningKey) -> Self {
        Self { algorithm, key }
    }

    pub fn sign(&self, last_signature: &[u8], last_mac: &str) -> Vec<u8> {
        match self.algorithm {
            SignatureAlgorithm::Ed25519 => {
                let signature = self.key.sign(&signing_input(last_signature, last_mac));
                signature.to_bytes().to_vec()
            }
        }
    }
}

/// Verifies signature rows during offline replay.
#[derive(Debug)]
pub struct RowVerifier {
    algorithm: SignatureAlgorithm,
    key: VerifyingKey,
}

impl RowVerifier {
    pub fn new(algorithm: SignatureAlgorithm, key: VerifyingKey) -> Self {
        Self { algorithm, key }
    }

    /// Returns false for a well-formed but wrong signature; malformed
    /// signature bytes are also reported as false since they can only
    /// come from tampering.
    pub fn verify(&self, last_signature: &[u8], last_mac: &str, signature: &[u8]) -> bool {
        match self.algorithm {
            SignatureAlgorithm::Ed25519 => {
                let Ok(signature) = Signature::from_slice(signature) else {
                    return false;
                };
                self.key
                    .verify(&signing_input(last_signature, last_mac), &signature)
                    .is_ok()
            }
        }
    }
}

fn signing_input(last_signature: &[u8], last_mac: &str) -> Vec<u8> {
    let mut input = Vec::with_capacity(last_signature.len() + last_mac.len());
    input.extend_from_slice(last_signature);
    input.extend_from_slice(last_mac.as_bytes());
    input
}
