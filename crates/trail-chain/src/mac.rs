//! Keyed MAC chain over canonicalized rows.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use trail_events::AuditError;

type HmacSha256 = Hmac<Sha256>;

/// Label under which the next chain secret is derived from the current
/// one. Changing this breaks every existing log.
const RATCHET_LABEL: &[u8] = b"trail-chain/key-ratchet/v1";

/// MAC primitives known to the chain. Writer and verifier must agree on
/// the name fixed at file creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacAlgorithm {
    HmacSha256,
}

impl MacAlgorithm {
    pub fn from_name(name: &str) -> Result<Self, AuditError> {
        match name {
            "hmac-sha256" => Ok(Self::HmacSha256),
            other => Err(AuditError::Crypto(format!("unknown MAC algorithm '{other}'"))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::HmacSha256 => "hmac-sha256",
        }
    }
}

/// Computes per-row MACs under a forward-ratcheted secret.
///
/// `mac` hands back the digest together with the derived next secret; the
/// caller decides when to commit it, so a failed append never advances the
/// chain. Once committed, prior secrets are unrecoverable from the engine.
#[derive(Clone)]
pub struct MacEngine {
    algorithm: MacAlgorithm,
    secret: Vec<u8>,
}

impl std::fmt::Debug for MacEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // never print secret material
        f.debug_struct("MacEngine")
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

impl MacEngine {
    pub fn new(algorithm: MacAlgorithm, secret: Vec<u8>) -> Self {
        Self { algorithm, secret }
    }

    pub fn algorithm(&self) -> MacAlgorithm {
        self.algorithm
    }

    /// The current chain secret, as held in memory.
    pub fn secret(&self) -> &[u8] {
        &self.secret
    }

    /// MACs the concatenated cell texts and derives the next secret.
    pub fn mac(&self, cells: &[String]) -> Result<(Vec<u8>, Vec<u8>), AuditError> {
        let digest = self.digest(cells)?;
        let next = self.next_secret()?;
        Ok((digest, next))
    }

    /// Constant-time check of `expected` against a fresh MAC over `cells`.
    pub fn verify(&self, cells: &[String], expected: &[u8]) -> Result<bool, AuditError> {
        let mut mac = self.mac_instance()?;
        for cell in cells {
            mac.update(cell.as_bytes());
        }
        Ok(mac.verify_slice(expected).is_ok())
    }

    /// Derives the successor secret without committing it.
    pub fn next_secret(&self) -> Result<Vec<u8>, AuditError> {
        let mut mac = self.mac_instance()?;
        mac.update(RATCHET_LABEL);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    /// Replaces the chain secret with an already-derived successor.
    pub fn commit(&mut self, next_secret: Vec<u8>) {
        self.secret = next_secret;
    }

    fn digest(&self, cells: &[String]) -> Result<Vec<u8>, AuditError> {
        let mut mac = self.mac_instance()?;
        for cell in cells {
            mac.update(cell.as_bytes());
        }
        Ok(mac.finalize().into_bytes().to_vec())
    }

    fn mac_instance(&self) -> Result<HmacSha256, AuditError> {
        match self.algorithm {
            MacAlgorithm::HmacSha256 => HmacSha256::new_from_slice(&self.secret)
                .map_err(|err| AuditError::Crypto(format!("initializing row MAC: {err}"))),
        }
    }
}
