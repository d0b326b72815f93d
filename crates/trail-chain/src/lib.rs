//! Tamper-evident log chain for the trail audit workspace.
//!
//! A secure writer appends event rows to a CSV log, maintains a per-row
//! keyed MAC under a forward-ratcheted secret and periodically seals the
//! chain with an asymmetric signature row. The paired verifier replays the
//! whole computation offline and rejects any mutation, insertion, deletion
//! or truncation short of a signed boundary. Secrets live in a
//! password-protected key store container under well-known aliases.

pub mod codec;
pub mod keystore;
pub mod mac;
pub mod signer;
pub mod verifier;
pub mod writer;

pub use keystore::{
    KeyStore, CURRENT_KEY_ALIAS, CURRENT_SIGNATURE_ALIAS, INITIAL_KEY_ALIAS, SIGNATURE_ALIAS,
};
pub use mac::{MacAlgorithm, MacEngine};
pub use signer::{RowSigner, RowVerifier, SignatureAlgorithm};
pub use verifier::{LogVerifier, VerifyOutcome};
pub use writer::{SecureCsvWriter, SecureWriterOptions};
