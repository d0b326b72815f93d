//! Offline replay of a secure log.

use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;

use trail_events::{AlgorithmsConfig, AuditError};

use crate::codec::{self, MAC_COLUMN, SIGNATURE_COLUMN};
use crate::keystore::{KeyStore, INITIAL_KEY_ALIAS, SIGNATURE_ALIAS};
use crate::mac::{MacAlgorithm, MacEngine};
use crate::signer::{RowVerifier, SignatureAlgorithm};

/// Verdict of one verification run. Tampering is a verdict, not an error;
/// errors are reserved for being unable to run at all (missing file,
/// unreadable key store).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    Valid {
        data_rows: usize,
        signature_rows: usize,
    },
    Invalid {
        /// 1-based row number, counting the header.
        row: usize,
        reason: String,
    },
}

impl VerifyOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }

    fn invalid(row: usize, reason: impl Into<String>) -> Self {
        Self::Invalid {
            row,
            reason: reason.into(),
        }
    }
}

/// Replays the MAC chain and signature rows of a log file, deciding
/// valid or invalid.
#[derive(Debug, Clone, Copy)]
pub struct LogVerifier {
    mac_algorithm: MacAlgorithm,
    signature_algorithm: SignatureAlgorithm,
}

impl LogVerifier {
    pub fn new(mac_algorithm: MacAlgorithm, signature_algorithm: SignatureAlgorithm) -> Self {
        Self {
            mac_algorithm,
            signature_algorithm,
        }
    }

    /// Resolves the configured algorithm names; they must match the ones
    /// the writer was created with or every row will fail.
    pub fn from_config(algorithms: &AlgorithmsConfig) -> Result<Self, AuditError> {
        Ok(Self::new(
            MacAlgorithm::from_name(&algorithms.mac)?,
            SignatureAlgorithm::from_name(&algorithms.signature)?,
        ))
    }

    /// Verifies `path` against the chain seeds in `keystore`.
    ///
    /// A file is valid iff the header ends in the two fixed columns,
    /// every data row re-MACs under the replayed ratchet, every signature
    /// row verifies against the chain so far and the final row is a
    /// signature row.
    pub fn verify(&self, path: &Path, keystore: &KeyStore) -> Result<VerifyOutcome, AuditError> {
        let mut reader = codec::RowReader::open(path)?;

        let Some(header) = reader.next_row()? else {
            return Ok(VerifyOutcome::invalid(1, "log is empty"));
        };
        if header.len() < 3
            || header[header.len() - 2] != MAC_COLUMN
            || header[header.len() - 1] != SIGNATURE_COLUMN
        {
            return Ok(VerifyOutcome::invalid(
                1,
                format!("header does not end in '{MAC_COLUMN}','{SIGNATURE_COLUMN}'"),
            ));
        }
        let width = header.len() - 2;

        let mut engine = MacEngine::new(
            self.mac_algorithm,
            keystore.read_secret(INITIAL_KEY_ALIAS)?,
        );
        let row_verifier = RowVerifier::new(
            self.signature_algorithm,
            keystore.read_public(SIGNATURE_ALIAS)?,
        );

        let mut last_signature: Vec<u8> = Vec::new();
        let mut last_mac = String::new();
        let mut ends_signed = false;
        let mut data_rows = 0usize;
        let mut signature_rows = 0usize;
        let mut row_number = 1usize;

        while let Some(row) = reader.next_row()? {
            row_number += 1;
            if row.len() != header.len() {
                return Ok(VerifyOutcome::invalid(
                    row_number,
                    format!("expected {} cells, found {}", header.len(), row.len()),
                ));
            }

            let signature_cell = &row[width + 1];
            if !signature_cell.is_empty() {
                let Ok(signature) = STANDARD.decode(signature_cell) else {
                    return Ok(VerifyOutcome::invalid(row_number, "signature cell is not base64"));
                };
                if !row_verifier.verify(&last_signature, &last_mac, &signature) {
                    return Ok(VerifyOutcome::invalid(
                        row_number,
                        "signature does not bind the chain",
                    ));
                }
                last_signature = signature;
                signature_rows += 1;
                ends_signed = true;
            } else {
                let mac_cell = &row[width];
                if mac_cell.is_empty() {
                    return Ok(VerifyOutcome::invalid(row_number, "data row is missing its MAC"));
                }
                let Ok(expected) = STANDARD.decode(mac_cell) else {
                    return Ok(VerifyOutcome::invalid(row_number, "MAC cell is not base64"));
                };
                if !engine.verify(&row[..width], &expected)? {
                    return Ok(VerifyOutcome::invalid(row_number, "MAC mismatch"));
                }
                let next = engine.next_secret()?;
                engine.commit(next);
                last_mac = mac_cell.clone();
                data_rows += 1;
                ends_signed = false;
            }
        }

        if !ends_signed {
            return Ok(VerifyOutcome::invalid(
                row_number,
                "log does not end with a signature row",
            ));
        }

        debug!(path = %path.display(), data_rows, signature_rows, "log verified");
        Ok(VerifyOutcome::Valid {
            data_rows,
            signature_rows,
        })
    }
}
