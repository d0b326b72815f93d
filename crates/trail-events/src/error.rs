//! The audit error taxonomy shared across the workspace.

use std::path::PathBuf;

use thiserror::Error;

/// Every failure class the audit subsystem reports.
///
/// Sinks and the service map their internal failures onto these variants;
/// callers match on the class, not on message text.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Client-shaped input error: missing mandatory fields, unknown action.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Unknown topic or a mutation verb the service does not support.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// `read` for an identifier not present in the log.
    #[error("no event found for id '{0}'")]
    NotFound(String),

    /// The service is not in its running state.
    #[error("audit service unavailable ({0})")]
    Unavailable(&'static str),

    /// MAC/signature primitive failure or malformed key material.
    #[error("cryptographic failure: {0}")]
    Crypto(String),

    /// Missing alias, wrong password or a corrupt key store container.
    #[error("key store failure: {0}")]
    KeyStore(String),

    /// File I/O failure on read or append.
    #[error("I/O failure on {0}: {1}")]
    Io(PathBuf, std::io::Error),

    /// Anything unclassified.
    #[error("internal audit failure: {0}")]
    Internal(String),
}

impl AuditError {
    /// Shorthand for wrapping an I/O error with the path it concerned.
    pub fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Self::Io(path.into(), err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failure_class() {
        let err = AuditError::BadRequest("missing transactionId".into());
        assert_eq!(err.to_string(), "bad request: missing transactionId");

        let err = AuditError::NotFound("_id9".into());
        assert_eq!(err.to_string(), "no event found for id '_id9'");

        let err = AuditError::io(
            "/tmp/access.csv",
            std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        );
        assert!(err.to_string().contains("/tmp/access.csv"));
        assert!(err.to_string().contains("disk full"));
    }
}
