//! Error taxonomy for the certificate authority.

use tracing::warn;

/// The result type for CA operations.
pub type CaResult<T> = Result<T, CaError>;

#[derive(Debug, thiserror::Error)]
pub enum CaError {
    #[error("failed to generate key pair: {0}")]
    KeyGeneration(String),
    #[error("failed to create certificate: {0}")]
    CertificateCreation(String),
    #[error("failed to encode {what}: {reason}")]
    Encoding { what: &'static str, reason: String },
    #[error("failed to decode key pair: {0}")]
    Decoding(String),
    #[error("failed to build TLS configuration: {0}")]
    TlsConfig(#[source] rustls::Error),
}

impl CaError {
    /// Returns true for failures that leave the caller without a usable authority or
    /// certificate. Retrying with the same inputs will not help, so the dependent scope
    /// should be skipped.
    pub fn is_setup_failure(&self) -> bool {
        !matches!(self, CaError::Decoding(_))
    }

    pub(crate) fn encoding(what: &'static str, reason: impl ToString) -> Self {
        CaError::Encoding {
            what,
            reason: reason.to_string(),
        }
    }
}

impl From<rcgen::Error> for CaError {
    fn from(err: rcgen::Error) -> Self {
        CaError::CertificateCreation(err.to_string())
    }
}

/// Turns setup failures into an explicit "skip this scope" signal.
///
/// ```no_run
/// use testca::{RootAuthority, SetupOutcome};
///
/// let Some(ca) = RootAuthority::generate().or_skip()? else {
///     return Ok(());
/// };
/// # let _ = ca;
/// # Ok::<(), testca::CaError>(())
/// ```
pub trait SetupOutcome<T> {
    /// `Ok(Some(value))` on success, `Ok(None)` after logging a setup failure, and `Err` for
    /// anything the caller is expected to handle (malformed key pairs).
    fn or_skip(self) -> CaResult<Option<T>>;
}

impl<T> SetupOutcome<T> for CaResult<T> {
    fn or_skip(self) -> CaResult<Option<T>> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_setup_failure() => {
                warn!("skipping: certificate authority setup failed: {}", err);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}
