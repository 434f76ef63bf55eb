//! In-memory certificate authority for TLS test fixtures.
//!
//! A [`RootAuthority`] generates a self-signed RSA root and signs leaf certificates on
//! request. Issued material comes back as a PEM [`KeyPair`], which converts into rustls
//! server and client configurations.

mod authority;
mod error;
mod issuer;
mod keypair;
mod request;
mod trust;

pub use authority::{
    Clock, FixedClock, KEY_SIZE, ROOT_SERIAL, RootAuthority, RootAuthorityBuilder, START_EPOCH,
    SystemClock, VALIDITY_YEARS,
};
pub use error::{CaError, CaResult, SetupOutcome};
pub use keypair::{CertificateInfo, DecodedKeyPair, KeyPair, TlsIdentity};
pub use request::{COUNTRY, CertificateRequest, ExtendedKeyUsage, ORGANIZATION, Subject};
pub use trust::{TrustPool, VerifyError};

/// Operations callers need from a certificate authority, independent of how it signs.
pub trait CertificateAuthority: Send + Sync {
    /// Returns the CA certificate in PEM format.
    fn root_certificate_pem(&self) -> &[u8];

    /// Pool containing only this authority's root.
    fn trust_pool(&self) -> TrustPool;

    /// Issues a certificate with a specialised configuration.
    fn issue_certificate(&self, request: &CertificateRequest) -> CaResult<KeyPair>;

    /// Client configuration trusting this authority.
    fn client_tls_config(&self) -> CaResult<rustls::ClientConfig> {
        self.trust_pool().client_config()
    }

    fn issue_localhost_server_certificate(&self) -> CaResult<KeyPair> {
        self.issue_certificate(&CertificateRequest::localhost_server())
    }

    fn issue_localhost_client_certificate(&self) -> CaResult<KeyPair> {
        self.issue_certificate(&CertificateRequest::localhost_client())
    }
}

impl CertificateAuthority for RootAuthority {
    fn root_certificate_pem(&self) -> &[u8] {
        RootAuthority::root_certificate_pem(self)
    }

    fn trust_pool(&self) -> TrustPool {
        RootAuthority::trust_pool(self)
    }

    fn issue_certificate(&self, request: &CertificateRequest) -> CaResult<KeyPair> {
        RootAuthority::issue_certificate(self, request)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    /// Tests that callers can work through the trait object alone.
    #[test]
    fn authority_as_trait_object() {
        let ca: Arc<dyn CertificateAuthority> =
            Arc::new(RootAuthority::deterministic("authority_as_trait_object").unwrap());
        let pair = ca.issue_localhost_server_certificate().unwrap();
        let leaf = pair.certificate_der().unwrap();
        assert!(ca.trust_pool().verify_server(&leaf, "localhost").is_ok());
        assert!(ca.client_tls_config().is_ok());
        assert!(!ca.root_certificate_pem().is_empty());
    }
}
