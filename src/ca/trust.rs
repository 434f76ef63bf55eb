//! Trust pools and TLS configuration plumbing.

use std::fmt;
use std::sync::Arc;

use rustls::client::WebPkiServerVerifier;
use rustls::client::danger::ServerCertVerifier;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, InvalidDnsNameError, ServerName, UnixTime};
use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, RootCertStore, SupportedProtocolVersion};

use super::error::{CaError, CaResult};

/// Every configuration built here refuses anything older than TLS 1.2.
pub(crate) const PROTOCOL_VERSIONS: &[&SupportedProtocolVersion] =
    &[&rustls::version::TLS13, &rustls::version::TLS12];

pub(crate) fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("failed to build verifier: {0}")]
    Builder(#[from] rustls::client::VerifierBuilderError),
    #[error("invalid server name: {0}")]
    ServerName(#[from] InvalidDnsNameError),
    #[error("certificate rejected: {0}")]
    Rejected(#[from] rustls::Error),
}

/// Set of root certificates a verifier trusts.
#[derive(Clone)]
pub struct TrustPool {
    roots: Arc<RootCertStore>,
}

impl TrustPool {
    pub(crate) fn with_root(root: CertificateDer<'static>) -> Self {
        let mut roots = RootCertStore::empty();
        let (added, _) = roots.add_parsable_certificates([root]);
        debug_assert_eq!(added, 1);
        Self {
            roots: Arc::new(roots),
        }
    }

    /// Builds a pool from every `CERTIFICATE` block in `pem`.
    pub fn from_pem(pem: &[u8]) -> CaResult<Self> {
        let mut roots = RootCertStore::empty();
        for cert in CertificateDer::pem_slice_iter(pem) {
            let cert = cert.map_err(|e| CaError::Decoding(format!("certificate: {}", e)))?;
            roots
                .add(cert)
                .map_err(|e| CaError::Decoding(format!("trust anchor: {}", e)))?;
        }
        if roots.is_empty() {
            return Err(CaError::Decoding("no certificates in trust pool".to_string()));
        }
        Ok(Self {
            roots: Arc::new(roots),
        })
    }

    pub fn roots(&self) -> Arc<RootCertStore> {
        Arc::clone(&self.roots)
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Client configuration trusting this pool, without a client certificate.
    pub fn client_config(&self) -> CaResult<ClientConfig> {
        Ok(ClientConfig::builder_with_provider(provider())
            .with_protocol_versions(PROTOCOL_VERSIONS)
            .map_err(CaError::TlsConfig)?
            .with_root_certificates(self.roots())
            .with_no_client_auth())
    }

    /// Checks that `cert` chains to this pool and is valid as a server certificate for
    /// `server_name` right now.
    pub fn verify_server(
        &self,
        cert: &CertificateDer<'_>,
        server_name: &str,
    ) -> Result<(), VerifyError> {
        let verifier = WebPkiServerVerifier::builder_with_provider(self.roots(), provider()).build()?;
        let server_name = ServerName::try_from(server_name)?;
        verifier.verify_server_cert(cert, &[], &server_name, &[], UnixTime::now())?;
        Ok(())
    }

    /// Checks that `cert` chains to this pool and is valid as a client certificate right now.
    pub fn verify_client(&self, cert: &CertificateDer<'_>) -> Result<(), VerifyError> {
        let verifier = WebPkiClientVerifier::builder_with_provider(self.roots(), provider()).build()?;
        verifier.verify_client_cert(cert, &[], UnixTime::now())?;
        Ok(())
    }
}

impl fmt::Debug for TrustPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustPool")
            .field("roots", &self.roots.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ca::RootAuthority;

    /// Tests that a leaf verifies against its own authority's pool only.
    #[test]
    fn pool_accepts_own_leaves_only() {
        let a = RootAuthority::deterministic("pool_accepts_own_leaves_only/a").unwrap();
        let b = RootAuthority::deterministic("pool_accepts_own_leaves_only/b").unwrap();
        let leaf = a
            .issue_localhost_server_certificate()
            .unwrap()
            .certificate_der()
            .unwrap();

        assert_eq!(a.trust_pool().len(), 1);
        assert!(a.trust_pool().verify_server(&leaf, "localhost").is_ok());
        assert!(a.trust_pool().verify_server(&leaf, "127.0.0.1").is_ok());
        assert!(matches!(
            b.trust_pool().verify_server(&leaf, "localhost"),
            Err(VerifyError::Rejected(_))
        ));
    }

    /// Tests that extended key usage is enforced per TLS role.
    #[test]
    fn usage_is_enforced() {
        let ca = RootAuthority::deterministic("usage_is_enforced").unwrap();
        let server = ca
            .issue_localhost_server_certificate()
            .unwrap()
            .certificate_der()
            .unwrap();
        let client = ca
            .issue_localhost_client_certificate()
            .unwrap()
            .certificate_der()
            .unwrap();

        let pool = ca.trust_pool();
        assert!(pool.verify_client(&client).is_ok());
        assert!(pool.verify_client(&server).is_err());
        assert!(pool.verify_server(&client, "localhost").is_err());
    }

    #[test]
    fn hostname_is_checked() {
        let ca = RootAuthority::deterministic("hostname_is_checked").unwrap();
        let leaf = ca
            .issue_localhost_server_certificate()
            .unwrap()
            .certificate_der()
            .unwrap();
        assert!(ca.trust_pool().verify_server(&leaf, "example.com").is_err());
    }

    #[test]
    fn pool_from_pem() {
        let ca = RootAuthority::deterministic("pool_from_pem").unwrap();
        let pool = TrustPool::from_pem(ca.root_certificate_pem()).unwrap();
        assert_eq!(pool.len(), 1);
        assert!(matches!(
            TrustPool::from_pem(b"garbage"),
            Err(CaError::Decoding(_))
        ));
    }
}
