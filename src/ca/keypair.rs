//! PEM key pairs and their conversion into TLS identities and configurations.

use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::sha2::Sha256;
use rsa::{RsaPrivateKey, RsaPublicKey};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::sign::CertifiedKey;
use rustls::{ClientConfig, ServerConfig};
use time::OffsetDateTime;
use x509_parser::extensions::GeneralName;
use x509_parser::parse_x509_certificate;
use x509_parser::x509::AttributeTypeAndValue;

use super::error::{CaError, CaResult};
use super::request::ExtendedKeyUsage;
use super::trust::{PROTOCOL_VERSIONS, TrustPool, provider};

/// A certificate and its private key, both PEM encoded.
///
/// The certificate is a `CERTIFICATE` block and the key a PKCS#1 `RSA PRIVATE KEY` block.
/// Decoding also accepts PKCS#8 `PRIVATE KEY` blocks so pairs from other tools can be loaded.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyPair {
    certificate: Vec<u8>,
    private_key: Vec<u8>,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("certificate", &String::from_utf8_lossy(&self.certificate))
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Decoded form of a [`KeyPair`].
pub struct DecodedKeyPair {
    pub certificate: CertificateDer<'static>,
    pub info: CertificateInfo,
    pub private_key: RsaPrivateKey,
}

impl KeyPair {
    pub fn new(certificate: Vec<u8>, private_key: Vec<u8>) -> Self {
        Self {
            certificate,
            private_key,
        }
    }

    pub fn certificate_pem(&self) -> &[u8] {
        &self.certificate
    }

    pub fn private_key_pem(&self) -> &[u8] {
        &self.private_key
    }

    /// Parses both PEM blocks.
    pub fn decode(&self) -> CaResult<DecodedKeyPair> {
        let certificate = self.certificate_der()?;
        let info = CertificateInfo::from_der(&certificate)?;
        let private_key = self.private_key()?;
        Ok(DecodedKeyPair {
            certificate,
            info,
            private_key,
        })
    }

    pub fn certificate_der(&self) -> CaResult<CertificateDer<'static>> {
        CertificateDer::from_pem_slice(&self.certificate)
            .map_err(|e| CaError::Decoding(format!("certificate: {}", e)))
    }

    pub fn certificate_info(&self) -> CaResult<CertificateInfo> {
        CertificateInfo::from_der(&self.certificate_der()?)
    }

    pub fn private_key(&self) -> CaResult<RsaPrivateKey> {
        let pem = std::str::from_utf8(&self.private_key)
            .map_err(|e| CaError::Decoding(format!("private key: {}", e)))?;
        RsaPrivateKey::from_pkcs1_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem))
            .map_err(|e| CaError::Decoding(format!("private key: {}", e)))
    }

    /// RSASSA-PKCS1-v1_5 signer over SHA-256 for the private key.
    pub fn signer(&self) -> CaResult<SigningKey<Sha256>> {
        Ok(SigningKey::new(self.private_key()?))
    }

    /// Identity usable by a TLS endpoint. Fails if the key does not belong to the certificate.
    pub fn tls_identity(&self) -> CaResult<TlsIdentity> {
        let certificate = self.certificate_der()?;
        let private_key = self.private_key()?;

        let (_, parsed) = parse_x509_certificate(certificate.as_ref())
            .map_err(|e| CaError::Decoding(format!("certificate: {}", e)))?;
        let public_key = RsaPublicKey::from_public_key_der(parsed.public_key().raw)
            .map_err(|e| CaError::Decoding(format!("certificate public key: {}", e)))?;
        if public_key != private_key.to_public_key() {
            return Err(CaError::Decoding(
                "private key does not match certificate".to_string(),
            ));
        }

        let key = PrivateKeyDer::from_pem_slice(&self.private_key)
            .map_err(|e| CaError::Decoding(format!("private key: {}", e)))?;
        Ok(TlsIdentity {
            cert_chain: vec![certificate],
            key,
        })
    }

    /// Server configuration presenting this pair, TLS 1.2 or newer, no client authentication.
    pub fn server_tls_config(&self) -> CaResult<ServerConfig> {
        let (cert_chain, key) = self.tls_identity()?.into_parts();
        ServerConfig::builder_with_provider(provider())
            .with_protocol_versions(PROTOCOL_VERSIONS)
            .map_err(CaError::TlsConfig)?
            .with_no_client_auth()
            .with_single_cert(cert_chain, key)
            .map_err(|e| CaError::Decoding(e.to_string()))
    }

    /// Server configuration that requires clients to present a certificate chained to `clients`.
    pub fn mutual_server_tls_config(&self, clients: &TrustPool) -> CaResult<ServerConfig> {
        let (cert_chain, key) = self.tls_identity()?.into_parts();
        let verifier = WebPkiClientVerifier::builder_with_provider(clients.roots(), provider())
            .build()
            .map_err(|e| CaError::TlsConfig(rustls::Error::General(e.to_string())))?;
        ServerConfig::builder_with_provider(provider())
            .with_protocol_versions(PROTOCOL_VERSIONS)
            .map_err(CaError::TlsConfig)?
            .with_client_cert_verifier(verifier)
            .with_single_cert(cert_chain, key)
            .map_err(|e| CaError::Decoding(e.to_string()))
    }

    /// Client configuration trusting `servers` and presenting this pair as client identity.
    pub fn client_tls_config(&self, servers: &TrustPool) -> CaResult<ClientConfig> {
        let (cert_chain, key) = self.tls_identity()?.into_parts();
        ClientConfig::builder_with_provider(provider())
            .with_protocol_versions(PROTOCOL_VERSIONS)
            .map_err(CaError::TlsConfig)?
            .with_root_certificates(servers.roots())
            .with_client_auth_cert(cert_chain, key)
            .map_err(|e| CaError::Decoding(e.to_string()))
    }
}

/// Certificate chain and private key ready for a TLS endpoint.
pub struct TlsIdentity {
    cert_chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
}

impl TlsIdentity {
    pub fn cert_chain(&self) -> &[CertificateDer<'static>] {
        &self.cert_chain
    }

    pub fn key(&self) -> &PrivateKeyDer<'static> {
        &self.key
    }

    pub fn into_parts(self) -> (Vec<CertificateDer<'static>>, PrivateKeyDer<'static>) {
        (self.cert_chain, self.key)
    }

    /// Signing handle for certificate resolvers.
    pub fn certified_key(&self) -> CaResult<Arc<CertifiedKey>> {
        let signing_key = rustls::crypto::ring::sign::any_supported_type(&self.key)
            .map_err(|e| CaError::Decoding(e.to_string()))?;
        Ok(Arc::new(CertifiedKey::new(
            self.cert_chain.clone(),
            signing_key,
        )))
    }
}

impl Clone for TlsIdentity {
    fn clone(&self) -> Self {
        Self {
            cert_chain: self.cert_chain.clone(),
            key: self.key.clone_key(),
        }
    }
}

impl fmt::Debug for TlsIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsIdentity")
            .field("cert_chain", &self.cert_chain.len())
            .finish_non_exhaustive()
    }
}

/// Fields of a certificate that tests commonly assert on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    pub serial: u64,
    pub subject: String,
    pub issuer: String,
    pub common_name: Option<String>,
    pub organization: Option<String>,
    pub country: Option<String>,
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
    pub dns_names: Vec<String>,
    pub ip_addresses: Vec<IpAddr>,
    pub extended_key_usage: BTreeSet<ExtendedKeyUsage>,
    pub is_ca: bool,
    pub digital_signature: bool,
    pub key_cert_sign: bool,
}

impl CertificateInfo {
    pub fn from_der(der: &CertificateDer<'_>) -> CaResult<Self> {
        let decoding = |e: &dyn fmt::Display| CaError::Decoding(format!("certificate: {}", e));

        let (_, cert) = parse_x509_certificate(der.as_ref()).map_err(|e| decoding(&e))?;

        let serial = cert
            .raw_serial()
            .iter()
            .try_fold(0u64, |acc, byte| {
                acc.checked_mul(256).map(|acc| acc | u64::from(*byte))
            })
            .ok_or_else(|| CaError::Decoding("serial number does not fit in 64 bits".to_string()))?;

        let subject = cert.subject();
        let common_name = first_value(subject.iter_common_name());
        let organization = first_value(subject.iter_organization());
        let country = first_value(subject.iter_country());

        let mut dns_names = Vec::new();
        let mut ip_addresses = Vec::new();
        if let Some(san) = cert.subject_alternative_name().map_err(|e| decoding(&e))? {
            for name in &san.value.general_names {
                match name {
                    GeneralName::DNSName(host) => dns_names.push(host.to_string()),
                    GeneralName::IPAddress(bytes) => {
                        if let Some(ip) = ip_from_bytes(bytes) {
                            ip_addresses.push(ip);
                        }
                    }
                    _ => {}
                }
            }
        }

        let mut extended_key_usage = BTreeSet::new();
        if let Some(eku) = cert.extended_key_usage().map_err(|e| decoding(&e))? {
            if eku.value.server_auth {
                extended_key_usage.insert(ExtendedKeyUsage::ServerAuth);
            }
            if eku.value.client_auth {
                extended_key_usage.insert(ExtendedKeyUsage::ClientAuth);
            }
        }

        let is_ca = cert
            .basic_constraints()
            .map_err(|e| decoding(&e))?
            .is_some_and(|bc| bc.value.ca);
        let (digital_signature, key_cert_sign) = match cert.key_usage().map_err(|e| decoding(&e))? {
            Some(ku) => (ku.value.digital_signature(), ku.value.key_cert_sign()),
            None => (false, false),
        };

        Ok(Self {
            serial,
            subject: subject.to_string(),
            issuer: cert.issuer().to_string(),
            common_name,
            organization,
            country,
            not_before: cert.validity().not_before.to_datetime(),
            not_after: cert.validity().not_after.to_datetime(),
            dns_names,
            ip_addresses,
            extended_key_usage,
            is_ca,
            digital_signature,
            key_cert_sign,
        })
    }
}

fn first_value<'a, 'b: 'a>(
    mut values: impl Iterator<Item = &'a AttributeTypeAndValue<'b>>,
) -> Option<String> {
    values
        .next()
        .and_then(|value| value.as_str().ok())
        .map(str::to_string)
}

fn ip_from_bytes(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => <[u8; 4]>::try_from(bytes).ok().map(IpAddr::from),
        16 => <[u8; 16]>::try_from(bytes).ok().map(IpAddr::from),
        _ => None,
    }
}
