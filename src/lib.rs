//! Ephemeral certificate authority for TLS test fixtures.
//!
//! This crate creates a self-signed RSA root certificate and issues leaf certificates signed
//! by it, so tests can stand up TLS servers and clients without touching the system trust
//! store.
//!
//! # Architecture
//!
//! - [`RootAuthority`] owns the root key, root certificate and the serial counter. It is
//!   `Send + Sync`; issuance from many threads yields distinct serials.
//! - [`CertificateRequest`] describes a leaf: subject, SAN hosts and IPs, extended key usage
//!   and validity.
//! - [`KeyPair`] carries the issued PEM and converts into rustls configurations.
//! - [`random`] supplies the randomness. A deterministic source makes every certificate
//!   reproducible from a label.
//!
//! Construction and issuance failures are setup failures: a test cannot continue without its
//! CA. [`SetupOutcome::or_skip`] turns them into a skip signal.
//!
//! # Example
//!
//! ```no_run
//! use testca::RootAuthority;
//!
//! let ca = RootAuthority::generate().unwrap();
//! let server = ca.issue_localhost_server_certificate().unwrap();
//! let server_config = server.server_tls_config().unwrap();
//! let client_config = ca.client_tls_config().unwrap();
//! # let _ = (server_config, client_config);
//! ```

pub mod ca;
pub mod profile;
pub mod random;

pub use ca::{
    CaError, CaResult, CertificateAuthority, CertificateInfo, CertificateRequest, Clock,
    DecodedKeyPair, ExtendedKeyUsage, FixedClock, KeyPair, RootAuthority, RootAuthorityBuilder,
    SetupOutcome, Subject, SystemClock, TlsIdentity, TrustPool, VerifyError,
};
pub use profile::{IssuanceProfile, ProfileError};
