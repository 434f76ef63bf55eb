//! Root certificate authority.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rcgen::{
    BasicConstraints, CertificateParams, ExtendedKeyUsagePurpose, IsCa, Issuer, KeyPair as SigningKeyPair,
    KeyUsagePurpose, PKCS_RSA_SHA256, SerialNumber,
};
use rsa::RsaPrivateKey;
use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding};
use rsa::pkcs8::EncodePrivateKey;
use rustls::pki_types::{CertificateDer, PrivatePkcs8KeyDer};
use time::macros::datetime;
use time::OffsetDateTime;
use tracing::debug;

use super::error::{CaError, CaResult};
use super::keypair::CertificateInfo;
use super::request::Subject;
use super::trust::TrustPool;
use crate::random::{RandomSource, deterministic_source, system_source};

/// RSA modulus size for root and leaf keys.
pub const KEY_SIZE: usize = 2048;

/// Validity of certificates that do not specify an end date.
pub const VALIDITY_YEARS: i32 = 30;

/// Serial number of the root certificate; leaves are numbered from here upwards.
pub const ROOT_SERIAL: u64 = 1;

/// Fixed start of validity used when the clock is not the wall clock.
pub const START_EPOCH: OffsetDateTime = datetime!(2023-09-05 0:00 UTC);

/// Source of the root certificate's start of validity.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

/// Clock that always reports the same instant. The default reports [`START_EPOCH`], which
/// keeps root certificates reproducible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub OffsetDateTime);

impl Default for FixedClock {
    fn default() -> Self {
        Self(START_EPOCH)
    }
}

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        self.0
    }
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Adds calendar years, moving February 29th to the 28th when the target year has none.
pub(crate) fn add_years(start: OffsetDateTime, years: i32) -> CaResult<OffsetDateTime> {
    let year = start.year() + years;
    start
        .replace_year(year)
        .or_else(|_| start.replace_day(28).and_then(|d| d.replace_year(year)))
        .map_err(|e| CaError::CertificateCreation(format!("invalid validity window: {}", e)))
}

/// Hands out serial numbers. Only reachable through the authority's lock.
struct SerialCounter(u64);

impl SerialCounter {
    fn after_root() -> Self {
        Self(ROOT_SERIAL)
    }

    fn allocate(&mut self) -> u64 {
        self.0 += 1;
        self.0
    }
}

/// Everything issuance mutates.
pub(crate) struct IssuanceState {
    serial: SerialCounter,
    pub(crate) random: Box<dyn RandomSource>,
}

impl IssuanceState {
    pub(crate) fn allocate_serial(&mut self) -> u64 {
        self.serial.allocate()
    }
}

/// A freshly generated RSA key in both the form rcgen signs with and the form handed to callers.
pub(crate) struct GeneratedKey {
    pub(crate) rsa: RsaPrivateKey,
    pub(crate) signing: SigningKeyPair,
}

impl GeneratedKey {
    pub(crate) fn generate(random: &mut Box<dyn RandomSource>) -> CaResult<Self> {
        let rsa = RsaPrivateKey::new(random, KEY_SIZE)
            .map_err(|e| CaError::KeyGeneration(e.to_string()))?;
        let pkcs8 = rsa
            .to_pkcs8_der()
            .map_err(|e| CaError::encoding("private key", e))?;
        let der = PrivatePkcs8KeyDer::from(pkcs8.as_bytes().to_vec());
        let signing = SigningKeyPair::from_pkcs8_der_and_sign_algo(&der, &PKCS_RSA_SHA256)
            .map_err(|e| CaError::KeyGeneration(e.to_string()))?;
        Ok(Self { rsa, signing })
    }

    /// PKCS#1 `RSA PRIVATE KEY` block.
    pub(crate) fn pkcs1_pem(&self) -> CaResult<String> {
        self.rsa
            .to_pkcs1_pem(LineEnding::LF)
            .map(|pem| pem.to_string())
            .map_err(|e| CaError::encoding("private key", e))
    }
}

/// Self-signed root that issues leaf certificates.
///
/// The root key and certificate never change after construction. Issuance takes an internal
/// lock for its whole duration, so an authority can be shared between threads and every
/// certificate it signs gets a distinct serial number.
pub struct RootAuthority {
    pub(crate) issuer: Issuer<'static, SigningKeyPair>,
    root_der: CertificateDer<'static>,
    root_pem: Vec<u8>,
    subject: Subject,
    pub(crate) not_before: OffsetDateTime,
    state: Mutex<IssuanceState>,
}

impl RootAuthority {
    /// Creates an authority whose keys are drawn from `source` and whose root becomes valid at
    /// `clock.now()`.
    pub fn new<R: RandomSource + 'static>(source: R, clock: &impl Clock) -> CaResult<Self> {
        Self::builder().source(source).clock(clock).build()
    }

    /// Authority backed by system entropy, anchored at [`START_EPOCH`].
    pub fn generate() -> CaResult<Self> {
        Self::builder().source(system_source()).build()
    }

    /// Authority whose root and every subsequent leaf depend only on `label`.
    pub fn deterministic(label: &str) -> CaResult<Self> {
        Self::builder().source(deterministic_source(label)).build()
    }

    pub fn builder() -> RootAuthorityBuilder {
        RootAuthorityBuilder::default()
    }

    /// Returns the root certificate in PEM format.
    pub fn root_certificate_pem(&self) -> &[u8] {
        &self.root_pem
    }

    /// Returns the root certificate in DER format.
    pub fn root_certificate_der(&self) -> &CertificateDer<'static> {
        &self.root_der
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    /// Start of the root's validity; also the default start for leaves.
    pub fn start(&self) -> OffsetDateTime {
        self.not_before
    }

    pub fn root_certificate_info(&self) -> CaResult<CertificateInfo> {
        CertificateInfo::from_der(&self.root_der)
    }

    /// Verification pool containing only this authority's root.
    pub fn trust_pool(&self) -> TrustPool {
        TrustPool::with_root(self.root_der.clone())
    }

    /// Client configuration trusting this authority, TLS 1.2 or newer, no client certificate.
    pub fn client_tls_config(&self) -> CaResult<rustls::ClientConfig> {
        self.trust_pool().client_config()
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, IssuanceState> {
        // The counter only moves forward, so it stays valid even if an issuer panicked.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for RootAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootAuthority")
            .field("subject", &self.subject)
            .field("not_before", &self.not_before)
            .finish_non_exhaustive()
    }
}

/// Configures a [`RootAuthority`] before its keys are generated.
pub struct RootAuthorityBuilder {
    source: Option<Box<dyn RandomSource>>,
    start: OffsetDateTime,
    subject: Subject,
}

impl Default for RootAuthorityBuilder {
    fn default() -> Self {
        Self {
            source: None,
            start: START_EPOCH,
            subject: Subject::root(),
        }
    }
}

impl RootAuthorityBuilder {
    /// Randomness for the root key and every leaf key. Defaults to system entropy.
    pub fn source<R: RandomSource + 'static>(mut self, source: R) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Anchors the root's validity at `clock.now()`, truncated to whole seconds.
    pub fn clock(mut self, clock: &impl Clock) -> Self {
        let now = clock.now();
        self.start = now.replace_nanosecond(0).unwrap_or(now);
        self
    }

    pub fn subject(mut self, subject: Subject) -> Self {
        self.subject = subject;
        self
    }

    pub fn build(self) -> CaResult<RootAuthority> {
        let mut random = self
            .source
            .unwrap_or_else(|| Box::new(system_source()));
        let not_after = add_years(self.start, VALIDITY_YEARS)?;

        let mut params = CertificateParams::default();
        params.distinguished_name = self.subject.distinguished_name();
        params.serial_number = Some(SerialNumber::from(ROOT_SERIAL));
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyCertSign,
        ];
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ClientAuth,
            ExtendedKeyUsagePurpose::ServerAuth,
        ];
        params.not_before = self.start;
        params.not_after = not_after;

        let key = GeneratedKey::generate(&mut random)?;
        let root = params.self_signed(&key.signing)?;

        let root_pem = root.pem().into_bytes();
        let root_der = CertificateDer::from(root.der().to_vec());

        debug!(
            "generated root certificate valid from {} to {}",
            self.start, not_after
        );

        Ok(RootAuthority {
            issuer: Issuer::new(params, key.signing),
            root_der,
            root_pem,
            subject: self.subject,
            not_before: self.start,
            state: Mutex::new(IssuanceState {
                serial: SerialCounter::after_root(),
                random,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ca::{COUNTRY, ExtendedKeyUsage, ORGANIZATION};

    /// Tests root certificate generation.
    /// The root must be a CA allowed to sign and to serve both TLS roles.
    #[test]
    fn generate_root() {
        let ca = RootAuthority::deterministic("generate_root").unwrap();
        let pem = std::str::from_utf8(ca.root_certificate_pem()).unwrap();
        assert!(pem.starts_with("-----BEGIN CERTIFICATE-----"));

        let info = ca.root_certificate_info().unwrap();
        assert!(info.is_ca);
        assert!(info.digital_signature);
        assert!(info.key_cert_sign);
        assert_eq!(info.serial, ROOT_SERIAL);
        assert!(info.extended_key_usage.contains(&ExtendedKeyUsage::ServerAuth));
        assert!(info.extended_key_usage.contains(&ExtendedKeyUsage::ClientAuth));
        assert_eq!(info.subject, info.issuer);
        assert_eq!(info.organization.as_deref(), Some(ORGANIZATION));
        assert_eq!(info.country.as_deref(), Some(COUNTRY));
        assert_eq!(info.common_name, None);
    }

    /// Tests that the default clock pins validity to the fixed start epoch.
    #[test]
    fn root_validity_window() {
        let ca = RootAuthority::deterministic("root_validity_window").unwrap();
        let info = ca.root_certificate_info().unwrap();
        assert_eq!(info.not_before, START_EPOCH);
        assert_eq!(info.not_after, datetime!(2053-09-05 0:00 UTC));
    }

    /// Tests that a clock anchors the root's start of validity.
    #[test]
    fn clock_anchors_root() {
        let start = datetime!(2024-01-02 3:04:05.678 UTC);
        let ca = RootAuthority::new(deterministic_source("clock"), &FixedClock(start)).unwrap();
        assert_eq!(ca.start(), datetime!(2024-01-02 3:04:05 UTC));
        let info = ca.root_certificate_info().unwrap();
        assert_eq!(info.not_before, datetime!(2024-01-02 3:04:05 UTC));
        assert_eq!(info.not_after, datetime!(2054-01-02 3:04:05 UTC));
    }

    #[test]
    fn add_years_handles_leap_day() {
        let leap = datetime!(2024-02-29 12:00 UTC);
        assert_eq!(add_years(leap, 1).unwrap(), datetime!(2025-02-28 12:00 UTC));
        assert_eq!(add_years(leap, 4).unwrap(), datetime!(2028-02-29 12:00 UTC));
    }

    #[test]
    fn serial_counter_starts_after_root() {
        let mut counter = SerialCounter::after_root();
        assert_eq!(counter.allocate(), 2);
        assert_eq!(counter.allocate(), 3);
    }
}
