//! Leaf certificate issuance.

use rcgen::string::Ia5String;
use rcgen::{CertificateParams, KeyUsagePurpose, SanType, SerialNumber};
use time::{Duration, OffsetDateTime};
use tracing::debug;

use super::authority::{GeneratedKey, RootAuthority, VALIDITY_YEARS};
use super::error::{CaError, CaResult};
use super::keypair::KeyPair;
use super::request::CertificateRequest;

impl RootAuthority {
    /// Issues a leaf certificate signed by the root.
    ///
    /// The request is validated before any serial is allocated. Serial allocation, key
    /// generation and signing then happen under one lock: the counter must not hand out
    /// duplicates and a deterministic source must be consumed in a fixed order.
    pub fn issue_certificate(&self, request: &CertificateRequest) -> CaResult<KeyPair> {
        let (not_before, not_after) = self.validity(request)?;
        let mut params = leaf_params(request, not_before, not_after)?;

        let mut state = self.lock_state();
        let serial = state.allocate_serial();
        params.serial_number = Some(SerialNumber::from(serial));

        let key = GeneratedKey::generate(&mut state.random)?;
        let cert = params.signed_by(&key.signing, &self.issuer)?;
        let private_key = key.pkcs1_pem()?;
        drop(state);

        debug!(
            "issued certificate serial={} hosts={} ips={} usages={:?}",
            serial,
            request.hosts.len(),
            request.ip_addresses.len(),
            request.extended_key_usage
        );

        Ok(KeyPair::new(cert.pem().into_bytes(), private_key.into_bytes()))
    }

    /// Server certificate for `localhost`, `127.0.0.1` and `::1`.
    pub fn issue_localhost_server_certificate(&self) -> CaResult<KeyPair> {
        self.issue_certificate(&CertificateRequest::localhost_server())
    }

    /// Client certificate for `localhost`, `127.0.0.1` and `::1`.
    pub fn issue_localhost_client_certificate(&self) -> CaResult<KeyPair> {
        self.issue_certificate(&CertificateRequest::localhost_client())
    }

    fn validity(&self, request: &CertificateRequest) -> CaResult<(OffsetDateTime, OffsetDateTime)> {
        let not_before = request.not_before.unwrap_or(self.not_before);
        let not_after = match request.not_after {
            Some(not_after) => not_after,
            // Fixed-length years, leap days not counted.
            None => not_before
                .checked_add(Duration::days(365 * i64::from(VALIDITY_YEARS)))
                .ok_or_else(|| {
                    CaError::CertificateCreation(format!(
                        "validity from {} overflows",
                        not_before
                    ))
                })?,
        };
        if not_after < not_before {
            return Err(CaError::CertificateCreation(format!(
                "not_after {} is before not_before {}",
                not_after, not_before
            )));
        }
        Ok((not_before, not_after))
    }
}

fn leaf_params(
    request: &CertificateRequest,
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
) -> CaResult<CertificateParams> {
    let mut params = CertificateParams::default();
    params.distinguished_name = request.subject.distinguished_name();
    params.not_before = not_before;
    params.not_after = not_after;
    params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
    params.extended_key_usages = request
        .extended_key_usage
        .iter()
        .map(|usage| usage.purpose())
        .collect();
    params.use_authority_key_identifier_extension = true;

    let mut sans = Vec::with_capacity(request.ip_addresses.len() + request.hosts.len());
    for ip in &request.ip_addresses {
        sans.push(SanType::IpAddress(*ip));
    }
    for host in &request.hosts {
        let name = Ia5String::try_from(host.as_str())
            .map_err(|_| CaError::CertificateCreation(format!("invalid DNS name: {}", host)))?;
        sans.push(SanType::DnsName(name));
    }
    params.subject_alt_names = sans;

    Ok(params)
}
