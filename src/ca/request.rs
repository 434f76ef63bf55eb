//! Leaf certificate requests.

use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use rcgen::{DistinguishedName, DnType, ExtendedKeyUsagePurpose};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Organization written into the root subject and the localhost presets.
pub const ORGANIZATION: &str = "OpenTofu a Series of LF Projects, LLC";
pub const COUNTRY: &str = "US";

/// TLS role a leaf certificate is allowed to play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtendedKeyUsage {
    ServerAuth,
    ClientAuth,
}

impl ExtendedKeyUsage {
    pub(crate) fn purpose(self) -> ExtendedKeyUsagePurpose {
        match self {
            ExtendedKeyUsage::ServerAuth => ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsage::ClientAuth => ExtendedKeyUsagePurpose::ClientAuth,
        }
    }
}

/// Subject name of a certificate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub common_name: Option<String>,
}

impl Subject {
    /// Subject used for the root certificate.
    pub fn root() -> Self {
        Self {
            organization: Some(ORGANIZATION.to_string()),
            country: Some(COUNTRY.to_string()),
            common_name: None,
        }
    }

    /// Root subject with a common name, as used by the localhost presets.
    pub fn with_common_name(common_name: impl Into<String>) -> Self {
        Self {
            common_name: Some(common_name.into()),
            ..Self::root()
        }
    }

    pub(crate) fn distinguished_name(&self) -> DistinguishedName {
        let mut dn = DistinguishedName::new();
        if let Some(country) = &self.country {
            dn.push(DnType::CountryName, country.as_str());
        }
        if let Some(organization) = &self.organization {
            dn.push(DnType::OrganizationName, organization.as_str());
        }
        if let Some(common_name) = &self.common_name {
            dn.push(DnType::CommonName, common_name.as_str());
        }
        dn
    }
}

/// Configuration of a leaf certificate.
///
/// `not_before` defaults to the issuing authority's start epoch and `not_after` to thirty
/// 365-day years after `not_before`. Unlike the root's calendar years, leap days are not
/// added, so the default end falls a few days before the anniversary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateRequest {
    pub ip_addresses: Vec<IpAddr>,
    pub hosts: Vec<String>,
    pub subject: Subject,
    pub extended_key_usage: BTreeSet<ExtendedKeyUsage>,
    pub not_before: Option<OffsetDateTime>,
    pub not_after: Option<OffsetDateTime>,
}

impl CertificateRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Server certificate for `localhost`, `127.0.0.1` and `::1`.
    pub fn localhost_server() -> Self {
        Self::localhost().usage(ExtendedKeyUsage::ServerAuth)
    }

    /// Client certificate for `localhost`, `127.0.0.1` and `::1`.
    pub fn localhost_client() -> Self {
        Self::localhost().usage(ExtendedKeyUsage::ClientAuth)
    }

    fn localhost() -> Self {
        Self::new()
            .ip(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .ip(IpAddr::V6(Ipv6Addr::LOCALHOST))
            .host("localhost")
            .subject(Subject::with_common_name("localhost"))
    }

    pub fn ip(mut self, ip: IpAddr) -> Self {
        if !self.ip_addresses.contains(&ip) {
            self.ip_addresses.push(ip);
        }
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        let host = host.into();
        if !self.hosts.contains(&host) {
            self.hosts.push(host);
        }
        self
    }

    pub fn subject(mut self, subject: Subject) -> Self {
        self.subject = subject;
        self
    }

    pub fn usage(mut self, usage: ExtendedKeyUsage) -> Self {
        self.extended_key_usage.insert(usage);
        self
    }

    pub fn not_before(mut self, not_before: OffsetDateTime) -> Self {
        self.not_before = Some(not_before);
        self
    }

    pub fn not_after(mut self, not_after: OffsetDateTime) -> Self {
        self.not_after = Some(not_after);
        self
    }
}
