//! YAML issuance profiles for the `testca` binary.

use std::collections::HashSet;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

use crate::ca::{CertificateRequest, ExtendedKeyUsage, Subject};

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("failed to read profile: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse profile: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid certificate name: {0:?}")]
    InvalidName(String),
    #[error("duplicate certificate name: {0}")]
    DuplicateName(String),
    #[error("certificate {0} has no extended key usage")]
    MissingUsage(String),
    #[error("certificate {0} has not_after before not_before")]
    InvertedValidity(String),
}

/// One certificate to issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateProfile {
    /// File stem for the written PEM files.
    pub name: String,
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub ip_addresses: Vec<IpAddr>,
    /// Defaults to the root organization with the first host (or the name) as common name.
    #[serde(default)]
    pub subject: Option<Subject>,
    pub usages: Vec<ExtendedKeyUsage>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub not_before: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub not_after: Option<OffsetDateTime>,
}

impl CertificateProfile {
    pub fn to_request(&self) -> CertificateRequest {
        let subject = self.subject.clone().unwrap_or_else(|| {
            Subject::with_common_name(self.hosts.first().unwrap_or(&self.name).as_str())
        });
        let mut request = CertificateRequest::new().subject(subject);
        for host in &self.hosts {
            request = request.host(host.as_str());
        }
        for ip in &self.ip_addresses {
            request = request.ip(*ip);
        }
        for usage in &self.usages {
            request = request.usage(*usage);
        }
        request.not_before = self.not_before;
        request.not_after = self.not_after;
        request
    }
}

/// Issuance profile file format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuanceProfile {
    /// Profile version for future compatibility.
    #[serde(default = "default_version")]
    pub version: u32,

    /// Label for a deterministic source. Omit for fresh keys on every run.
    #[serde(default)]
    pub seed: Option<String>,

    #[serde(default)]
    pub certificates: Vec<CertificateProfile>,
}

fn default_version() -> u32 {
    1
}

impl IssuanceProfile {
    /// Loads a profile from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProfileError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parses a profile from a YAML string.
    pub fn parse(yaml: &str) -> Result<Self, ProfileError> {
        let profile: Self = serde_yaml::from_str(yaml)?;
        profile.validate()?;
        Ok(profile)
    }

    /// Localhost server and client pair.
    pub fn localhost() -> Self {
        let localhost = |name: &str, usage| CertificateProfile {
            name: name.to_string(),
            hosts: vec!["localhost".to_string()],
            ip_addresses: vec![
                IpAddr::V4(Ipv4Addr::LOCALHOST),
                IpAddr::V6(Ipv6Addr::LOCALHOST),
            ],
            subject: None,
            usages: vec![usage],
            not_before: None,
            not_after: None,
        };
        Self {
            version: 1,
            seed: None,
            certificates: vec![
                localhost("server", ExtendedKeyUsage::ServerAuth),
                localhost("client", ExtendedKeyUsage::ClientAuth),
            ],
        }
    }

    fn validate(&self) -> Result<(), ProfileError> {
        let mut seen = HashSet::new();
        for cert in &self.certificates {
            // Names become file stems.
            if cert.name.is_empty()
                || cert.name == "ca"
                || cert
                    .name
                    .chars()
                    .any(|c| c.is_whitespace() || c == '/' || c == '\\')
                || cert.name.starts_with('.')
            {
                return Err(ProfileError::InvalidName(cert.name.clone()));
            }
            if !seen.insert(cert.name.as_str()) {
                return Err(ProfileError::DuplicateName(cert.name.clone()));
            }
            if cert.usages.is_empty() {
                return Err(ProfileError::MissingUsage(cert.name.clone()));
            }
            if let (Some(not_before), Some(not_after)) = (cert.not_before, cert.not_after)
                && not_after < not_before
            {
                return Err(ProfileError::InvertedValidity(cert.name.clone()));
            }
        }
        Ok(())
    }
}

impl Default for IssuanceProfile {
    fn default() -> Self {
        Self::localhost()
    }
}
