//! Certificate handling
//!
//! Client certificates presented during mutual authentication, and summaries
//! of the certificates a peer presented.

use super::error::TlsError;
use super::selector::IssuedCertificate;
use openssl::pkey::{PKey, Private};
use openssl::x509::{X509NameRef, X509Ref, X509};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Render a distinguished name as a string
///
/// Entries are listed from the most specific to the least specific
/// (`CN=host, O=Org, C=NO`). The same rendering is used for the issuers a
/// peer accepts and for the issuers of the configured client certificates,
/// so the two can be compared byte for byte.
pub fn distinguished_name(name: &X509NameRef) -> String {
    let entries: Vec<String> = name
        .entries()
        .map(|entry| {
            let key = entry
                .object()
                .nid()
                .short_name()
                .map(str::to_string)
                .unwrap_or_else(|_| entry.object().to_string());
            let value = match entry.data().as_utf8() {
                Ok(s) => s.to_string(),
                Err(_) => String::from_utf8_lossy(entry.data().as_slice()).into_owned(),
            };
            format!("{}={}", key, value)
        })
        .collect();

    entries.into_iter().rev().collect::<Vec<_>>().join(", ")
}

/// Client identity: an X.509 certificate and its private key
#[derive(Clone)]
pub struct ClientCertificate {
    certificate: X509,
    private_key: PKey<Private>,
    issuer: String,
    subject: String,
}

impl ClientCertificate {
    /// Pair a certificate with its private key
    ///
    /// Fails if the key does not belong to the certificate.
    pub fn new(certificate: X509, private_key: PKey<Private>) -> Result<Self, TlsError> {
        let public_key = certificate.public_key()?;
        if !public_key.public_eq(&*private_key) {
            return Err(TlsError::Certificate(
                "Private key does not match certificate".to_string(),
            ));
        }

        Ok(ClientCertificate {
            issuer: distinguished_name(certificate.issuer_name()),
            subject: distinguished_name(certificate.subject_name()),
            certificate,
            private_key,
        })
    }

    /// Load certificate and private key from a PEM bundle
    pub fn from_pem(pem: &[u8]) -> Result<Self, TlsError> {
        let certificate = X509::from_pem(pem)
            .map_err(|e| TlsError::Certificate(format!("Failed to load certificate: {}", e)))?;
        let private_key = PKey::private_key_from_pem(pem)
            .map_err(|e| TlsError::Certificate(format!("Failed to load private key: {}", e)))?;

        Self::new(certificate, private_key)
    }

    /// Load certificate and private key from a PEM file
    pub fn from_pem_file<P: AsRef<Path>>(path: P) -> Result<Self, TlsError> {
        let mut pem = Vec::new();
        File::open(path.as_ref())?.read_to_end(&mut pem)?;
        Self::from_pem(&pem)
    }

    pub fn certificate(&self) -> &X509Ref {
        &self.certificate
    }

    pub fn private_key(&self) -> &PKey<Private> {
        &self.private_key
    }

    /// Issuer distinguished name, as rendered by `distinguished_name`
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Subject distinguished name, as rendered by `distinguished_name`
    pub fn subject(&self) -> &str {
        &self.subject
    }
}

impl IssuedCertificate for ClientCertificate {
    fn issuer_distinguished_name(&self) -> &str {
        &self.issuer
    }
}

impl fmt::Debug for ClientCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCertificate")
            .field("subject", &self.subject)
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

/// Summary of a certificate presented by the peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertInfo {
    /// Subject distinguished name
    pub subject: String,
    /// Issuer distinguished name
    pub issuer: String,
    /// Subject Alternative Names (DNS names and IP addresses)
    pub subject_alt_names: Vec<String>,
}

impl CertInfo {
    /// Extract certificate information from an X.509 certificate reference
    pub fn from_x509(cert: &X509Ref) -> Self {
        CertInfo {
            subject: distinguished_name(cert.subject_name()),
            issuer: distinguished_name(cert.issuer_name()),
            subject_alt_names: Self::get_subject_alt_names(cert),
        }
    }

    fn get_subject_alt_names(cert: &X509Ref) -> Vec<String> {
        let mut names = Vec::new();

        if let Some(san_ext) = cert.subject_alt_names() {
            for name in san_ext {
                if let Some(dns) = name.dnsname() {
                    names.push(format!("DNS:{}", dns));
                } else if let Some(ip) = name.ipaddress() {
                    let addr = match ip.len() {
                        4 => <[u8; 4]>::try_from(ip).ok().map(std::net::IpAddr::from),
                        16 => <[u8; 16]>::try_from(ip).ok().map(std::net::IpAddr::from),
                        _ => None,
                    };
                    if let Some(addr) = addr {
                        names.push(format!("IP:{}", addr));
                    }
                }
            }
        }

        names
    }
}

/// Summaries of the peer's certificate chain (index 0 is the peer certificate)
pub fn peer_chain(ssl: &openssl::ssl::SslRef) -> Vec<CertInfo> {
    let mut chain = Vec::new();

    if let Some(peer_cert) = ssl.peer_certificate() {
        chain.push(CertInfo::from_x509(&peer_cert));
    }

    // On the client side the chain includes the peer certificate again
    if let Some(cert_chain) = ssl.peer_cert_chain() {
        for cert in cert_chain.iter().skip(1) {
            chain.push(CertInfo::from_x509(cert));
        }
    }

    chain
}
