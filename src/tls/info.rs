//! Negotiated session details
//!
//! Captured once, right after the handshake, so callers can log or check what
//! was actually negotiated.

use super::cert::{peer_chain, CertInfo};
use openssl::ssl::{NameType, SslRef};

/// Details of an established TLS session
#[derive(Debug, Clone, Default)]
pub struct SessionInfo {
    /// Negotiated TLS version (e.g., "TLSv1.3")
    pub version: String,

    /// Negotiated cipher suite
    pub cipher: String,

    /// SNI servername sent to the peer
    pub servername: Option<String>,

    /// Whether a client certificate was presented
    pub client_certificate_sent: bool,

    /// Certificate chain (index 0 is the peer certificate)
    pub cert_chain: Vec<CertInfo>,
}

impl SessionInfo {
    /// Create session details from an established SSL connection
    pub fn from_ssl(ssl: &SslRef) -> Self {
        SessionInfo {
            version: ssl.version_str().to_string(),
            cipher: ssl
                .current_cipher()
                .map(|c| c.name().to_string())
                .unwrap_or_else(|| "<undef>".to_string()),
            servername: ssl.servername(NameType::HOST_NAME).map(|s| s.to_string()),
            client_certificate_sent: ssl.certificate().is_some(),
            cert_chain: peer_chain(ssl),
        }
    }

    /// Peer certificate (index 0) or a certificate further up its chain
    pub fn cert(&self, index: usize) -> Option<&CertInfo> {
        self.cert_chain.get(index)
    }
}
