//! TLS upgrade options
//!
//! `TlsOptions` is built once, validated at construction, and then shared
//! read-only by any number of upgrades. Building it also prepares the OpenSSL
//! connector (protocol versions, trust store, client certificates).

use super::cert::ClientCertificate;
use super::error::TlsError;
use super::policy::{ValidationErrorKind, ValidationErrorSet};
use super::stream::{RawStream, SecureStream};
use super::upgrade;
use super::UpgradeError;
use log::debug;
use openssl::ssl::{SslConnector, SslMethod, SslOptions, SslVersion};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// TLS protocol version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProtocolVersion {
    /// SSL 3.0 (deprecated, rarely used)
    Ssl3,
    /// TLS 1.0
    Tls10,
    /// TLS 1.1
    Tls11,
    /// TLS 1.2
    Tls12,
    /// TLS 1.3
    Tls13,
}

impl ProtocolVersion {
    /// Every version, oldest first
    pub const ALL: [ProtocolVersion; 5] = [
        ProtocolVersion::Ssl3,
        ProtocolVersion::Tls10,
        ProtocolVersion::Tls11,
        ProtocolVersion::Tls12,
        ProtocolVersion::Tls13,
    ];

    /// Get OpenSSL protocol version constant
    pub fn to_openssl_version(&self) -> SslVersion {
        match self {
            ProtocolVersion::Ssl3 => SslVersion::SSL3,
            ProtocolVersion::Tls10 => SslVersion::TLS1,
            ProtocolVersion::Tls11 => SslVersion::TLS1_1,
            ProtocolVersion::Tls12 => SslVersion::TLS1_2,
            ProtocolVersion::Tls13 => SslVersion::TLS1_3,
        }
    }

    /// Option that switches this version off
    fn disable_option(&self) -> SslOptions {
        match self {
            ProtocolVersion::Ssl3 => SslOptions::NO_SSLV3,
            ProtocolVersion::Tls10 => SslOptions::NO_TLSV1,
            ProtocolVersion::Tls11 => SslOptions::NO_TLSV1_1,
            ProtocolVersion::Tls12 => SslOptions::NO_TLSV1_2,
            ProtocolVersion::Tls13 => SslOptions::NO_TLSV1_3,
        }
    }

    /// Get version as string
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolVersion::Ssl3 => "SSLv3",
            ProtocolVersion::Tls10 => "TLSv1.0",
            ProtocolVersion::Tls11 => "TLSv1.1",
            ProtocolVersion::Tls12 => "TLSv1.2",
            ProtocolVersion::Tls13 => "TLSv1.3",
        }
    }
}

impl FromStr for ProtocolVersion {
    type Err = TlsError;

    /// Parse TLS version from string (case-insensitive)
    fn from_str(s: &str) -> Result<Self, TlsError> {
        match s.to_uppercase().as_str() {
            "SSLV3" | "SSL3" => Ok(ProtocolVersion::Ssl3),
            "TLSV1.0" | "TLS1.0" | "TLSV1" | "TLS1" => Ok(ProtocolVersion::Tls10),
            "TLSV1.1" | "TLS1.1" => Ok(ProtocolVersion::Tls11),
            "TLSV1.2" | "TLS1.2" => Ok(ProtocolVersion::Tls12),
            "TLSV1.3" | "TLS1.3" => Ok(ProtocolVersion::Tls13),
            _ => Err(TlsError::InvalidVersion(s.to_string())),
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// TLS upgrade options (immutable after building)
#[derive(Clone)]
pub struct TlsOptions {
    pub(crate) connector: SslConnector,
    server_name: String,
    client_certificates: Vec<ClientCertificate>,
    allowed_versions: BTreeSet<ProtocolVersion>,
    acceptable_policy_errors: ValidationErrorSet,
    io_timeout: Duration,
    handshake_timeout: Option<Duration>,
    trust_anchor_file: Option<PathBuf>,
}

impl TlsOptions {
    /// Create a new options builder for the given server name
    pub fn builder(server_name: impl Into<String>) -> TlsOptionsBuilder {
        TlsOptionsBuilder::new(server_name.into())
    }

    /// Upgrade a connected stream to TLS using these options
    pub fn upgrade<S: RawStream>(&self, raw: S) -> Result<SecureStream<S>, UpgradeError<S>> {
        upgrade::upgrade(raw, self)
    }

    /// Name used for SNI and hostname verification
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Client certificates, in preference order
    pub fn client_certificates(&self) -> &[ClientCertificate] {
        &self.client_certificates
    }

    pub fn allowed_versions(&self) -> &BTreeSet<ProtocolVersion> {
        &self.allowed_versions
    }

    /// Validation problems tolerated during the handshake
    pub fn acceptable_policy_errors(&self) -> &ValidationErrorSet {
        &self.acceptable_policy_errors
    }

    /// Read and write timeout applied after a successful handshake
    pub fn io_timeout(&self) -> Duration {
        self.io_timeout
    }

    /// The I/O timeout as a socket setting (`None` when zero)
    pub fn effective_io_timeout(&self) -> Option<Duration> {
        non_zero(self.io_timeout)
    }

    /// Read and write timeout applied while the handshake is running
    pub fn handshake_timeout(&self) -> Option<Duration> {
        self.handshake_timeout
    }

    pub fn trust_anchor_file(&self) -> Option<&Path> {
        self.trust_anchor_file.as_deref()
    }
}

impl fmt::Debug for TlsOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsOptions")
            .field("server_name", &self.server_name)
            .field("client_certificates", &self.client_certificates)
            .field("allowed_versions", &self.allowed_versions)
            .field("acceptable_policy_errors", &self.acceptable_policy_errors)
            .field("io_timeout", &self.io_timeout)
            .field("handshake_timeout", &self.handshake_timeout)
            .field("trust_anchor_file", &self.trust_anchor_file)
            .finish_non_exhaustive()
    }
}

pub(crate) fn non_zero(timeout: Duration) -> Option<Duration> {
    if timeout.is_zero() {
        None
    } else {
        Some(timeout)
    }
}

/// Options builder
pub struct TlsOptionsBuilder {
    server_name: String,
    client_certificates: Vec<ClientCertificate>,
    allowed_versions: BTreeSet<ProtocolVersion>,
    acceptable_policy_errors: ValidationErrorSet,
    io_timeout: Duration,
    handshake_timeout: Option<Duration>,
    trust_anchor_file: Option<PathBuf>,
}

impl TlsOptionsBuilder {
    fn new(server_name: String) -> Self {
        TlsOptionsBuilder {
            server_name,
            client_certificates: Vec::new(),
            allowed_versions: [ProtocolVersion::Tls12, ProtocolVersion::Tls13]
                .into_iter()
                .collect(),
            acceptable_policy_errors: ValidationErrorSet::new(),
            io_timeout: Duration::ZERO,
            handshake_timeout: None,
            trust_anchor_file: None,
        }
    }

    /// Add a client certificate (presented in the order added)
    pub fn client_certificate(mut self, cert: ClientCertificate) -> Self {
        self.client_certificates.push(cert);
        self
    }

    /// Add several client certificates (presented in the order given)
    pub fn client_certificates(mut self, certs: impl IntoIterator<Item = ClientCertificate>) -> Self {
        self.client_certificates.extend(certs);
        self
    }

    /// Set the allowed protocol versions (replaces the default set)
    pub fn versions(mut self, versions: impl IntoIterator<Item = ProtocolVersion>) -> Self {
        self.allowed_versions = versions.into_iter().collect();
        self
    }

    /// Allow a single protocol version only
    pub fn version(self, version: ProtocolVersion) -> Self {
        self.versions([version])
    }

    /// Allow every version from `min` to `max`
    pub fn version_range(self, min: ProtocolVersion, max: ProtocolVersion) -> Self {
        self.versions(ProtocolVersion::ALL.into_iter().filter(|v| *v >= min && *v <= max))
    }

    /// Tolerate one more kind of validation problem
    pub fn tolerate(mut self, kind: ValidationErrorKind) -> Self {
        self.acceptable_policy_errors.insert(kind);
        self
    }

    /// Set the tolerated validation problems (replaces previous ones)
    ///
    /// Passing `ValidationErrorSet::all()` disables peer validation.
    pub fn acceptable_policy_errors(mut self, errors: ValidationErrorSet) -> Self {
        self.acceptable_policy_errors = errors;
        self
    }

    /// Read/write timeout for the secure stream (zero means none)
    pub fn io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    pub fn io_timeout_millis(self, millis: u64) -> Self {
        self.io_timeout(Duration::from_millis(millis))
    }

    /// Bound the handshake itself (not set by default)
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = non_zero(timeout);
        self
    }

    /// Trust certificates from this PEM file in addition to the system store
    pub fn trust_anchor_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.trust_anchor_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Validate and build the options
    pub fn build(self) -> Result<TlsOptions, TlsError> {
        if self.server_name.trim().is_empty() {
            return Err(TlsError::InvalidConfig("Server name must not be empty".to_string()));
        }

        let (min, max) = match (
            self.allowed_versions.first(),
            self.allowed_versions.last(),
        ) {
            (Some(min), Some(max)) => (*min, *max),
            _ => {
                return Err(TlsError::InvalidConfig(
                    "At least one protocol version must be allowed".to_string(),
                ))
            }
        };

        let mut builder = SslConnector::builder(SslMethod::tls_client())?;
        builder.set_min_proto_version(Some(min.to_openssl_version()))?;
        builder.set_max_proto_version(Some(max.to_openssl_version()))?;

        // Versions inside the range that were not asked for
        for version in ProtocolVersion::ALL
            .into_iter()
            .filter(|v| *v > min && *v < max && !self.allowed_versions.contains(v))
        {
            builder.set_options(version.disable_option());
        }

        if let Some(ref path) = self.trust_anchor_file {
            builder.set_ca_file(path)?;
        }

        upgrade::install_certificate_selection(&mut builder, self.client_certificates.clone())?;

        debug!(
            "Built TLS options for {} (versions {}..={}, {} client certificate(s), tolerating {})",
            self.server_name,
            min,
            max,
            self.client_certificates.len(),
            self.acceptable_policy_errors
        );

        Ok(TlsOptions {
            connector: builder.build(),
            server_name: self.server_name,
            client_certificates: self.client_certificates,
            allowed_versions: self.allowed_versions,
            acceptable_policy_errors: self.acceptable_policy_errors,
            io_timeout: self.io_timeout,
            handshake_timeout: self.handshake_timeout,
            trust_anchor_file: self.trust_anchor_file,
        })
    }
}
