//! TLS upgrade of connected streams
//!
//! This module upgrades a raw, already-connected stream to TLS as a client,
//! choosing the client identity to present and deciding which certificate
//! validation problems to tolerate.
//!
//! # Architecture
//!
//! The upgrade is split into small pieces that can be tested on their own:
//!
//! 1. `TlsOptions` holds the immutable policy (server name, client
//!    certificates, protocol versions, tolerated validation errors, timeouts)
//! 2. `selector::select` picks the client certificate for a peer's list of
//!    acceptable issuers
//! 3. `policy::validate` decides whether observed validation problems are
//!    all tolerated
//! 4. `upgrade` wires both decisions into OpenSSL, runs one blocking
//!    handshake and applies the I/O timeouts to the resulting `SecureStream`
//!
//! # Examples
//!
//! ```no_run
//! use tls_upgrade::tls::{TlsOptions, ProtocolVersion, ValidationErrorKind};
//! use std::net::TcpStream;
//!
//! let options = TlsOptions::builder("broker.example.com")
//!     .versions([ProtocolVersion::Tls12, ProtocolVersion::Tls13])
//!     .tolerate(ValidationErrorKind::HostnameMismatch)
//!     .io_timeout_millis(30_000)
//!     .build()
//!     .unwrap();
//!
//! let tcp_stream = TcpStream::connect("broker.example.com:5671").unwrap();
//! let secure = match options.upgrade(tcp_stream) {
//!     Ok(secure) => secure,
//!     Err(failure) => {
//!         eprintln!("TLS upgrade failed: {}", failure);
//!         // The raw stream is handed back untouched
//!         let _tcp_stream = failure.into_stream();
//!         return;
//!     }
//! };
//! println!("negotiated {}", secure.info().version);
//! ```

pub mod cert;
pub mod error;
pub mod info;
pub mod options;
pub mod policy;
pub mod selector;
pub mod stream;
pub mod upgrade;

pub use cert::{CertInfo, ClientCertificate};
pub use error::{TlsError, UpgradeError};
pub use info::SessionInfo;
pub use options::{ProtocolVersion, TlsOptions, TlsOptionsBuilder};
pub use policy::{ValidationErrorKind, ValidationErrorSet};
pub use stream::{RawStream, SecureStream};
pub use upgrade::upgrade;

/// Result type for TLS operations
pub type Result<T> = std::result::Result<T, TlsError>;
