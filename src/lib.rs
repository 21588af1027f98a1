//! tls-upgrade - client-side TLS upgrade of connected streams
//!
//! This crate takes an already-connected byte stream (usually a `TcpStream`)
//! and turns it into an encrypted, authenticated stream, under trust and
//! identity policy supplied by the caller.

pub mod tls;

pub use tls::{
    upgrade, ClientCertificate, ProtocolVersion, RawStream, SecureStream, TlsError, TlsOptions,
    UpgradeError, ValidationErrorKind, ValidationErrorSet,
};
