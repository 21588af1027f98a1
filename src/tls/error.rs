//! TLS errors
//!
//! `TlsError` covers option construction and handshake failures.
//! `UpgradeError` is what a failed upgrade returns: the error plus the raw
//! stream, which stays open and belongs to the caller again.

use super::policy::ValidationErrorSet;
use std::fmt;

/// Boxed underlying cause of a handshake failure
pub type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// TLS errors
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TLS version: {0}")]
    InvalidVersion(String),

    #[error("Invalid validation error kind: {0}")]
    InvalidErrorKind(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Certificate error: {0}")]
    Certificate(String),

    /// The single kind of failure reported by an upgrade.
    ///
    /// A peer certificate rejected by the validation policy shows up here as
    /// well, with the untolerated kinds listed in `rejected`.
    #[error("Handshake failed: {reason}")]
    HandshakeFailed {
        reason: String,
        rejected: ValidationErrorSet,
        #[source]
        source: Option<Cause>,
    },
}

impl TlsError {
    pub(crate) fn handshake(reason: impl Into<String>, source: Option<Cause>) -> Self {
        TlsError::HandshakeFailed {
            reason: reason.into(),
            rejected: ValidationErrorSet::new(),
            source,
        }
    }

    /// Validation problems that caused the peer to be rejected, if any
    pub fn rejected(&self) -> Option<&ValidationErrorSet> {
        match self {
            TlsError::HandshakeFailed { rejected, .. } if !rejected.is_empty() => Some(rejected),
            _ => None,
        }
    }

    /// Whether the failure came from the validation policy rather than from
    /// negotiation or I/O
    pub fn is_policy_violation(&self) -> bool {
        self.rejected().is_some()
    }
}

/// A failed upgrade: the error and the raw stream it was attempted on
///
/// The stream has not been closed. Its read and write timeouts are the ones
/// it had before the upgrade.
///
/// One exception: if the handshake completed but the I/O timeout could not
/// be applied, the peer already considers the session established. The
/// connection is then shut down in both directions before being returned.
pub struct UpgradeError<S> {
    error: TlsError,
    stream: S,
}

impl<S> UpgradeError<S> {
    pub(crate) fn new(error: TlsError, stream: S) -> Self {
        UpgradeError { error, stream }
    }

    /// The error that caused the upgrade to fail
    pub fn error(&self) -> &TlsError {
        &self.error
    }

    /// Take back the raw stream, dropping the error
    pub fn into_stream(self) -> S {
        self.stream
    }

    /// Split into the error and the raw stream
    pub fn into_parts(self) -> (TlsError, S) {
        (self.error, self.stream)
    }
}

impl<S> From<UpgradeError<S>> for TlsError {
    fn from(failure: UpgradeError<S>) -> Self {
        failure.error
    }
}

impl<S> fmt::Debug for UpgradeError<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpgradeError")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl<S> fmt::Display for UpgradeError<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl<S> std::error::Error for UpgradeError<S> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
