//! Certificate validation policy
//!
//! OpenSSL reports every problem it finds while verifying the peer's
//! certificate chain as an `X509_V_ERR_*` code. Each code is mapped to a
//! `ValidationErrorKind`, and `validate` decides whether the problems seen so
//! far are all tolerated by the caller's configuration.

use super::error::TlsError;
use openssl_sys as ffi;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Category of certificate validation problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValidationErrorKind {
    /// The chain does not lead to a trusted root
    ChainUntrusted,
    /// The peer certificate, or a certificate in its chain, signs itself
    SelfSigned,
    /// The certificate is not valid for the requested server name
    HostnameMismatch,
    /// The certificate validity period has ended
    Expired,
    /// The certificate validity period has not started yet
    NotYetValid,
    /// The certificate has been revoked
    Revoked,
    /// A signature in the chain does not verify
    InvalidSignature,
    /// Any problem not covered by the kinds above
    Unknown,
}

impl ValidationErrorKind {
    /// Every kind, in declaration order
    pub const ALL: [ValidationErrorKind; 8] = [
        ValidationErrorKind::ChainUntrusted,
        ValidationErrorKind::SelfSigned,
        ValidationErrorKind::HostnameMismatch,
        ValidationErrorKind::Expired,
        ValidationErrorKind::NotYetValid,
        ValidationErrorKind::Revoked,
        ValidationErrorKind::InvalidSignature,
        ValidationErrorKind::Unknown,
    ];

    /// Map an OpenSSL `X509_V_ERR_*` code to its kind
    ///
    /// Codes without a dedicated kind map to `Unknown`.
    pub fn from_raw(code: i32) -> Self {
        match code {
            ffi::X509_V_ERR_UNABLE_TO_GET_ISSUER_CERT
            | ffi::X509_V_ERR_UNABLE_TO_GET_ISSUER_CERT_LOCALLY
            | ffi::X509_V_ERR_UNABLE_TO_VERIFY_LEAF_SIGNATURE
            | ffi::X509_V_ERR_CERT_CHAIN_TOO_LONG
            | ffi::X509_V_ERR_CERT_UNTRUSTED
            | ffi::X509_V_ERR_CERT_REJECTED
            | ffi::X509_V_ERR_INVALID_CA => ValidationErrorKind::ChainUntrusted,
            ffi::X509_V_ERR_DEPTH_ZERO_SELF_SIGNED_CERT
            | ffi::X509_V_ERR_SELF_SIGNED_CERT_IN_CHAIN => ValidationErrorKind::SelfSigned,
            ffi::X509_V_ERR_HOSTNAME_MISMATCH | ffi::X509_V_ERR_IP_ADDRESS_MISMATCH => {
                ValidationErrorKind::HostnameMismatch
            }
            ffi::X509_V_ERR_CERT_HAS_EXPIRED => ValidationErrorKind::Expired,
            ffi::X509_V_ERR_CERT_NOT_YET_VALID => ValidationErrorKind::NotYetValid,
            ffi::X509_V_ERR_CERT_REVOKED => ValidationErrorKind::Revoked,
            ffi::X509_V_ERR_CERT_SIGNATURE_FAILURE => ValidationErrorKind::InvalidSignature,
            _ => ValidationErrorKind::Unknown,
        }
    }

    /// Get kind as string
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationErrorKind::ChainUntrusted => "chain-untrusted",
            ValidationErrorKind::SelfSigned => "self-signed",
            ValidationErrorKind::HostnameMismatch => "hostname-mismatch",
            ValidationErrorKind::Expired => "expired",
            ValidationErrorKind::NotYetValid => "not-yet-valid",
            ValidationErrorKind::Revoked => "revoked",
            ValidationErrorKind::InvalidSignature => "invalid-signature",
            ValidationErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValidationErrorKind {
    type Err = TlsError;

    /// Parse kind from string (case-insensitive, `-` or `_` separated)
    fn from_str(s: &str) -> Result<Self, TlsError> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        ValidationErrorKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| TlsError::InvalidErrorKind(s.to_string()))
    }
}

/// Set of validation error kinds
///
/// Used both for the problems observed during a handshake and for the
/// problems a caller chooses to tolerate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrorSet {
    kinds: BTreeSet<ValidationErrorKind>,
}

impl ValidationErrorSet {
    /// Empty set
    pub fn new() -> Self {
        ValidationErrorSet::default()
    }

    /// Set holding every kind
    ///
    /// # Danger
    ///
    /// Tolerating every kind turns peer validation off completely: any
    /// certificate, for any host, from anyone, is accepted. Only use this
    /// as an explicit opt-out, never as a default.
    pub fn all() -> Self {
        ValidationErrorKind::ALL.into_iter().collect()
    }

    pub fn insert(&mut self, kind: ValidationErrorKind) -> bool {
        self.kinds.insert(kind)
    }

    pub fn contains(&self, kind: ValidationErrorKind) -> bool {
        self.kinds.contains(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    /// Kinds in `self` that are not in `other`
    pub fn difference(&self, other: &ValidationErrorSet) -> ValidationErrorSet {
        self.kinds.difference(&other.kinds).copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = ValidationErrorKind> + '_ {
        self.kinds.iter().copied()
    }
}

impl FromIterator<ValidationErrorKind> for ValidationErrorSet {
    fn from_iter<I: IntoIterator<Item = ValidationErrorKind>>(iter: I) -> Self {
        ValidationErrorSet {
            kinds: iter.into_iter().collect(),
        }
    }
}

impl Extend<ValidationErrorKind> for ValidationErrorSet {
    fn extend<I: IntoIterator<Item = ValidationErrorKind>>(&mut self, iter: I) {
        self.kinds.extend(iter);
    }
}

impl fmt::Display for ValidationErrorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, kind) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(kind.as_str())?;
        }
        f.write_str("}")
    }
}

/// Decide whether every observed problem is tolerated
///
/// Returns `true` iff `observed \ acceptable` is empty. An empty `observed`
/// set always validates.
pub fn validate(observed: &ValidationErrorSet, acceptable: &ValidationErrorSet) -> bool {
    observed.kinds.is_subset(&acceptable.kinds)
}

/// Whether an `X509_V_ERR_*` code means revocation information could not be
/// obtained or used, as opposed to a certificate being reported revoked
pub fn is_revocation_lookup_failure(code: i32) -> bool {
    matches!(
        code,
        ffi::X509_V_ERR_UNABLE_TO_GET_CRL
            | ffi::X509_V_ERR_UNABLE_TO_GET_CRL_ISSUER
            | ffi::X509_V_ERR_UNABLE_TO_DECRYPT_CRL_SIGNATURE
            | ffi::X509_V_ERR_CRL_SIGNATURE_FAILURE
            | ffi::X509_V_ERR_CRL_NOT_YET_VALID
            | ffi::X509_V_ERR_CRL_HAS_EXPIRED
            | ffi::X509_V_ERR_ERROR_IN_CRL_LAST_UPDATE_FIELD
            | ffi::X509_V_ERR_ERROR_IN_CRL_NEXT_UPDATE_FIELD
            | ffi::X509_V_ERR_KEYUSAGE_NO_CRL_SIGN
            | ffi::X509_V_ERR_UNHANDLED_CRITICAL_CRL_EXTENSION
            | ffi::X509_V_ERR_DIFFERENT_CRL_SCOPE
            | ffi::X509_V_ERR_CRL_PATH_VALIDATION_ERROR
    )
}
