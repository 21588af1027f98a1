//! Client certificate selection
//!
//! When a peer asks for a client certificate it may list the issuers it
//! accepts. `select` picks which of the configured certificates to present.

use std::collections::HashSet;

/// A certificate that knows its issuer's distinguished name
pub trait IssuedCertificate {
    fn issuer_distinguished_name(&self) -> &str;
}

impl<T: IssuedCertificate + ?Sized> IssuedCertificate for &T {
    fn issuer_distinguished_name(&self) -> &str {
        (**self).issuer_distinguished_name()
    }
}

/// Choose the client certificate to present
///
/// 1. If the peer named acceptable issuers and certificates are available,
///    the first certificate (in configured order) whose issuer matches one of
///    them exactly is chosen.
/// 2. Otherwise the first available certificate is chosen. This also applies
///    when issuers were named but none matched.
/// 3. With no certificates available, nothing is presented.
pub fn select<'a, C: IssuedCertificate>(
    acceptable_issuers: &HashSet<String>,
    available: &'a [C],
) -> Option<&'a C> {
    if !acceptable_issuers.is_empty() {
        let matching = available
            .iter()
            .find(|cert| acceptable_issuers.contains(cert.issuer_distinguished_name()));
        if matching.is_some() {
            return matching;
        }
    }

    available.first()
}
