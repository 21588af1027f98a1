//! TLS upgrade
//!
//! Runs exactly one client handshake over a caller-supplied raw stream.
//!
//! OpenSSL drives the handshake and calls back into this module twice:
//!
//! - when the peer requests a client certificate, the peer's list of
//!   acceptable issuers and the configured certificates are handed to
//!   `selector::select`
//! - for every problem found while verifying the peer's chain, the problem is
//!   added to the set observed so far and `policy::validate` decides whether
//!   the handshake may continue
//!
//! Both decisions are pure functions; the glue below only collects their
//! inputs and applies the result.

use super::cert::{distinguished_name, ClientCertificate};
use super::error::{Cause, TlsError, UpgradeError};
use super::options::{non_zero, TlsOptions};
use super::policy::{self, ValidationErrorKind, ValidationErrorSet};
use super::selector;
use super::stream::{RawStream, SecureStream};
use foreign_types_shared::{ForeignType, ForeignTypeRef};
use libc::c_int;
use log::{debug, info, warn};
use once_cell::sync::OnceCell;
use openssl::error::ErrorStack;
use openssl::ex_data::Index;
use openssl::ssl::{
    HandshakeError, Ssl, SslContext, SslContextBuilder, SslRef, SslVerifyMode,
};
use openssl::stack::StackRef;
use openssl::x509::verify::X509VerifyFlags;
use openssl::x509::{X509Name, X509NameRef, X509StoreContextRef};
use openssl_sys as ffi;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

// Not bound by openssl-sys; libssl is linked through it
extern "C" {
    fn SSL_CTX_set_client_cert_cb(
        ctx: *mut ffi::SSL_CTX,
        client_cert_cb: Option<
            unsafe extern "C" fn(
                ssl: *mut ffi::SSL,
                x509: *mut *mut ffi::X509,
                pkey: *mut *mut ffi::EVP_PKEY,
            ) -> c_int,
        >,
    );

    fn SSL_get_client_CA_list(ssl: *const ffi::SSL) -> *mut ffi::stack_st_X509_NAME;
}

/// Upgrade a connected stream to TLS (client side)
///
/// On success the returned stream owns `raw` and has its read and write
/// timeouts set to the options' I/O timeout. On failure `raw` is handed back
/// inside the error, still open, with the timeouts it had before.
pub fn upgrade<S: RawStream>(
    raw: S,
    options: &TlsOptions,
) -> Result<SecureStream<S>, UpgradeError<S>> {
    // Second handle to the same connection, so the caller gets the stream
    // back even when OpenSSL drops its own handle on failure
    let retained = match raw.try_clone() {
        Ok(retained) => retained,
        Err(e) => {
            return Err(UpgradeError::new(
                TlsError::handshake("Failed to duplicate raw stream", Some(Box::new(e))),
                raw,
            ))
        }
    };

    let saved = match Timeouts::of(&retained) {
        Ok(saved) => saved,
        Err(e) => {
            return Err(UpgradeError::new(
                TlsError::handshake("Failed to read raw stream timeouts", Some(Box::new(e))),
                retained,
            ))
        }
    };

    match handshake(raw, options) {
        Ok(secure) => {
            // Dropping our handle leaves the connection to the secure stream
            drop(retained);
            Ok(secure)
        }
        Err(error) => {
            if let Err(e) = saved.restore(&retained) {
                warn!("Failed to restore raw stream timeouts: {}", e);
            }
            Err(UpgradeError::new(error, retained))
        }
    }
}

fn handshake<S: RawStream>(raw: S, options: &TlsOptions) -> Result<SecureStream<S>, TlsError> {
    let server_name = options.server_name();
    let observed = Arc::new(Mutex::new(ValidationErrorSet::new()));

    let ssl = configure(options, Arc::clone(&observed))
        .map_err(|e| TlsError::handshake("Failed to set up TLS session", Some(Box::new(e))))?;

    if let Some(timeout) = options.handshake_timeout() {
        Timeouts::both(timeout)
            .restore(&raw)
            .map_err(|e| TlsError::handshake("Failed to apply handshake timeout", Some(Box::new(e))))?;
    }

    debug!("Starting TLS handshake with {}", server_name);

    // Keep in blocking mode for handshake
    let stream = match ssl.connect(raw) {
        Ok(stream) => stream,
        Err(e) => {
            let observed = lock(&observed).clone();
            let rejected = observed.difference(options.acceptable_policy_errors());
            let (reason, source) = describe(e);

            if rejected.is_empty() {
                debug!("TLS handshake with {} failed: {}", server_name, reason);
            } else {
                warn!(
                    "TLS handshake with {} aborted, peer certificate problems not tolerated: {}",
                    server_name, rejected
                );
            }

            return Err(TlsError::HandshakeFailed {
                reason,
                rejected,
                source,
            });
        }
    };

    // Timeouts apply only once the session is established
    let timeout = options.effective_io_timeout();
    if let Err(e) = Timeouts::both_or_none(timeout).restore(stream.get_ref()) {
        // Peer considers the session open; not usable as a plain stream
        if let Err(shutdown) = stream.get_ref().disconnect() {
            debug!("Failed to shut down raw stream: {}", shutdown);
        }
        return Err(TlsError::handshake(
            "Failed to apply I/O timeout, connection shut down",
            Some(Box::new(e)),
        ));
    }

    let secure = SecureStream::new(stream, timeout);
    info!(
        "TLS session with {} established ({}, {})",
        server_name,
        secure.info().version,
        secure.info().cipher
    );

    Ok(secure)
}

/// Per-connection session: SNI, hostname check, revocation off, validation callback
fn configure(options: &TlsOptions, observed: Arc<Mutex<ValidationErrorSet>>) -> Result<Ssl, ErrorStack> {
    let mut config = options.connector.configure()?;
    config.set_use_server_name_indication(true);
    config.set_verify_hostname(true);

    let mut ssl = config.into_ssl(options.server_name())?;

    // Revocation status is never consulted. Flags set on the trust store
    // still reach the verifier, see `verify_peer`
    ssl.param_mut()
        .clear_flags(X509VerifyFlags::CRL_CHECK | X509VerifyFlags::CRL_CHECK_ALL)?;

    let acceptable = options.acceptable_policy_errors().clone();
    ssl.set_verify_callback(SslVerifyMode::PEER, move |preverify_ok, ctx| {
        verify_peer(preverify_ok, ctx, &observed, &acceptable)
    });

    Ok(ssl)
}

fn verify_peer(
    preverify_ok: bool,
    ctx: &mut X509StoreContextRef,
    observed: &Mutex<ValidationErrorSet>,
    acceptable: &ValidationErrorSet,
) -> bool {
    if preverify_ok {
        return true;
    }

    let error = ctx.error();
    record_problem(
        error.as_raw(),
        error.error_string(),
        ctx.error_depth(),
        observed,
        acceptable,
    )
}

/// Add one verification problem to the observed set and decide whether the
/// handshake may go on
///
/// Failures to obtain revocation information are skipped: revocation is
/// only judged when the verifier positively reports a revoked certificate.
fn record_problem(
    code: c_int,
    description: &str,
    depth: u32,
    observed: &Mutex<ValidationErrorSet>,
    acceptable: &ValidationErrorSet,
) -> bool {
    if policy::is_revocation_lookup_failure(code) {
        debug!("Skipping revocation lookup at depth {}: {}", depth, description);
        return true;
    }

    let kind = ValidationErrorKind::from_raw(code);

    let mut observed = lock(observed);
    observed.insert(kind);
    let accepted = policy::validate(&observed, acceptable);

    if accepted {
        warn!(
            "Tolerating certificate problem at depth {}: {} ({})",
            depth, kind, description
        );
    } else {
        debug!(
            "Rejecting certificate problem at depth {}: {} ({})",
            depth, kind, description
        );
    }

    accepted
}

fn lock(observed: &Mutex<ValidationErrorSet>) -> std::sync::MutexGuard<'_, ValidationErrorSet> {
    observed.lock().unwrap_or_else(PoisonError::into_inner)
}

fn describe<S>(e: HandshakeError<S>) -> (String, Option<Cause>) {
    match e {
        HandshakeError::SetupFailure(stack) => {
            let source: Cause = Box::new(stack);
            ("TLS session setup failed".to_string(), Some(source))
        }
        HandshakeError::Failure(mid) => {
            let error = mid.into_error();
            let reason = match error.io_error() {
                Some(io) => format!("I/O failure during handshake: {}", io),
                None => format!("Connection failed: {}", error),
            };
            let source: Cause = Box::new(error);
            (reason, Some(source))
        }
        HandshakeError::WouldBlock(mid) => {
            let source: Cause = Box::new(mid.into_error());
            (
                "Handshake did not complete: timed out or raw stream is non-blocking".to_string(),
                Some(source),
            )
        }
    }
}

/// Read and write timeouts of a raw stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Timeouts {
    read: Option<Duration>,
    write: Option<Duration>,
}

impl Timeouts {
    fn of<S: RawStream>(stream: &S) -> std::io::Result<Self> {
        Ok(Timeouts {
            read: stream.read_timeout()?,
            write: stream.write_timeout()?,
        })
    }

    fn both(timeout: Duration) -> Self {
        Self::both_or_none(non_zero(timeout))
    }

    fn both_or_none(timeout: Option<Duration>) -> Self {
        Timeouts {
            read: timeout,
            write: timeout,
        }
    }

    fn restore<S: RawStream>(&self, stream: &S) -> std::io::Result<()> {
        stream.set_read_timeout(self.read)?;
        stream.set_write_timeout(self.write)
    }
}

/// Ex-data slot holding the client certificates on the OpenSSL context
fn certificate_index() -> Result<Index<SslContext, Vec<ClientCertificate>>, ErrorStack> {
    static INDEX: OnceCell<Index<SslContext, Vec<ClientCertificate>>> = OnceCell::new();
    INDEX.get_or_try_init(SslContext::new_ex_index).copied()
}

/// Store the client certificates on the context and register the selection callback
pub(crate) fn install_certificate_selection(
    builder: &mut SslContextBuilder,
    certificates: Vec<ClientCertificate>,
) -> Result<(), ErrorStack> {
    builder.set_ex_data(certificate_index()?, certificates);

    // SAFETY: the builder owns a valid SSL_CTX, and the callback only reads
    // data owned by that context
    unsafe {
        SSL_CTX_set_client_cert_cb(builder.as_ptr(), Some(select_client_certificate));
    }

    Ok(())
}

/// Issuers the peer named in its certificate request
fn acceptable_issuers(ssl: &SslRef) -> HashSet<String> {
    // SAFETY: the list is owned by the SSL object and outlives this call
    let names: Option<&StackRef<X509Name>> = unsafe {
        let list = SSL_get_client_CA_list(ssl.as_ptr());
        if list.is_null() {
            None
        } else {
            Some(StackRef::from_ptr(list))
        }
    };

    names
        .map(|names| names.iter().map(|name: &X509NameRef| distinguished_name(name)).collect())
        .unwrap_or_default()
}

/// Called by OpenSSL when the peer requests a client certificate
///
/// Returns 1 with new references in `x509`/`pkey` when a certificate is
/// presented, 0 to continue without one.
unsafe extern "C" fn select_client_certificate(
    ssl: *mut ffi::SSL,
    x509: *mut *mut ffi::X509,
    pkey: *mut *mut ffi::EVP_PKEY,
) -> c_int {
    let ssl = SslRef::from_ptr(ssl);

    let available = match certificate_index() {
        Ok(index) => match ssl.ssl_context().ex_data(index) {
            Some(available) => available,
            None => return 0,
        },
        Err(_) => return 0,
    };

    let issuers = acceptable_issuers(ssl);
    match selector::select(&issuers, available) {
        Some(chosen) => {
            debug!(
                "Presenting client certificate {} (issuer {}, {} acceptable issuer(s) requested)",
                chosen.subject(),
                chosen.issuer(),
                issuers.len()
            );

            // OpenSSL takes ownership of one reference to each
            let certificate = chosen.certificate().to_owned();
            let key = chosen.private_key().clone();
            *x509 = certificate.as_ptr();
            *pkey = key.as_ptr();
            std::mem::forget(certificate);
            std::mem::forget(key);
            1
        }
        None => {
            debug!("Peer requested a client certificate but none is configured");
            0
        }
    }
}
