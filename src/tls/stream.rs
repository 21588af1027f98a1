//! Raw and secure streams
//!
//! `RawStream` is what the caller hands in: a connected, blocking byte stream
//! with socket-style timeouts. `SecureStream` is what a successful upgrade
//! hands back. It owns the raw stream from then on.

use super::info::SessionInfo;
use openssl::ssl::SslStream;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

/// Connected, bidirectional byte stream that can be upgraded to TLS
pub trait RawStream: Read + Write + Sized {
    /// Open a second handle to the same connection
    ///
    /// Dropping either handle must not close the connection while the other
    /// one is alive.
    fn try_clone(&self) -> io::Result<Self>;

    fn read_timeout(&self) -> io::Result<Option<Duration>>;

    fn write_timeout(&self) -> io::Result<Option<Duration>>;

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;

    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;

    /// Shut down both directions of the connection
    fn disconnect(&self) -> io::Result<()>;
}

macro_rules! socket_raw_stream {
    ($stream:ty) => {
        impl RawStream for $stream {
            fn try_clone(&self) -> io::Result<Self> {
                <$stream>::try_clone(self)
            }

            fn read_timeout(&self) -> io::Result<Option<Duration>> {
                <$stream>::read_timeout(self)
            }

            fn write_timeout(&self) -> io::Result<Option<Duration>> {
                <$stream>::write_timeout(self)
            }

            fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
                <$stream>::set_read_timeout(self, timeout)
            }

            fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
                <$stream>::set_write_timeout(self, timeout)
            }

            fn disconnect(&self) -> io::Result<()> {
                <$stream>::shutdown(self, Shutdown::Both)
            }
        }
    };
}

socket_raw_stream!(TcpStream);

#[cfg(unix)]
socket_raw_stream!(std::os::unix::net::UnixStream);

/// Encrypted stream produced by a successful upgrade
///
/// Reads and writes go through TLS. Dropping the stream, or calling
/// `close`, closes the underlying raw stream.
pub struct SecureStream<S: RawStream> {
    stream: SslStream<S>,
    info: SessionInfo,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
}

impl<S: RawStream> SecureStream<S> {
    /// Wrap an established session whose raw stream already has `timeout`
    /// applied in both directions
    pub(crate) fn new(stream: SslStream<S>, timeout: Option<Duration>) -> Self {
        let info = SessionInfo::from_ssl(stream.ssl());
        SecureStream {
            stream,
            info,
            read_timeout: timeout,
            write_timeout: timeout,
        }
    }

    /// Details of the negotiated session
    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    /// Read timeout as configured
    ///
    /// The kernel may round the value it applies to the socket up to its
    /// timer granularity; this reports the value that was asked for.
    pub fn read_timeout(&self) -> io::Result<Option<Duration>> {
        Ok(self.read_timeout)
    }

    /// Write timeout as configured
    pub fn write_timeout(&self) -> io::Result<Option<Duration>> {
        Ok(self.write_timeout)
    }

    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.stream.get_ref().set_read_timeout(timeout)?;
        self.read_timeout = timeout;
        Ok(())
    }

    pub fn set_write_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.stream.get_ref().set_write_timeout(timeout)?;
        self.write_timeout = timeout;
        Ok(())
    }

    /// Get reference to underlying raw stream
    pub fn get_ref(&self) -> &S {
        self.stream.get_ref()
    }

    /// Get reference to the OpenSSL session
    pub fn ssl(&self) -> &openssl::ssl::SslRef {
        self.stream.ssl()
    }

    /// Send close_notify and shut down the underlying raw stream
    pub fn close(mut self) -> io::Result<()> {
        // Peer may already be gone; close_notify is best effort
        let _ = self.stream.shutdown();

        match self.stream.get_ref().disconnect() {
            // Peer closed first
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            result => result,
        }
    }
}

impl<S: RawStream> Read for SecureStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl<S: RawStream> Write for SecureStream<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl<S: RawStream> std::fmt::Debug for SecureStream<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureStream")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}
