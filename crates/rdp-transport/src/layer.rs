use std::io::{self, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::Duration;

use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Token};
use rdp_transport_tls::TlsEndpoint;

const READY_POLL_TOKEN: Token = Token(0);

/// The byte-stream endpoint currently carrying the session.
///
/// Dynamic dispatch by integer tag in the original is replaced by a tagged
/// variant: upgrading from `Tcp` to `Tls` consumes the `TcpStream` by value,
/// the TLS session then owns it (and its file descriptor) for the remainder
/// of the connection.
pub(crate) enum Layer {
    Tcp(TcpStream),
    Tls(TlsEndpoint),
    Closed,
}

impl Layer {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Tcp(_) => "tcp",
            Self::Tls(_) => "tls",
            Self::Closed => "closed",
        }
    }

    /// The raw descriptor of the active socket, for [`super::Transport::get_read_fds`].
    pub(crate) fn raw_fd(&self) -> Option<RawFd> {
        match self {
            Self::Tcp(s) => Some(s.as_raw_fd()),
            Self::Tls(s) => Some(s.get_ref().as_raw_fd()),
            Self::Closed => None,
        }
    }

    /// Blocks for up to `timeout` waiting for the active socket to become readable.
    ///
    /// This is the `tcp_can_recv` primitive `read_exact`'s idle back-off
    /// falls back on: a short, bounded wait rather than a busy loop.
    pub(crate) fn can_recv(&mut self, timeout: Duration) -> io::Result<bool> {
        let mut poll = Poll::new()?;
        let mut events = Events::with_capacity(1);

        match self {
            Self::Tcp(s) => poll.registry().register(s, READY_POLL_TOKEN, Interest::READABLE)?,
            Self::Tls(s) => poll.registry().register(s.get_mut(), READY_POLL_TOKEN, Interest::READABLE)?,
            Self::Closed => return Ok(false),
        }

        poll.poll(&mut events, Some(timeout))?;
        Ok(!events.is_empty())
    }

    pub(crate) fn take(&mut self) -> Self {
        std::mem::replace(self, Self::Closed)
    }
}

impl Read for Layer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(s) => s.read(buf),
            Self::Tls(s) => s.read(buf),
            Self::Closed => Err(io::Error::new(io::ErrorKind::NotConnected, "transport is closed")),
        }
    }
}

impl Write for Layer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(s) => s.write(buf),
            Self::Tls(s) => s.write(buf),
            Self::Closed => Err(io::Error::new(io::ErrorKind::NotConnected, "transport is closed")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(s) => s.flush(),
            Self::Tls(s) => s.flush(),
            Self::Closed => Ok(()),
        }
    }
}
