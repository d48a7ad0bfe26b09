//! TLS upgrade of an already-connected [`TcpStream`], blocking or readiness-polled.
//!
//! RDP negotiates encryption over an already-open TPKT channel, so the TLS
//! handshake has to happen *in place* on the same socket rather than on a
//! fresh connection. [`TlsEndpoint::connect`] and [`TlsEndpoint::accept`]
//! drive that handshake to completion: if the socket is non-blocking and the
//! handshake would block, they park on a short-lived [`mio::Poll`] rather
//! than spin, mirroring the approach `ironrdp-client-blocking` uses to
//! upgrade its own non-blocking `TcpStream`.

use std::io::{self, Read, Write};
use std::path::Path;
use std::time::Duration;

use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Token};
use native_tls::{HandshakeError, Identity, MidHandshakeTlsStream, TlsAcceptor, TlsConnector};
use tracing::debug;

const HANDSHAKE_POLL_TOKEN: Token = Token(0);
const HANDSHAKE_POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Builds a [`TlsAcceptor`] from a PEM certificate chain and private key on
/// disk, for the server-side in-place TCP-to-TLS upgrade.
pub fn acceptor_from_pem_files(cert_file: &Path, key_file: &Path) -> io::Result<TlsAcceptor> {
    let cert = std::fs::read(cert_file)?;
    let key = std::fs::read(key_file)?;

    let identity = Identity::from_pkcs8(&cert, &key).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

    TlsAcceptor::new(identity).map_err(|e| io::Error::new(io::ErrorKind::Other, e))
}

/// An established TLS session layered over a [`TcpStream`].
pub struct TlsEndpoint {
    stream: native_tls::TlsStream<TcpStream>,
}

impl TlsEndpoint {
    /// Performs the client side of the TLS handshake over `stream`.
    ///
    /// Certificate validation is disabled: RDP servers overwhelmingly present
    /// self-signed certificates, and the caller is expected to verify the
    /// server's identity out of band (e.g. via NLA/CredSSP's channel
    /// binding) rather than through the X.509 chain.
    pub fn connect(stream: TcpStream, server_name: &str) -> io::Result<Self> {
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .use_sni(false)
            .build()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        let stream = match connector.connect(server_name, stream) {
            Ok(stream) => stream,
            Err(HandshakeError::WouldBlock(mid)) => drive_handshake(mid)?,
            Err(HandshakeError::Failure(e)) => return Err(io::Error::new(io::ErrorKind::Other, e)),
        };

        debug!("tls handshake complete (client)");

        Ok(Self { stream })
    }

    /// Performs the server side of the TLS handshake over `stream`.
    pub fn accept(acceptor: &TlsAcceptor, stream: TcpStream) -> io::Result<Self> {
        let stream = match acceptor.accept(stream) {
            Ok(stream) => stream,
            Err(HandshakeError::WouldBlock(mid)) => drive_handshake(mid)?,
            Err(HandshakeError::Failure(e)) => return Err(io::Error::new(io::ErrorKind::Other, e)),
        };

        debug!("tls handshake complete (server)");

        Ok(Self { stream })
    }

    /// The raw SubjectPublicKeyInfo bytes of the peer's certificate.
    ///
    /// NLA binds the CredSSP exchange to this key so a man-in-the-middle
    /// can't relay a different TLS session; this is the hook a
    /// `CredsspAuthenticator` implementation uses to obtain it.
    pub fn peer_public_key(&self) -> io::Result<Vec<u8>> {
        use x509_cert::der::Decode as _;

        let cert = self
            .stream
            .peer_certificate()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "peer certificate is missing"))?;
        let cert = cert.to_der().map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let cert = x509_cert::Certificate::from_der(&cert).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        cert.tbs_certificate
            .subject_public_key_info
            .subject_public_key
            .as_bytes()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "subject public key BIT STRING is not aligned"))
    }

    pub fn get_ref(&self) -> &TcpStream {
        self.stream.get_ref()
    }

    pub fn get_mut(&mut self) -> &mut TcpStream {
        self.stream.get_mut()
    }

    /// Closes the TLS session (sends `close_notify`) without closing the underlying socket.
    pub fn shutdown(&mut self) -> io::Result<()> {
        match self.stream.shutdown() {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Read for TlsEndpoint {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for TlsEndpoint {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

fn drive_handshake<S>(mut mid: MidHandshakeTlsStream<S>) -> io::Result<native_tls::TlsStream<S>>
where
    S: Read + Write + mio::event::Source,
{
    let mut poll = Poll::new()?;
    let mut events = Events::with_capacity(16);

    poll.registry()
        .register(mid.get_mut(), HANDSHAKE_POLL_TOKEN, Interest::READABLE | Interest::WRITABLE)?;

    loop {
        poll.poll(&mut events, Some(HANDSHAKE_POLL_TIMEOUT))?;

        match mid.handshake() {
            Ok(stream) => return Ok(stream),
            Err(HandshakeError::WouldBlock(next)) => mid = next,
            Err(HandshakeError::Failure(e)) => return Err(io::Error::new(io::ErrorKind::Other, e)),
        }
    }
}
