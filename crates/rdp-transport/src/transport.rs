use std::net::ToSocketAddrs;
use std::os::unix::io::RawFd;
use std::thread;
use std::time::Duration;

use bytes::{Bytes, BytesMut};

use crate::credssp::{run_credssp_exchange, CredsspAuthenticator};
use crate::error::{TransportError, TransportErrorExt as _, TransportResult};
use crate::layer::Layer;
use crate::settings::TransportSettings;

/// Idle back-off used by the blocking read path when the active layer has no
/// socket to poll (e.g. right after `Closed`), mirroring the original's
/// `usleep`-based spin between `tcp_can_recv` attempts.
const IDLE_BACKOFF: Duration = Duration::from_micros(100);

/// How long the blocking path waits for readiness before re-checking.
const READY_TIMEOUT: Duration = Duration::from_millis(100);

/// Bytes pulled from the wire per non-blocking read attempt.
const READ_CHUNK: usize = 4096;

/// Headroom `check_readiness` keeps available in the receive buffer so a
/// single readable event can absorb a full PDU without reallocating mid-read.
const READINESS_HEADROOM: usize = 32 * 1024;

/// Callback invoked by [`Transport::check_readiness`] with each complete PDU.
pub type RecvCallback = Box<dyn FnMut(&[u8]) -> TransportResult<()>>;

/// The transport core: multiplexes TPKT, Fast-Path, and `TSRequest` framing
/// over a TCP or TLS byte stream, and owns the in-place TCP-to-TLS upgrade.
///
/// Two read disciplines share the same receive buffer and the same framing
/// logic: [`Transport::read_one`] blocks until exactly one PDU is available
/// (used while negotiating the connection), and [`Transport::check_readiness`]
/// dispatches whatever complete PDUs are already on the wire without ever
/// blocking (used once the session is running).
pub struct Transport<'a> {
    layer: Layer,
    settings: &'a TransportSettings,
    blocking: bool,
    recv_buffer: BytesMut,
    recv_callback: Option<RecvCallback>,
    host: String,
    level: u32,
}

impl<'a> Transport<'a> {
    /// Opens a TCP connection to `host:port` and wraps it. Starts in blocking
    /// mode, as required for the handshake that follows.
    ///
    /// Dials with a genuinely blocking `std::net::TcpStream::connect` and
    /// only switches the socket to non-blocking afterward: `mio`'s own
    /// `TcpStream::connect` issues a non-blocking `connect(2)` that can
    /// return before the three-way handshake finishes, which would make an
    /// immediately-following `write` spuriously fail with `WouldBlock`.
    pub fn connect_tcp(settings: &'a TransportSettings, host: &str, port: u16) -> TransportResult<Self> {
        let addr = (host, port)
            .to_socket_addrs()
            .map_err(|e| TransportError::io("resolve host", e))?
            .next()
            .ok_or_else(|| TransportError::general("resolve host: no addresses"))?;

        let stream = std::net::TcpStream::connect(addr).map_err(|e| TransportError::io("connect_tcp", e))?;

        debug!(%host, port, "connected");

        Self::from_std_stream(settings, stream, host.to_owned())
    }

    /// Adopts an already-connected socket without dialing out, for server-side use.
    pub fn attach(settings: &'a TransportSettings, stream: std::net::TcpStream) -> TransportResult<Self> {
        Self::from_std_stream(settings, stream, String::new())
    }

    fn from_std_stream(settings: &'a TransportSettings, stream: std::net::TcpStream, host: String) -> TransportResult<Self> {
        stream
            .set_nonblocking(true)
            .map_err(|e| TransportError::io("set_nonblocking", e))?;

        Ok(Self {
            layer: Layer::Tcp(mio::net::TcpStream::from_std(stream)),
            settings,
            blocking: true,
            recv_buffer: BytesMut::new(),
            recv_callback: None,
            host,
            level: 0,
        })
    }

    /// Installs the callback `check_readiness` invokes with each complete PDU.
    pub fn set_recv_callback(&mut self, callback: RecvCallback) {
        self.recv_callback = Some(callback);
    }

    /// Switches between the blocking (handshake) and non-blocking (session)
    /// read disciplines. The underlying socket is always OS-nonblocking;
    /// this only changes whether `read_one` loops-and-waits or returns
    /// immediately.
    pub fn set_blocking_mode(&mut self, blocking: bool) {
        self.blocking = blocking;
    }

    /// The file descriptor of the active layer, for building an external
    /// `select`/`poll` set alongside other sources.
    pub fn get_read_fds(&self) -> Option<RawFd> {
        self.layer.raw_fd()
    }

    /// Upgrades the active TCP layer to TLS (client side), consuming it.
    pub fn upgrade_to_tls(&mut self) -> TransportResult<()> {
        let tcp = match self.layer.take() {
            Layer::Tcp(stream) => stream,
            other => {
                self.layer = other;
                return Err(TransportError::general("upgrade_to_tls: layer is not tcp"));
            }
        };

        debug!("upgrading to tls");

        let endpoint = rdp_transport_tls::TlsEndpoint::connect(tcp, &self.host)
            .map_err(|e| TransportError::io("upgrade_to_tls", e))?;
        self.layer = Layer::Tls(endpoint);

        Ok(())
    }

    /// Upgrades to TLS, then runs CredSSP over it if `settings.authentication` is set.
    pub fn upgrade_to_nla<A>(&mut self, authenticator: &mut A) -> TransportResult<()>
    where
        A: CredsspAuthenticator + ?Sized,
    {
        self.upgrade_to_tls()?;

        if !self.settings.authentication {
            return Ok(());
        }

        debug!("running credssp");
        run_credssp_exchange(self, authenticator)
    }

    /// Accepts the TLS handshake (server side), consuming the active TCP
    /// layer. Builds the `TlsAcceptor` from `settings.cert_file`/
    /// `settings.privatekey_file`, the settings the transport consults per
    /// the configuration surface.
    pub fn accept_tls(&mut self) -> TransportResult<()> {
        let cert_file = self
            .settings
            .cert_file
            .as_deref()
            .ok_or_else(|| TransportError::general("accept_tls: settings.cert_file is not set"))?;
        let privatekey_file = self
            .settings
            .privatekey_file
            .as_deref()
            .ok_or_else(|| TransportError::general("accept_tls: settings.privatekey_file is not set"))?;

        let acceptor = rdp_transport_tls::acceptor_from_pem_files(cert_file, privatekey_file)
            .map_err(|e| TransportError::io("accept_tls", e))?;

        let tcp = match self.layer.take() {
            Layer::Tcp(stream) => stream,
            other => {
                self.layer = other;
                return Err(TransportError::general("accept_tls: layer is not tcp"));
            }
        };

        let endpoint =
            rdp_transport_tls::TlsEndpoint::accept(&acceptor, tcp).map_err(|e| TransportError::io("accept_tls", e))?;
        self.layer = Layer::Tls(endpoint);

        Ok(())
    }

    /// Accepts TLS, then runs CredSSP over it if `settings.authentication` is set.
    pub fn accept_nla<A>(&mut self, authenticator: &mut A) -> TransportResult<()>
    where
        A: CredsspAuthenticator + ?Sized,
    {
        self.accept_tls()?;

        if !self.settings.authentication {
            return Ok(());
        }

        run_credssp_exchange(self, authenticator)
    }

    /// Shuts down the active layer (sending `close_notify` over TLS first) and marks the transport closed.
    pub fn disconnect(mut self) -> TransportResult<()> {
        self.shutdown_active_layer()
    }

    fn shutdown_active_layer(&mut self) -> TransportResult<()> {
        debug!(layer = self.layer.name(), "disconnecting");

        if let Layer::Tls(endpoint) = &mut self.layer {
            endpoint.shutdown().map_err(|e| TransportError::io("disconnect", e))?;
        }
        self.layer = Layer::Closed;
        Ok(())
    }

    /// Writes `buf` in full to the active layer.
    ///
    /// On a zero-byte ("would block") status, sleeps [`IDLE_BACKOFF`] and
    /// retries rather than treating it as a failure — the socket is always
    /// OS-nonblocking, so a large PDU or a congested peer can legitimately
    /// make a single `write` call return `WouldBlock` mid-transfer. Any other
    /// error is taken as evidence the peer is gone: `layer` moves to
    /// `Closed` before the error is returned, and every subsequent call
    /// fails fast without touching the socket again.
    pub fn write(&mut self, buf: &[u8]) -> TransportResult<()> {
        use std::io::Write as _;

        if matches!(self.layer, Layer::Closed) {
            return Err(TransportError::peer_closed(
                "write",
                std::io::Error::new(std::io::ErrorKind::NotConnected, "transport is closed"),
            ));
        }

        let mut offset = 0;
        while offset < buf.len() {
            match self.layer.write(&buf[offset..]) {
                Ok(0) => thread::sleep(IDLE_BACKOFF),
                Ok(n) => offset += n,
                Err(e) if crate::error::is_would_block(&e) => thread::sleep(IDLE_BACKOFF),
                Err(e) => {
                    self.layer = Layer::Closed;
                    return Err(TransportError::peer_closed("write", e));
                }
            }
        }

        Ok(())
    }

    /// Blocks until exactly one complete PDU (TPKT, Fast-Path, or `TSRequest`)
    /// has been read, and returns it. Used during connection negotiation,
    /// where the transport is always in blocking mode.
    ///
    /// # Panics
    ///
    /// Panics if the transport is in non-blocking mode; `read_one` is a
    /// negotiation-time primitive, `check_readiness` covers the session.
    pub fn read_one(&mut self) -> TransportResult<Bytes> {
        assert!(
            self.blocking,
            "read_one is a blocking-path primitive; call set_blocking_mode(true) first"
        );

        loop {
            if let Some(length) = self.buffered_frame_length()? {
                self.fill_until(length)?;
                return Ok(self.recv_buffer.split_to(length).freeze());
            }

            self.fill_one_blocking()?;
        }
    }

    /// Non-blocking dispatch: reads whatever is currently available and, if
    /// a complete PDU has accumulated, hands it to the installed callback.
    ///
    /// Returns the number of PDU bytes dispatched this call (`0` if nothing
    /// complete is buffered yet). Reentrant calls (e.g. from within the
    /// callback itself) are rejected.
    pub fn check_readiness(&mut self) -> TransportResult<usize> {
        if self.level > 0 {
            return Err(TransportError::reentrant());
        }

        self.level += 1;
        let result = self.check_readiness_inner();
        self.level -= 1;
        result
    }

    fn check_readiness_inner(&mut self) -> TransportResult<usize> {
        self.recv_buffer.reserve(READINESS_HEADROOM);
        self.fill_one_nonblocking()?;

        let length = match self.buffered_frame_length()? {
            Some(length) if self.recv_buffer.len() >= length => length,
            _ => return Ok(0),
        };

        let pdu = self.recv_buffer.split_to(length);

        if let Some(callback) = self.recv_callback.as_mut() {
            callback(&pdu)?;
        }

        Ok(pdu.len())
    }

    fn buffered_frame_length(&self) -> TransportResult<Option<usize>> {
        match rdp_transport_framing::find_size(&self.recv_buffer) {
            Ok(Some(info)) => Ok(Some(info.length)),
            Ok(None) => Ok(None),
            Err(e) => {
                debug!(bytes = ?&self.recv_buffer[..], "unrecognized pdu framing");
                Err(TransportError::protocol("read", e))
            }
        }
    }

    fn fill_until(&mut self, length: usize) -> TransportResult<()> {
        while self.recv_buffer.len() < length {
            self.fill_one_blocking()?;
        }
        Ok(())
    }

    /// One read attempt; on `WouldBlock`, waits for readiness (or sleeps, if
    /// the layer has no socket to poll) and retries until bytes arrive.
    fn fill_one_blocking(&mut self) -> TransportResult<()> {
        loop {
            match self.read_chunk()? {
                0 => self.wait_for_readiness()?,
                _ => return Ok(()),
            }
        }
    }

    /// A single non-blocking read attempt; returns immediately either way.
    fn fill_one_nonblocking(&mut self) -> TransportResult<()> {
        self.read_chunk()?;
        Ok(())
    }

    /// Reads up to [`READ_CHUNK`] bytes into the receive buffer. Returns the
    /// number of bytes read, or `0` if nothing was available right now.
    fn read_chunk(&mut self) -> TransportResult<usize> {
        use std::io::Read as _;

        let mut chunk = [0u8; READ_CHUNK];

        match self.layer.read(&mut chunk) {
            Ok(0) => Err(TransportError::io(
                "read",
                std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "peer closed the connection"),
            )),
            Ok(n) => {
                self.recv_buffer.extend_from_slice(&chunk[..n]);
                Ok(n)
            }
            Err(e) if crate::error::is_would_block(&e) => Ok(0),
            Err(e) => Err(TransportError::io("read", e)),
        }
    }

    fn wait_for_readiness(&mut self) -> TransportResult<()> {
        match self.layer.can_recv(READY_TIMEOUT) {
            Ok(_) => Ok(()),
            Err(_) => {
                thread::sleep(IDLE_BACKOFF);
                Ok(())
            }
        }
    }
}

impl Drop for Transport<'_> {
    fn drop(&mut self) {
        let _ = self.shutdown_active_layer();
    }
}
