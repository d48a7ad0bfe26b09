use std::fmt;
use std::io;

use rdp_transport_error::Error;

/// The transport's error taxonomy.
///
/// The transport never recovers on its own — it reports one of these and
/// leaves the decision to disconnect to the session owner.
#[derive(Debug)]
#[non_exhaustive]
pub enum TransportErrorKind {
    /// A negative status from the active endpoint, propagated as-is.
    Io(io::Error),
    /// Header bytes matched no recognized framing, or a `TSRequest` length
    /// encoding was too wide.
    Protocol(rdp_transport_framing::FramingError),
    /// CredSSP failed; the operator should double check credentials.
    Auth,
    /// A write returned a negative status; the peer is assumed gone, `layer`
    /// has moved to `Closed`, and all subsequent operations fail fast.
    PeerClosed(io::Error),
    /// `CheckReadiness` was invoked while already dispatching.
    Reentrant,
    General(&'static str),
    Custom,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(_) => write!(f, "I/O error"),
            Self::Protocol(_) => write!(f, "protocol error"),
            Self::Auth => write!(f, "authentication failed; check credentials"),
            Self::PeerClosed(_) => write!(f, "peer closed the connection"),
            Self::Reentrant => write!(f, "check_readiness invoked re-entrantly"),
            Self::General(context) => write!(f, "{context}"),
            Self::Custom => write!(f, "custom error"),
        }
    }
}

impl std::error::Error for TransportErrorKind {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) | Self::PeerClosed(e) => Some(e),
            Self::Protocol(e) => Some(e),
            Self::Auth | Self::Reentrant | Self::General(_) | Self::Custom => None,
        }
    }
}

pub type TransportError = Error<TransportErrorKind>;
pub type TransportResult<T> = Result<T, TransportError>;

pub trait TransportErrorExt {
    fn io(context: &'static str, error: io::Error) -> Self;
    fn protocol(context: &'static str, error: rdp_transport_framing::FramingError) -> Self;
    fn auth(context: &'static str, source: impl rdp_transport_error::Source) -> Self;
    fn peer_closed(context: &'static str, error: io::Error) -> Self;
    fn reentrant() -> Self;
    fn general(context: &'static str) -> Self;
    fn custom<E>(context: &'static str, error: E) -> Self
    where
        E: rdp_transport_error::Source;
}

impl TransportErrorExt for TransportError {
    fn io(context: &'static str, error: io::Error) -> Self {
        Self::new(context, TransportErrorKind::Io(error))
    }

    fn protocol(context: &'static str, error: rdp_transport_framing::FramingError) -> Self {
        Self::new(context, TransportErrorKind::Protocol(error))
    }

    fn auth(context: &'static str, source: impl rdp_transport_error::Source) -> Self {
        Self::new(context, TransportErrorKind::Auth).with_source(source)
    }

    fn peer_closed(context: &'static str, error: io::Error) -> Self {
        Self::new(context, TransportErrorKind::PeerClosed(error))
    }

    fn reentrant() -> Self {
        Self::new("check_readiness", TransportErrorKind::Reentrant)
    }

    fn general(context: &'static str) -> Self {
        Self::new(context, TransportErrorKind::General(context))
    }

    fn custom<E>(context: &'static str, error: E) -> Self
    where
        E: rdp_transport_error::Source,
    {
        Self::new(context, TransportErrorKind::Custom).with_source(error)
    }
}

/// `true` if `error` is an I/O error meaning "no data available right now",
/// i.e. not a real failure.
pub(crate) fn is_would_block(error: &io::Error) -> bool {
    error.kind() == io::ErrorKind::WouldBlock
}
