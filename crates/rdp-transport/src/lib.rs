//! Transport core for an RDP client: multiplexes TPKT, Fast-Path, and
//! `TSRequest` framing over a byte stream, and owns the in-place TCP-to-TLS
//! (and optional NLA) upgrade that RDP negotiates mid-connection.
//!
//! [`Transport`] is deliberately blind to everything above framing: it never
//! interprets a PDU's payload, only recognizes where one ends and the next
//! begins.

#[macro_use]
extern crate tracing;

mod credssp;
mod error;
mod layer;
mod settings;
mod transport;

pub use self::credssp::{CredsspAuthenticator, CredsspStep};
pub use self::error::{TransportError, TransportErrorExt, TransportErrorKind, TransportResult};
pub use self::settings::TransportSettings;
pub use self::transport::{RecvCallback, Transport};

pub use rdp_transport_framing::Framing;
