//! CredSSP is an external collaborator: this crate only drives its
//! send/receive loop over the transport, it never decodes a `TSRequest`.
//!
//! A real implementation (ASN.1 DER encoding, NTLM/Kerberos, channel
//! binding to the TLS server's public key) lives outside this crate and is
//! injected as a [`CredsspAuthenticator`].

use crate::error::TransportResult;

/// One step of the CredSSP exchange.
#[derive(Debug)]
pub enum CredsspStep {
    /// Send `request` to the peer, then read the next `TSRequest` and feed it back in.
    SendAndContinue { request: Vec<u8> },
    /// CredSSP completed successfully; no further `TSRequest`s are expected.
    Done,
}

/// Contract for the authentication sub-protocol layered on TLS by NLA.
///
/// `ironrdp_connector::credssp::CredsspSequence` is the real-world shape
/// this mirrors: construct once per connection, then repeatedly hand it the
/// peer's last response and send whatever it produces until it reports
/// [`CredsspStep::Done`].
pub trait CredsspAuthenticator {
    /// Produces the initial `TSRequest` to send, before any response has been received.
    fn init(&mut self) -> TransportResult<Vec<u8>>;

    /// Feeds the peer's last `TSRequest` response and produces the next step.
    fn step(&mut self, peer_response: &[u8]) -> TransportResult<CredsspStep>;
}

/// Drives `authenticator` to completion over `transport`.
///
/// This is the one piece of `upgrade_to_nla`/`accept_nla` that is genuinely
/// generic over the authenticator implementation, so it is exposed as a free
/// function rather than inlined into `Transport` directly.
pub(crate) fn run_credssp_exchange<A>(
    transport: &mut crate::Transport<'_>,
    authenticator: &mut A,
) -> TransportResult<()>
where
    A: CredsspAuthenticator + ?Sized,
{
    let mut request = authenticator.init()?;

    loop {
        transport.write(&request)?;

        let response = transport.read_one()?;

        match authenticator.step(&response)? {
            CredsspStep::SendAndContinue { request: next } => request = next,
            CredsspStep::Done => return Ok(()),
        }
    }
}
