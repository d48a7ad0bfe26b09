use std::path::PathBuf;

/// Read-only configuration the transport consults while upgrading layers.
///
/// Owned by the caller and borrowed for the transport's lifetime; loading it
/// from a file, environment, or CLI is entirely the caller's concern.
#[derive(Debug, Clone, Default)]
pub struct TransportSettings {
    /// Whether `upgrade_to_nla` should run CredSSP after the TLS handshake,
    /// or stop at plain TLS.
    pub authentication: bool,
    /// Server-side certificate, for `accept_tls`/`accept_nla`.
    pub cert_file: Option<PathBuf>,
    /// Server-side private key, for `accept_tls`/`accept_nla`.
    pub privatekey_file: Option<PathBuf>,
}
