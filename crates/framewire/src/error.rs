//! Typed errors surfaced at the session boundary.

use framewire_core::codec::CodecError;
use framewire_core::config::ConfigError;
use framewire_core::envelope::EnvelopeError;
use framewire_core::wire::WireError;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The peer spoke something other than this protocol during handshake.
    /// Fatal for the connection.
    #[error("protocol mismatch: {0}")]
    ProtocolMismatch(String),

    /// The peer closed the connection before the handshake completed.
    #[error("peer closed the connection during handshake")]
    HandshakeClosed,

    /// The server refused to resume the presented identity.
    #[error("server denied reconnection")]
    ReconnectionDenied,

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
