//! Framewire wire format — on-wire header types and control tokens.
//!
//! These types ARE the protocol. Every constant, every token string, every
//! padding rule here is part of the wire format and must not change without
//! a protocol version bump.
//!
//! Both fixed-width headers are JSON objects right-padded with ASCII spaces
//! to their window size. A receiver parses them by truncating at the first
//! `}` inside the window and decoding the prefix.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ── Window sizes ─────────────────────────────────────────────────────────────

/// Width of the per-message frame header, in bytes.
pub const HEADER_WIDTH: usize = 128;

/// Width of the handshake header exchanged once per connection, in bytes.
pub const INIT_WIDTH: usize = 1024;

/// Default negotiated chunk size when neither side overrides it.
pub const DEFAULT_CHUNK_SIZE: u64 = 1024;

/// Smallest chunk size the protocol permits. A chunk smaller than the frame
/// header would make the header span multiple chunks.
pub const MIN_CHUNK_SIZE: u64 = HEADER_WIDTH as u64;

// ── Control tokens ───────────────────────────────────────────────────────────

/// Handshake-layer acknowledgement exchanged right after the init headers.
pub const HELLO_ACK: &str = "HelloAck";

/// Client request for its server-assigned identity.
pub const ASK_ID: &str = "ASK ID";

/// Liveness ping. Discarded silently by the receiving session layer.
pub const PING: &str = "KSCKT PING";

/// Orderly close announcement.
pub const DISCONNECT: &str = "KSCKT DISCONNECT";

// Long-form synonyms from protocol 0.x peers. Accepted inbound only;
// the short tokens above are the only forms ever emitted.
const LEGACY_ASK_ID: &str = "ms_SimpleSocketAskID_version";
const LEGACY_PING: &str = "ms_SimpleSocketPing_version";
const LEGACY_DISCONNECT: &str = "ms_SimpleSocketDisconnect_version";

/// Reconnection request command word (`{"cmd": ..., "id": ...}` envelope).
pub const REQ_RECONNECT: &str = "REQ RECONN";

/// Server accepted a reconnection and swapped the stream.
pub const RECONNECT_OK: &str = "RECONN OK";

/// Server found no session for the presented identity.
pub const RECONNECT_DENIED: &str = "RECONN DE";

/// The `ch` value a server sends when it accepts a client chunk suggestion.
pub const CHUNK_SUGGEST: &str = "sc";

/// True for a liveness ping, current or legacy form.
pub fn is_ping(msg: &str) -> bool {
    msg == PING || msg == LEGACY_PING
}

/// True for an orderly-close token, current or legacy form.
pub fn is_disconnect(msg: &str) -> bool {
    msg == DISCONNECT || msg == LEGACY_DISCONNECT
}

/// True for an identity request. The current form may be embedded in a
/// larger string; the legacy form is matched the same way.
pub fn is_ask_id(msg: &str) -> bool {
    msg.contains(ASK_ID) || msg.contains(LEGACY_ASK_ID)
}

// ── PROXY protocol magics ────────────────────────────────────────────────────

/// PROXY protocol v1 preamble (text form).
pub const PROXY_V1_MAGIC: &[u8] = b"PROXY ";

/// PROXY protocol v2 signature (binary form).
pub const PROXY_V2_MAGIC: [u8; 12] = [
    0x0D, 0x0A, 0x0D, 0x0A, 0x00, 0x0D, 0x0A, 0x51, 0x55, 0x49, 0x54, 0x0A,
];

// ── Frame header ─────────────────────────────────────────────────────────────

/// Per-message frame header: `a` is the total payload length after any
/// compression, `r` the size of the chunks the body is written in.
///
/// Invariants: `r <= negotiated chunk size`; exactly `a` payload bytes
/// follow the header on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameHeader {
    pub a: u64,
    pub r: u64,
}

// ── Handshake headers ────────────────────────────────────────────────────────

/// Client → server init header, padded to [`INIT_WIDTH`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitRequest {
    pub req: String,
}

impl InitRequest {
    /// The only request head the protocol defines.
    pub const HEAD: &'static str = "request-head";

    pub fn new() -> Self {
        Self {
            req: Self::HEAD.to_string(),
        }
    }
}

impl Default for InitRequest {
    fn default() -> Self {
        Self::new()
    }
}

/// The `ch` field of the server's init response: either an authoritative
/// chunk size or the literal `"sc"` inviting a client suggestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChunkField {
    Size(u64),
    Literal(String),
}

impl ChunkField {
    pub fn suggest() -> Self {
        ChunkField::Literal(CHUNK_SUGGEST.to_string())
    }

    pub fn is_suggestion(&self) -> bool {
        matches!(self, ChunkField::Literal(s) if s == CHUNK_SUGGEST)
    }

    pub fn size(&self) -> Option<u64> {
        match self {
            ChunkField::Size(n) => Some(*n),
            ChunkField::Literal(_) => None,
        }
    }
}

/// Server → client init response, padded to [`INIT_WIDTH`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitResponse {
    pub ch: ChunkField,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enc: Option<String>,
}

/// Unpadded client chunk suggestion sent when the server advertises `"sc"`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChunkSuggestion {
    pub ch: u64,
}

// ── Padded JSON helpers ──────────────────────────────────────────────────────

/// Serialize `value` and right-pad with ASCII spaces to exactly `width` bytes.
pub fn pad_json<T: Serialize>(value: &T, width: usize) -> Result<Vec<u8>, WireError> {
    let text = serde_json::to_string(value)?;
    if text.len() > width {
        return Err(WireError::HeaderOverflow {
            len: text.len(),
            width,
        });
    }
    let mut buf = Vec::with_capacity(width);
    buf.extend_from_slice(text.as_bytes());
    buf.resize(width, b' ');
    Ok(buf)
}

/// Decode a padded header: truncate at the first `}` within the first
/// `width` bytes and JSON-decode the prefix.
pub fn parse_padded<T: DeserializeOwned>(bytes: &[u8], width: usize) -> Result<T, WireError> {
    let window = &bytes[..bytes.len().min(width)];
    let text = std::str::from_utf8(window).map_err(|_| WireError::NotUtf8)?;
    let end = text.find('}').ok_or(WireError::Unterminated)?;
    Ok(serde_json::from_str(&text[..=end])?)
}

// ── Session identity ─────────────────────────────────────────────────────────

/// Opaque 128-bit identity a server assigns to each accepted client.
///
/// Stable for the lifetime of the logical session, which may span transport
/// reconnects. Rendered as 32 lowercase hex digits on the wire and in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u128);

impl SessionId {
    /// Mint a fresh identity from the OS-seeded RNG.
    pub fn generate() -> Self {
        Self(rand::random())
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        u128::from_str_radix(s, 16).ok().map(Self)
    }

    pub fn to_hex(self) -> String {
        hex::encode(self.0.to_be_bytes())
    }

    /// First eight hex digits, for log lines.
    pub fn short(self) -> String {
        self.to_hex()[..8].to_string()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s).ok_or_else(|| WireError::BadIdentity(s.to_string()))
    }
}

// ── Errors ───────────────────────────────────────────────────────────────────

/// Errors that can arise when encoding or decoding wire-format headers.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("header JSON of {len} bytes exceeds the {width}-byte window")]
    HeaderOverflow { len: usize, width: usize },

    #[error("header window is not valid UTF-8")]
    NotUtf8,

    #[error("no closing brace inside the header window")]
    Unterminated,

    #[error("header JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed session identity: {0:?}")]
    BadIdentity(String),
}

// ── Tests ────────────────────────────────────────────────────────────────────
