//! Client side — connect, identity exchange, reconnection, orderly close.

use std::net::SocketAddr;
use std::time::Duration;

use framewire_core::codec::Compression;
use framewire_core::config::ClientConfig;
use framewire_core::envelope::{self, Payload};
use framewire_core::wire::{self, SessionId};
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::error::SessionError;
use crate::framer::{self, FrameRead};
use crate::handshake;
use crate::session::{BoxedReader, BoxedWriter, Session};

/// Seconds a command exchange (reconnect) waits for the server's verdict.
const COMMAND_TIMEOUT_SECS: u64 = 15;

/// A connected client. Holds the session (identity, transmit/receive locks)
/// and the chunk preference used when a server solicits suggestions.
pub struct Client {
    session: Session,
    preferred_chunk: u64,
}

impl Client {
    /// Connect over plain TCP, handshake, and obtain an identity.
    pub async fn connect(addr: SocketAddr, config: ClientConfig) -> Result<Self, SessionError> {
        let stream = TcpStream::connect(addr).await?;
        let peer_addr = stream.peer_addr()?;
        let (r, w) = stream.into_split();
        Self::establish(Box::new(r), Box::new(w), peer_addr, config.chunk_size).await
    }

    /// Connect over an externally supplied stream, e.g. a TLS wrapper.
    pub async fn connect_wrapped(
        reader: BoxedReader,
        writer: BoxedWriter,
        peer_addr: SocketAddr,
        config: ClientConfig,
    ) -> Result<Self, SessionError> {
        Self::establish(reader, writer, peer_addr, config.chunk_size).await
    }

    async fn establish(
        mut reader: BoxedReader,
        mut writer: BoxedWriter,
        peer_addr: SocketAddr,
        preferred_chunk: u64,
    ) -> Result<Self, SessionError> {
        let negotiated = handshake::initiate(&mut reader, &mut writer, preferred_chunk).await?;
        let chunk = negotiated.chunk_size;
        let compression = negotiated.compression;

        send_payload(&mut writer, chunk, compression.as_ref(), &Payload::from(wire::HELLO_ACK))
            .await?;
        expect_hello_ack(&mut reader, chunk, compression.as_ref()).await?;

        send_payload(&mut writer, chunk, compression.as_ref(), &Payload::from(wire::ASK_ID))
            .await?;
        let reply = recv_payload(&mut reader, chunk, compression.as_ref()).await?;
        let id = reply
            .as_ref()
            .and_then(Payload::as_json)
            .and_then(|v| v.get("ID"))
            .and_then(Value::as_str)
            .and_then(SessionId::from_hex)
            .ok_or_else(|| {
                SessionError::ProtocolMismatch("server did not assign an identity".to_string())
            })?;

        tracing::info!(peer = %peer_addr, id = %id.short(), "connected");
        let session = Session::new(id, reader, writer, peer_addr, None, chunk, compression);
        Ok(Self {
            session,
            preferred_chunk,
        })
    }

    /// The server-assigned identity.
    pub fn id(&self) -> SessionId {
        self.session.id()
    }

    pub fn is_active(&self) -> bool {
        self.session.is_active()
    }

    /// Pack and send. Returns the on-wire byte count, 0 on failure (the
    /// session is then closed).
    pub async fn send(&self, payload: &Payload) -> u64 {
        self.session.send(payload).await
    }

    /// Frame and send raw bytes.
    pub async fn send_bytes(&self, data: &[u8]) -> Result<u64, SessionError> {
        self.session.send_bytes(data).await
    }

    /// Receive the next data payload. Pings never surface; a server
    /// disconnect closes the session and returns `None`.
    pub async fn receive(&self) -> Option<Payload> {
        self.session.receive().await
    }

    /// Receive bounded by `rounds` seconds.
    pub async fn receive_timeout(&self, rounds: u32, close_on_timeout: bool) -> Option<Payload> {
        self.session.receive_timeout(rounds, close_on_timeout).await
    }

    /// Resume this client's identity over a fresh TCP connection.
    pub async fn reconnect(&self, addr: SocketAddr) -> Result<(), SessionError> {
        let stream = TcpStream::connect(addr).await?;
        let (r, w) = stream.into_split();
        self.resume(Box::new(r), Box::new(w)).await
    }

    /// Resume over an externally supplied stream.
    pub async fn reconnect_wrapped(
        &self,
        reader: BoxedReader,
        writer: BoxedWriter,
    ) -> Result<(), SessionError> {
        self.resume(reader, writer).await
    }

    async fn resume(
        &self,
        mut reader: BoxedReader,
        mut writer: BoxedWriter,
    ) -> Result<(), SessionError> {
        let negotiated = handshake::initiate(&mut reader, &mut writer, self.preferred_chunk).await?;
        let chunk = negotiated.chunk_size;
        let compression = negotiated.compression;

        send_payload(&mut writer, chunk, compression.as_ref(), &Payload::from(wire::HELLO_ACK))
            .await?;
        expect_hello_ack(&mut reader, chunk, compression.as_ref()).await?;

        let request = Payload::Json(json!({
            "cmd": wire::REQ_RECONNECT,
            "id": self.session.id().to_hex(),
        }));
        send_payload(&mut writer, chunk, compression.as_ref(), &request).await?;

        let reply = tokio::time::timeout(
            Duration::from_secs(COMMAND_TIMEOUT_SECS),
            recv_payload(&mut reader, chunk, compression.as_ref()),
        )
        .await
        .map_err(|_| SessionError::ReconnectionDenied)??;

        match reply.as_ref().and_then(|p| p.as_str()) {
            Some(verdict) if verdict == wire::RECONNECT_OK => {
                self.session
                    .swap_stream(reader, writer, chunk, compression)
                    .await;
                tracing::info!(id = %self.session.id().short(), "reconnected");
                Ok(())
            }
            _ => Err(SessionError::ReconnectionDenied),
        }
    }

    /// Orderly close: announce the disconnect (best-effort) and close the
    /// stream. Idempotent.
    pub async fn disconnect(&self) {
        if self.session.is_active() {
            self.session.send(&Payload::from(wire::DISCONNECT)).await;
        }
        self.session.close().await;
    }
}

async fn send_payload<W>(
    writer: &mut W,
    chunk_size: u64,
    compression: Option<&Compression>,
    payload: &Payload,
) -> Result<u64, SessionError>
where
    W: AsyncWrite + Unpin,
{
    let data = envelope::pack(payload)?;
    framer::send_all(writer, &data, chunk_size, compression).await
}

/// Receive one data payload during connection setup, skipping any liveness
/// pings that slip in. `None` means the transport closed.
async fn recv_payload<R>(
    reader: &mut R,
    chunk_size: u64,
    compression: Option<&Compression>,
) -> Result<Option<Payload>, SessionError>
where
    R: AsyncRead + Unpin,
{
    loop {
        match framer::receive_all(reader, chunk_size, compression).await? {
            FrameRead::Payload(bytes) => {
                let payload = envelope::unpack(&bytes, true);
                if let Payload::Str(text) = &payload {
                    if wire::is_ping(text) {
                        continue;
                    }
                }
                return Ok(Some(payload));
            }
            FrameRead::Eof | FrameRead::Violation => return Ok(None),
        }
    }
}

async fn expect_hello_ack<R>(
    reader: &mut R,
    chunk_size: u64,
    compression: Option<&Compression>,
) -> Result<(), SessionError>
where
    R: AsyncRead + Unpin,
{
    match recv_payload(reader, chunk_size, compression).await? {
        Some(Payload::Str(text)) if text == wire::HELLO_ACK => Ok(()),
        _ => Err(SessionError::ProtocolMismatch(
            "server did not acknowledge hello".to_string(),
        )),
    }
}
