//! Per-connection session state.
//!
//! A `Session` is shared by the registry, the liveness worker, and the
//! application through an `Arc` — never by value — because reconnection
//! mutates the stream underneath a stable identity.
//!
//! Locking: the transmit lock guards an entire framed send (header plus all
//! body chunks), the receive lock an entire framed read. The two are
//! independent; one reader and one writer proceed in parallel on the same
//! full-duplex stream.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use framewire_core::codec::Compression;
use framewire_core::envelope::{self, Payload};
use framewire_core::wire::{self, SessionId};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::error::SessionError;
use crate::framer::{self, FrameRead};
use crate::proxy::CanonicalAddr;

/// Read half of the transport. Boxed so a TLS wrapper can stand in for a
/// plain TCP stream.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
/// Write half of the transport.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

struct TxHalf {
    writer: BoxedWriter,
    chunk_size: u64,
    compression: Option<Compression>,
}

struct RxHalf {
    reader: BoxedReader,
    chunk_size: u64,
    compression: Option<Compression>,
}

/// What the session layer made of one inbound envelope.
pub(crate) enum Inbound {
    Data(Payload),
    Ping,
    Disconnect,
}

/// Control tokens are intercepted on the unpacked payload string, current
/// and legacy forms alike.
pub(crate) fn classify(payload: Payload) -> Inbound {
    if let Payload::Str(text) = &payload {
        if wire::is_ping(text) {
            return Inbound::Ping;
        }
        if wire::is_disconnect(text) {
            return Inbound::Disconnect;
        }
    }
    Inbound::Data(payload)
}

pub struct Session {
    id: SessionId,
    peer_addr: SocketAddr,
    canonical_addr: Option<CanonicalAddr>,
    active: AtomicBool,
    tx: Mutex<TxHalf>,
    rx: Mutex<RxHalf>,
}

impl Session {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: SessionId,
        reader: BoxedReader,
        writer: BoxedWriter,
        peer_addr: SocketAddr,
        canonical_addr: Option<CanonicalAddr>,
        chunk_size: u64,
        compression: Option<Compression>,
    ) -> Self {
        Self {
            id,
            peer_addr,
            canonical_addr,
            active: AtomicBool::new(true),
            tx: Mutex::new(TxHalf {
                writer,
                chunk_size,
                compression: compression.clone(),
            }),
            rx: Mutex::new(RxHalf {
                reader,
                chunk_size,
                compression,
            }),
        }
    }

    /// The stable identity. Assigned once, never mutated.
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Source address recovered from a PROXY preamble, when one was parsed.
    pub fn canonical_addr(&self) -> Option<CanonicalAddr> {
        self.canonical_addr
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Frame and send raw bytes. Holds the transmit lock for the whole frame.
    pub async fn send_bytes(&self, data: &[u8]) -> Result<u64, SessionError> {
        let mut tx = self.tx.lock().await;
        let tx = &mut *tx;
        framer::send_all(&mut tx.writer, data, tx.chunk_size, tx.compression.as_ref()).await
    }

    /// Pack and send one payload. A transport failure closes the session and
    /// returns 0.
    pub async fn send(&self, payload: &Payload) -> u64 {
        let data = match envelope::pack(payload) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(id = %self.id.short(), error = %e, "could not pack message");
                return 0;
            }
        };
        match self.send_bytes(&data).await {
            Ok(sent) => sent,
            Err(e) => {
                tracing::warn!(id = %self.id.short(), error = %e, "could not send message");
                self.close().await;
                0
            }
        }
    }

    async fn receive_frame(&self) -> Result<FrameRead, SessionError> {
        let mut rx = self.rx.lock().await;
        let rx = &mut *rx;
        framer::receive_all(&mut rx.reader, rx.chunk_size, rx.compression.as_ref()).await
    }

    /// Receive the next data payload.
    ///
    /// Pings are discarded invisibly. A disconnect token, EOF, or framing
    /// violation closes the session and returns `None`. An envelope the
    /// version gate rejects surfaces as the empty-string sentinel with the
    /// session left open.
    pub async fn receive(&self) -> Option<Payload> {
        loop {
            let frame = match self.receive_frame().await {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::warn!(id = %self.id.short(), error = %e, "receive failed");
                    self.close().await;
                    return None;
                }
            };
            let bytes = match frame {
                FrameRead::Payload(bytes) => bytes,
                FrameRead::Eof | FrameRead::Violation => {
                    tracing::debug!(id = %self.id.short(), "transport closed");
                    self.close().await;
                    return None;
                }
            };
            match classify(envelope::unpack(&bytes, true)) {
                Inbound::Ping => continue,
                Inbound::Disconnect => {
                    tracing::debug!(id = %self.id.short(), "peer sent disconnect");
                    self.close().await;
                    return None;
                }
                Inbound::Data(payload) => return Some(payload),
            }
        }
    }

    /// Receive with a bound of `rounds` seconds. On expiry the caller gets
    /// `None`; with `close_on_timeout` the session also closes. An expired
    /// wait abandons any frame that was mid-read, so leaving the session
    /// open afterwards is only safe when the peer sends whole frames
    /// between waits.
    pub async fn receive_timeout(&self, rounds: u32, close_on_timeout: bool) -> Option<Payload> {
        match tokio::time::timeout(Duration::from_secs(u64::from(rounds)), self.receive()).await {
            Ok(result) => result,
            Err(_) => {
                if close_on_timeout {
                    self.close().await;
                }
                None
            }
        }
    }

    /// Close the session. Idempotent; the second call is a no-op.
    pub async fn close(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            let mut tx = self.tx.lock().await;
            if let Err(e) = tx.writer.shutdown().await {
                tracing::debug!(id = %self.id.short(), error = %e, "shutdown on close");
            }
        }
    }

    /// Reconnection support: replace both stream halves and the per-
    /// connection framing parameters, and re-arm the session. The identity
    /// is untouched.
    pub async fn swap_stream(
        &self,
        reader: BoxedReader,
        writer: BoxedWriter,
        chunk_size: u64,
        compression: Option<Compression>,
    ) {
        let mut tx = self.tx.lock().await;
        let mut rx = self.rx.lock().await;
        tx.writer = writer;
        tx.chunk_size = chunk_size;
        tx.compression = compression.clone();
        rx.reader = reader;
        rx.chunk_size = chunk_size;
        rx.compression = compression;
        self.active.store(true, Ordering::SeqCst);
    }

    /// Tear a never-registered session back into its parts so they can be
    /// swapped onto an existing one.
    pub(crate) fn into_parts(self) -> (BoxedReader, BoxedWriter, u64, Option<Compression>) {
        let rx = self.rx.into_inner();
        let tx = self.tx.into_inner();
        (rx.reader, tx.writer, tx.chunk_size, tx.compression)
    }
}
