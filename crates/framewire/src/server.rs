//! Server side — accept loop, client registry, liveness, and fan-out.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use framewire_core::codec::Compression;
use framewire_core::config::{ServerConfig, StackMode};
use framewire_core::envelope::Payload;
use framewire_core::wire::{self, SessionId};
use serde_json::{json, Value};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

use crate::error::SessionError;
use crate::handshake;
use crate::multiplex;
use crate::proxy;
use crate::session::{BoxedReader, BoxedWriter, Session};

/// Adapter applied to each accepted stream before the handshake, e.g. a TLS
/// acceptor. Installing one disables PROXY parsing — a PROXY preamble would
/// precede the TLS handshake, not follow it.
pub type StreamWrapper = Box<
    dyn Fn(
            TcpStream,
        )
            -> futures::future::BoxFuture<'static, std::io::Result<(BoxedReader, BoxedWriter)>>
        + Send
        + Sync,
>;

/// Backoff after a failed accept so a hosed listener cannot spin the loop.
const ACCEPT_RETRY: Duration = Duration::from_millis(500);

pub struct Server {
    config: ServerConfig,
    listener: TcpListener,
    compression: Option<Compression>,
    sessions: Arc<Mutex<Vec<Arc<Session>>>>,
    wrapper: Option<StreamWrapper>,
}

impl Server {
    /// Bind the listener per the configured stack mode. Must run inside a
    /// tokio runtime.
    pub fn bind(config: ServerConfig) -> Result<Self, SessionError> {
        config.validate()?;

        let compression = if config.protocol.compression_level > 0 {
            Some(Compression::zstd(config.protocol.compression_level)?)
        } else {
            None
        };

        let ip: IpAddr = config.listen.address.parse().map_err(|_| {
            SessionError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid listen address {:?}", config.listen.address),
            ))
        })?;

        let domain = match config.listen.stack {
            StackMode::V4 => Domain::IPV4,
            StackMode::Dual | StackMode::V6Only => Domain::IPV6,
        };
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        if config.listen.reuse_port {
            socket.set_reuse_port(true)?;
        }
        match config.listen.stack {
            StackMode::Dual => socket.set_only_v6(false)?,
            StackMode::V6Only => socket.set_only_v6(true)?,
            StackMode::V4 => {}
        }
        socket.bind(&SocketAddr::new(ip, config.listen.port).into())?;
        socket.listen(config.listen.backlog as i32)?;
        socket.set_nonblocking(true)?;
        let listener = TcpListener::from_std(socket.into())?;

        tracing::info!(
            addr = %format!("{}:{}", config.listen.address, config.listen.port),
            stack = ?config.listen.stack,
            "listening"
        );

        Ok(Self {
            config,
            listener,
            compression,
            sessions: Arc::new(Mutex::new(Vec::new())),
            wrapper: None,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Install a stream wrapper for every subsequently accepted connection.
    pub fn set_stream_wrapper(&mut self, wrapper: StreamWrapper) {
        if self.config.protocol.allow_proxy {
            tracing::warn!("PROXY parsing is disabled while a stream wrapper is installed");
        }
        self.wrapper = Some(wrapper);
    }

    /// Accept the next client and walk it through protocol enforcement.
    ///
    /// Returns `Ok(Some(..))` for a freshly registered session. Reconnect
    /// reuse, rejected hellos, and dead-on-arrival connections resolve to
    /// `Ok(None)`; the accept loop simply continues. A handshake-level
    /// protocol mismatch is a typed error.
    pub async fn accept(&self) -> Result<Option<Arc<Session>>, SessionError> {
        let (stream, peer_addr) = loop {
            match self.listener.accept().await {
                Ok(pair) => break pair,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed, retrying");
                    tokio::time::sleep(ACCEPT_RETRY).await;
                }
            }
        };
        tracing::debug!(peer = %peer_addr, "connection accepted");
        self.establish(stream, peer_addr).await
    }

    async fn establish(
        &self,
        mut stream: TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<Option<Arc<Session>>, SessionError> {
        let canonical = if self.config.protocol.allow_proxy && self.wrapper.is_none() {
            proxy::parse_proxy_header(&mut stream).await?
        } else {
            None
        };

        let (mut reader, mut writer): (BoxedReader, BoxedWriter) = match &self.wrapper {
            Some(wrap) => wrap(stream).await?,
            None => {
                let (r, w) = stream.into_split();
                (Box::new(r), Box::new(w))
            }
        };

        let chunk_size = handshake::respond(
            &mut reader,
            &mut writer,
            &self.config.protocol,
            self.compression.as_ref(),
        )
        .await?;

        let session = Session::new(
            SessionId::generate(),
            reader,
            writer,
            peer_addr,
            canonical,
            chunk_size,
            self.compression.clone(),
        );

        let first = match session.receive().await {
            Some(payload) => payload,
            None => return Ok(None),
        };
        if first.as_str() != Some(wire::HELLO_ACK) {
            tracing::debug!(peer = %peer_addr, "first envelope is not a hello, dropping");
            session.close().await;
            return Ok(None);
        }
        if session.send(&Payload::from(wire::HELLO_ACK)).await == 0 {
            return Ok(None);
        }

        let second = match session.receive().await {
            Some(payload) => payload,
            None => return Ok(None),
        };

        if let Some(text) = second.as_str() {
            if wire::is_ask_id(text) {
                let session = Arc::new(session);
                let reply = Payload::Json(json!({ "ID": session.id().to_hex() }));
                if session.send(&reply).await == 0 {
                    return Ok(None);
                }
                self.sessions.lock().await.push(session.clone());
                self.spawn_liveness(session.clone());
                tracing::info!(
                    peer = %peer_addr,
                    id = %session.id().short(),
                    "session registered"
                );
                return Ok(Some(session));
            }
        }

        if let Some(object) = second.as_json() {
            if object.get("cmd").and_then(Value::as_str) == Some(wire::REQ_RECONNECT) {
                let presented = object
                    .get("id")
                    .and_then(Value::as_str)
                    .and_then(SessionId::from_hex);
                self.handle_reconnect(session, presented).await;
                return Ok(None);
            }
        }

        tracing::debug!(peer = %peer_addr, "unrecognized hello sequence, dropping");
        session.close().await;
        Ok(None)
    }

    /// Swap the newly accepted stream onto the prior session, or deny.
    /// The swap runs off the accept loop so a stream half still pinned by a
    /// stale read cannot stall accepting.
    async fn handle_reconnect(&self, incoming: Session, presented: Option<SessionId>) {
        let existing = match presented {
            Some(id) => self.find_by_id(id).await,
            None => None,
        };
        match existing {
            Some(session) => {
                let (reader, writer, chunk_size, compression) = incoming.into_parts();
                tokio::spawn(async move {
                    session
                        .swap_stream(reader, writer, chunk_size, compression)
                        .await;
                    session.send(&Payload::from(wire::RECONNECT_OK)).await;
                    tracing::info!(id = %session.id().short(), "session resumed on a new stream");
                });
            }
            None => {
                tracing::debug!("reconnection denied, identity unknown");
                incoming.send(&Payload::from(wire::RECONNECT_DENIED)).await;
                incoming.close().await;
            }
        }
    }

    /// Background liveness worker: 1-second activity polls, a ping every
    /// interval. A failed ping closes the session; the worker then prunes it
    /// from the registry and exits.
    fn spawn_liveness(&self, session: Arc<Session>) {
        let interval = self.config.liveness.ping_interval_secs.max(1);
        let sessions = self.sessions.clone();
        tokio::spawn(async move {
            loop {
                for _ in 0..interval {
                    if !session.is_active() {
                        remove_session(&sessions, &session).await;
                        tracing::debug!(
                            id = %session.id().short(),
                            "liveness worker stopped, session closed"
                        );
                        return;
                    }
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
                session.send(&Payload::from(wire::PING)).await;
                if !session.is_active() {
                    remove_session(&sessions, &session).await;
                    tracing::info!(
                        id = %session.id().short(),
                        "liveness ping failed, session removed"
                    );
                    return;
                }
            }
        });
    }

    /// Receive from one session, pruning it from the registry when the
    /// transport closes or the peer disconnects.
    pub async fn receive(&self, session: &Arc<Session>) -> Option<Payload> {
        match session.receive().await {
            Some(payload) => Some(payload),
            None => {
                remove_session(&self.sessions, session).await;
                None
            }
        }
    }

    /// Close a session and drop it from the registry.
    pub async fn remove(&self, session: &Arc<Session>) {
        remove_session(&self.sessions, session).await;
        session.close().await;
    }

    /// Linear lookup by identity.
    pub async fn find_by_id(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions
            .lock()
            .await
            .iter()
            .find(|s| s.id() == id)
            .cloned()
    }

    /// Snapshot of the registered sessions, in registration order.
    pub async fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions.lock().await.clone()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Fan one payload out to every registered session except `skip`.
    /// Per-peer failures are logged and swallowed; results come back in
    /// registry order.
    pub async fn multi_send(&self, payload: &Payload, skip: Option<&Arc<Session>>) -> Vec<u64> {
        let targets: Vec<Arc<Session>> = self
            .sessions
            .lock()
            .await
            .iter()
            .filter(|s| skip.map_or(true, |skip| !Arc::ptr_eq(s, skip)))
            .cloned()
            .collect();
        multiplex::multi_send(&targets, payload).await
    }

    /// Re-register a removed session and poll its activity flag for up to
    /// `timeout_rounds` seconds, waiting for a reconnect to land on it.
    pub async fn wait_for_reconnection(&self, session: Arc<Session>, timeout_rounds: u32) -> bool {
        {
            let mut list = self.sessions.lock().await;
            if list.iter().any(|s| Arc::ptr_eq(s, &session)) {
                return false;
            }
            list.push(session.clone());
        }
        for _ in 0..timeout_rounds {
            if session.is_active() {
                break;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        self.find_by_id(session.id()).await.is_some()
    }

    /// Close every session and empty the registry. The listener itself is
    /// released when the server is dropped.
    pub async fn shutdown(&self) {
        let drained: Vec<Arc<Session>> = {
            let mut list = self.sessions.lock().await;
            std::mem::take(&mut *list)
        };
        for session in drained {
            session.close().await;
        }
    }
}

async fn remove_session(sessions: &Mutex<Vec<Arc<Session>>>, session: &Arc<Session>) -> bool {
    let mut list = sessions.lock().await;
    let before = list.len();
    list.retain(|s| !Arc::ptr_eq(s, session));
    before != list.len()
}
