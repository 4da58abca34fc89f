//! framewire integration test harness.
//!
//! Every test runs a real server on loopback TCP with its accept loop
//! spawned as a task; clients connect through the public API.

mod concurrency;
mod handshake_flow;
mod messaging;
mod proxy_front;
mod reconnection;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use framewire::{Server, Session};
use framewire_core::config::{ClientConfig, ServerConfig};
use tokio::sync::mpsc;

pub struct TestServer {
    pub server: Arc<Server>,
    pub addr: SocketAddr,
    sessions: mpsc::UnboundedReceiver<Arc<Session>>,
}

/// Ephemeral-port loopback config, compression off unless a test opts in.
pub fn loopback_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.listen.address = "127.0.0.1".to_string();
    config.listen.port = 0;
    config.protocol.compression_level = 0;
    config
}

pub fn client_config() -> ClientConfig {
    ClientConfig::default()
}

/// Bind a server and run its accept loop, forwarding registered sessions.
pub async fn start(config: ServerConfig) -> TestServer {
    // RUST_LOG controls verbosity when a test needs tracing output
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let server = Arc::new(Server::bind(config).expect("server should bind"));
    let addr = server.local_addr().expect("listener address");
    let (tx, rx) = mpsc::unbounded_channel();
    let acceptor = server.clone();
    tokio::spawn(async move {
        loop {
            match acceptor.accept().await {
                Ok(Some(session)) => {
                    if tx.send(session).is_err() {
                        return;
                    }
                }
                Ok(None) => continue,
                Err(e) => {
                    eprintln!("accept error: {e}");
                    continue;
                }
            }
        }
    });
    TestServer {
        server,
        addr,
        sessions: rx,
    }
}

impl TestServer {
    /// Wait for the next freshly registered session.
    pub async fn next_session(&mut self) -> Arc<Session> {
        tokio::time::timeout(Duration::from_secs(5), self.sessions.recv())
            .await
            .expect("timed out waiting for a session")
            .expect("accept loop ended")
    }
}
