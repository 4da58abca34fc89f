//! framewire — framed, length-delimited message sessions over reliable
//! stream transports.
//!
//! A connection starts with a fixed-width handshake that settles the chunk
//! size and optional compression, then carries typed envelopes in both
//! directions. The server assigns each client a stable 128-bit identity,
//! pings it for liveness, and can resume the identity across a reconnect.

pub mod client;
pub mod error;
pub mod framer;
pub mod handshake;
pub mod multiplex;
pub mod proxy;
pub mod server;
pub mod session;

pub use client::Client;
pub use error::SessionError;
pub use framewire_core::{Compression, Payload, SessionId};
pub use server::Server;
pub use session::Session;
