//! framewire-core — wire format, application envelope, compression, and
//! configuration. The session crate (`framewire`) builds on this one.

pub mod codec;
pub mod config;
pub mod envelope;
pub mod wire;

pub use codec::Compression;
pub use envelope::{Payload, PROTOCOL_VERSION};
pub use wire::SessionId;
