//! PROXY protocol (v1/v2) front-end awareness.
//!
//! When a load balancer sits in front of the listener, the first bytes of an
//! accepted connection carry the original client's address. The parser peeks
//! before consuming, so a connection without a preamble is left untouched.
//!
//! Never invoked on TLS-wrapped streams: a PROXY preamble precedes the TLS
//! handshake, so there is nothing to parse inside the wrapped stream.

use std::io;
use std::net::IpAddr;

use framewire_core::wire::{PROXY_V1_MAGIC, PROXY_V2_MAGIC};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

/// Source address recovered from a PROXY preamble.
pub type CanonicalAddr = (IpAddr, u16);

// v1 lines are at most 107 bytes including CRLF.
const V1_MAX_LINE: usize = 107;

/// Detect and consume a PROXY preamble, if present.
pub async fn parse_proxy_header(stream: &mut TcpStream) -> io::Result<Option<CanonicalAddr>> {
    let mut peeked = [0u8; 16];
    let n = stream.peek(&mut peeked).await?;
    let peeked = &peeked[..n];

    if peeked.starts_with(PROXY_V1_MAGIC) {
        parse_v1(stream).await
    } else if peeked.starts_with(&PROXY_V2_MAGIC) {
        parse_v2(stream).await
    } else {
        Ok(None)
    }
}

/// Text form: `PROXY TCP4|TCP6 <src_ip> <dst_ip> <src_port> <dst_port>\r\n`.
async fn parse_v1(stream: &mut TcpStream) -> io::Result<Option<CanonicalAddr>> {
    let mut line = Vec::with_capacity(V1_MAX_LINE);
    let mut byte = [0u8; 1];
    while !line.ends_with(b"\r\n") {
        if line.len() > V1_MAX_LINE {
            tracing::debug!("PROXY v1 line exceeds the protocol maximum");
            return Ok(None);
        }
        stream.read_exact(&mut byte).await?;
        line.push(byte[0]);
    }

    let text = match std::str::from_utf8(&line[..line.len() - 2]) {
        Ok(t) => t,
        Err(_) => return Ok(None),
    };
    let parts: Vec<&str> = text.split(' ').collect();
    if parts.len() >= 6 && (parts[1] == "TCP4" || parts[1] == "TCP6") {
        if let (Ok(ip), Ok(port)) = (parts[2].parse::<IpAddr>(), parts[4].parse::<u16>()) {
            return Ok(Some((ip, port)));
        }
    }
    tracing::debug!(line = text, "unparseable PROXY v1 line");
    Ok(None)
}

/// Binary form: 12-byte magic, then (ver_cmd, fam, len_be16), then `len`
/// bytes of addresses. Source address and port sit at fixed offsets per
/// family.
async fn parse_v2(stream: &mut TcpStream) -> io::Result<Option<CanonicalAddr>> {
    let mut magic = [0u8; 12];
    stream.read_exact(&mut magic).await?;

    let mut head = [0u8; 4];
    stream.read_exact(&mut head).await?;
    let fam = head[1];
    let len = u16::from_be_bytes([head[2], head[3]]) as usize;

    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await?;

    match fam {
        0x11 if len >= 12 => {
            let ip = IpAddr::from([body[0], body[1], body[2], body[3]]);
            let port = u16::from_be_bytes([body[8], body[9]]);
            Ok(Some((ip, port)))
        }
        0x21 if len >= 36 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&body[..16]);
            let ip = IpAddr::from(octets);
            let port = u16::from_be_bytes([body[32], body[33]]);
            Ok(Some((ip, port)))
        }
        other => {
            tracing::debug!(fam = other, "unhandled PROXY v2 family");
            Ok(None)
        }
    }
}
