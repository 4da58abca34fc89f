//! Framed message I/O — one fixed-width header followed by a chunked body.
//!
//! Both operations are atomic from the caller's viewpoint; the session layer
//! serializes them through its transmit/receive locks. The framer never
//! interprets payload contents.

use bytes::BytesMut;
use framewire_core::codec::Compression;
use framewire_core::wire::{self, FrameHeader, HEADER_WIDTH};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::SessionError;

/// Outcome of reading one frame.
#[derive(Debug, PartialEq, Eq)]
pub enum FrameRead {
    /// A complete payload, decompressed if the connection negotiated a codec.
    Payload(Vec<u8>),
    /// The header or body violates the protocol. The advertised body was not
    /// consumed; the session layer decides whether to keep the stream.
    Violation,
    /// EOF before or inside a frame.
    Eof,
}

/// Write one framed message: compress, emit the padded header in a single
/// write, then the body in writes of at most `chunk_size` bytes. Returns the
/// on-wire (post-compression) payload length.
pub async fn send_all<W>(
    writer: &mut W,
    payload: &[u8],
    chunk_size: u64,
    compression: Option<&Compression>,
) -> Result<u64, SessionError>
where
    W: AsyncWrite + Unpin,
{
    let compressed;
    let body: &[u8] = match compression {
        Some(codec) => {
            compressed = codec.compress(payload)?;
            &compressed
        }
        None => payload,
    };

    let len = body.len() as u64;
    let header = FrameHeader {
        a: len,
        r: len.min(chunk_size),
    };
    writer
        .write_all(&wire::pad_json(&header, HEADER_WIDTH)?)
        .await?;
    for chunk in body.chunks(chunk_size.max(1) as usize) {
        writer.write_all(chunk).await?;
    }
    writer.flush().await?;
    Ok(len)
}

/// Read one framed message. EOF and protocol violations are outcomes, not
/// errors — only genuine transport failures propagate as `Err`.
pub async fn receive_all<R>(
    reader: &mut R,
    chunk_size: u64,
    compression: Option<&Compression>,
) -> Result<FrameRead, SessionError>
where
    R: AsyncRead + Unpin,
{
    let mut header_buf = [0u8; HEADER_WIDTH];
    if let Err(e) = reader.read_exact(&mut header_buf).await {
        return if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Ok(FrameRead::Eof)
        } else {
            Err(e.into())
        };
    }

    let header: FrameHeader = match wire::parse_padded(&header_buf, HEADER_WIDTH) {
        Ok(h) => h,
        Err(e) => {
            tracing::debug!(error = %e, "frame header violates protocol");
            return Ok(FrameRead::Violation);
        }
    };
    if header.r > chunk_size {
        tracing::debug!(
            advertised = header.r,
            chunk_size,
            "frame chunk size exceeds the negotiated limit"
        );
        return Ok(FrameRead::Violation);
    }

    let total = header.a as usize;
    let mut body = BytesMut::with_capacity(total.min(64 * 1024));
    let mut scratch = vec![0u8; (chunk_size as usize).min(total)];
    let mut remaining = total;
    while remaining > 0 {
        let take = remaining.min(chunk_size as usize);
        match reader.read_exact(&mut scratch[..take]).await {
            Ok(_) => {
                body.extend_from_slice(&scratch[..take]);
                remaining -= take;
            }
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                tracing::debug!(expected = total, missing = remaining, "EOF inside frame body");
                return Ok(FrameRead::Eof);
            }
            Err(e) => return Err(e.into()),
        }
    }

    match compression {
        Some(codec) => match codec.decompress(&body) {
            Ok(data) => Ok(FrameRead::Payload(data)),
            Err(e) => {
                tracing::debug!(error = %e, "frame body failed to decompress");
                Ok(FrameRead::Violation)
            }
        },
        None => Ok(FrameRead::Payload(body.to_vec())),
    }
}
