//! Connection-initial handshake: chunk-size negotiation and compression
//! setup. Runs exactly once per connection, before any framed message.

use framewire_core::codec::{CodecError, Compression};
use framewire_core::config::ProtocolConfig;
use framewire_core::wire::{
    self, ChunkField, ChunkSuggestion, InitRequest, InitResponse, INIT_WIDTH, MIN_CHUNK_SIZE,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::SessionError;

/// What both peers agree on once the handshake completes. The chunk size is
/// immutable for the rest of the connection.
#[derive(Debug)]
pub struct Negotiated {
    pub chunk_size: u64,
    pub compression: Option<Compression>,
}

/// Server side, immediately after accept (and PROXY parsing).
///
/// Returns the agreed chunk size: the configured one when `enforce_chunks`
/// is set, otherwise the client's validated suggestion.
pub async fn respond<R, W>(
    reader: &mut R,
    writer: &mut W,
    protocol: &ProtocolConfig,
    compression: Option<&Compression>,
) -> Result<u64, SessionError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut init = vec![0u8; INIT_WIDTH];
    reader
        .read_exact(&mut init)
        .await
        .map_err(handshake_read_error)?;
    let request: InitRequest = wire::parse_padded(&init, INIT_WIDTH)
        .map_err(|e| SessionError::ProtocolMismatch(format!("undecodable init header: {e}")))?;
    if request.req != InitRequest::HEAD {
        return Err(SessionError::ProtocolMismatch(format!(
            "unexpected request head {:?}",
            request.req
        )));
    }

    let ch = if protocol.enforce_chunks {
        ChunkField::Size(protocol.chunk_size)
    } else {
        ChunkField::suggest()
    };
    let response = InitResponse {
        ch,
        enc: compression.map(Compression::enc_field),
    };
    writer.write_all(&wire::pad_json(&response, INIT_WIDTH)?).await?;
    writer.flush().await?;

    if protocol.enforce_chunks {
        return Ok(protocol.chunk_size);
    }

    // The suggestion arrives unpadded in a single write.
    let mut buf = vec![0u8; INIT_WIDTH];
    let n = reader.read(&mut buf).await?;
    if n == 0 {
        return Err(SessionError::HandshakeClosed);
    }
    let suggestion: ChunkSuggestion = serde_json::from_slice(&buf[..n])
        .map_err(|e| SessionError::ProtocolMismatch(format!("undecodable chunk suggestion: {e}")))?;
    if suggestion.ch < MIN_CHUNK_SIZE {
        return Err(SessionError::ProtocolMismatch(format!(
            "suggested chunk size {} below the {MIN_CHUNK_SIZE}-byte minimum",
            suggestion.ch
        )));
    }
    tracing::debug!(chunk_size = suggestion.ch, "adopted client chunk suggestion");
    Ok(suggestion.ch)
}

/// Client side, immediately after connect.
pub async fn initiate<R, W>(
    reader: &mut R,
    writer: &mut W,
    preferred_chunk: u64,
) -> Result<Negotiated, SessionError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    writer
        .write_all(&wire::pad_json(&InitRequest::new(), INIT_WIDTH)?)
        .await?;
    writer.flush().await?;

    let mut buf = vec![0u8; INIT_WIDTH];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(handshake_read_error)?;
    let response: InitResponse = wire::parse_padded(&buf, INIT_WIDTH)
        .map_err(|e| SessionError::ProtocolMismatch(format!("undecodable init response: {e}")))?;

    let chunk_size = if response.ch.is_suggestion() {
        let suggestion = preferred_chunk.max(MIN_CHUNK_SIZE);
        writer
            .write_all(&serde_json::to_vec(&ChunkSuggestion { ch: suggestion }).map_err(
                |e| SessionError::ProtocolMismatch(format!("unencodable suggestion: {e}")),
            )?)
            .await?;
        writer.flush().await?;
        suggestion
    } else {
        match response.ch.size() {
            Some(n) if n >= MIN_CHUNK_SIZE => n,
            Some(n) => {
                return Err(SessionError::ProtocolMismatch(format!(
                    "server chunk size {n} below the {MIN_CHUNK_SIZE}-byte minimum"
                )))
            }
            None => {
                return Err(SessionError::ProtocolMismatch(
                    "ch is neither a size nor a suggestion marker".to_string(),
                ))
            }
        }
    };

    let compression = match response.enc.as_deref() {
        Some(field) => Some(Compression::parse_enc(field).map_err(|e| match e {
            CodecError::UnsupportedAlgorithm(alg) => SessionError::ProtocolMismatch(format!(
                "server proposed unsupported compression {alg:?}"
            )),
            other => SessionError::ProtocolMismatch(other.to_string()),
        })?),
        None => None,
    };

    Ok(Negotiated {
        chunk_size,
        compression,
    })
}

fn handshake_read_error(e: std::io::Error) -> SessionError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        SessionError::HandshakeClosed
    } else {
        SessionError::Io(e)
    }
}
