//! Optional payload compression negotiated at handshake.
//!
//! The server proposes `"<alg> <level>"` in the init response's `enc` field;
//! a client that does not support the algorithm must fail the handshake.

use std::fmt;

/// Compression level bounds for zstd.
pub const MIN_LEVEL: i32 = 1;
pub const MAX_LEVEL: i32 = 22;

/// Algorithms this implementation can negotiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Zstd,
}

impl Algorithm {
    pub fn name(self) -> &'static str {
        match self {
            Algorithm::Zstd => "zstd",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "zstd" => Some(Algorithm::Zstd),
            _ => None,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A negotiated compressor. Absent entirely when the connection is
/// uncompressed; the framer then passes payloads through untouched.
#[derive(Debug, Clone)]
pub struct Compression {
    algorithm: Algorithm,
    level: i32,
}

impl Compression {
    pub fn zstd(level: i32) -> Result<Self, CodecError> {
        if !(MIN_LEVEL..=MAX_LEVEL).contains(&level) {
            return Err(CodecError::LevelOutOfRange(level));
        }
        Ok(Self {
            algorithm: Algorithm::Zstd,
            level,
        })
    }

    /// Parse the handshake `enc` field: 4 algorithm chars, one space, then
    /// up to 3 decimal level digits.
    pub fn parse_enc(field: &str) -> Result<Self, CodecError> {
        let alg = field
            .get(..4)
            .ok_or_else(|| CodecError::BadEncField(field.to_string()))?;
        let algorithm = Algorithm::from_name(alg)
            .ok_or_else(|| CodecError::UnsupportedAlgorithm(alg.to_string()))?;
        let end = field.len().min(8);
        let level = field
            .get(5..end)
            .and_then(|s| s.trim().parse::<i32>().ok())
            .ok_or_else(|| CodecError::BadEncField(field.to_string()))?;
        match algorithm {
            Algorithm::Zstd => Self::zstd(level),
        }
    }

    /// Render the handshake `enc` field for this configuration.
    pub fn enc_field(&self) -> String {
        format!("{} {}", self.algorithm, self.level)
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn level(&self) -> i32 {
        self.level
    }

    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        match self.algorithm {
            Algorithm::Zstd => zstd::bulk::compress(data, self.level).map_err(CodecError::Compress),
        }
    }

    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        match self.algorithm {
            Algorithm::Zstd => zstd::stream::decode_all(data).map_err(CodecError::Decompress),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("unsupported compression algorithm {0:?}")]
    UnsupportedAlgorithm(String),

    #[error("compression level {0} outside {MIN_LEVEL}..={MAX_LEVEL}")]
    LevelOutOfRange(i32),

    #[error("malformed enc field {0:?}")]
    BadEncField(String),

    #[error("compress: {0}")]
    Compress(#[source] std::io::Error),

    #[error("decompress: {0}")]
    Decompress(#[source] std::io::Error),
}
