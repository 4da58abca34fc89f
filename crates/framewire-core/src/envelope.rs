//! Application envelope — the self-describing JSON wrapper every message
//! travels in: `{"msg": .., "type": .., "version": ..}`.
//!
//! `msg` is always a scalar at this layer: bytes are base64-encoded,
//! structured objects are re-stringified, strings and integers appear as
//! their natural JSON values.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version carried in every envelope. Peers are accepted under
/// SemVer caret compatibility: same major, minor/patch at least this.
pub const PROTOCOL_VERSION: &str = "1.0.0";

/// A typed application payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Str(String),
    Int(i64),
    Bytes(Vec<u8>),
    Json(Value),
}

impl Payload {
    /// Wire value of the `type` discriminator.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Payload::Str(_) => "str",
            Payload::Int(_) => "int",
            Payload::Bytes(_) => "bytes",
            Payload::Json(_) => "json",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Payload::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(v) => Some(v),
            _ => None,
        }
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::Str(s.to_string())
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::Str(s)
    }
}

impl From<i64> for Payload {
    fn from(i: i64) -> Self {
        Payload::Int(i)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(b: Vec<u8>) -> Self {
        Payload::Bytes(b)
    }
}

impl From<Value> for Payload {
    fn from(v: Value) -> Self {
        Payload::Json(v)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    msg: Value,
    #[serde(rename = "type")]
    kind: String,
    version: String,
}

/// Serialize a payload into its wire envelope.
pub fn pack(payload: &Payload) -> Result<Vec<u8>, EnvelopeError> {
    let msg = match payload {
        Payload::Str(s) => Value::String(s.clone()),
        Payload::Int(i) => Value::from(*i),
        Payload::Bytes(b) => Value::String(BASE64.encode(b)),
        Payload::Json(v) => Value::String(v.to_string()),
    };
    let envelope = Envelope {
        msg,
        kind: payload.type_tag().to_string(),
        version: PROTOCOL_VERSION.to_string(),
    };
    Ok(serde_json::to_vec(&envelope)?)
}

/// Decode a wire envelope into a typed payload, enforcing the version gate.
pub fn try_unpack(data: &[u8]) -> Result<Payload, EnvelopeError> {
    let envelope: Envelope = serde_json::from_slice(data)?;

    let remote = Version::parse(&envelope.version)
        .map_err(|_| EnvelopeError::BadVersion(envelope.version.clone()))?;
    if !local_requirement().matches(&remote) {
        return Err(EnvelopeError::IncompatibleVersion { remote });
    }

    match envelope.kind.as_str() {
        "str" => match envelope.msg {
            Value::String(s) => Ok(Payload::Str(s)),
            _ => Err(EnvelopeError::Decode { kind: "str" }),
        },
        "int" => match &envelope.msg {
            Value::Number(n) => n
                .as_i64()
                .map(Payload::Int)
                .ok_or(EnvelopeError::Decode { kind: "int" }),
            Value::String(s) => s
                .parse::<i64>()
                .map(Payload::Int)
                .map_err(|_| EnvelopeError::Decode { kind: "int" }),
            _ => Err(EnvelopeError::Decode { kind: "int" }),
        },
        "bytes" => match &envelope.msg {
            Value::String(s) => BASE64
                .decode(s)
                .map(Payload::Bytes)
                .map_err(|_| EnvelopeError::Decode { kind: "bytes" }),
            _ => Err(EnvelopeError::Decode { kind: "bytes" }),
        },
        "json" => match &envelope.msg {
            Value::String(s) => serde_json::from_str(s)
                .map(Payload::Json)
                .map_err(|_| EnvelopeError::Decode { kind: "json" }),
            _ => Err(EnvelopeError::Decode { kind: "json" }),
        },
        other => Err(EnvelopeError::UnknownType(other.to_string())),
    }
}

/// Lenient unpack used by the session layer: any failure is logged and
/// collapses to the empty-string sentinel, keeping the session open.
pub fn unpack(data: &[u8], suppress_errors: bool) -> Payload {
    match try_unpack(data) {
        Ok(payload) => payload,
        Err(e) => {
            if suppress_errors {
                tracing::debug!(error = %e, "dropping incompatible envelope");
            } else {
                tracing::error!(error = %e, "dropping incompatible envelope");
            }
            Payload::Str(String::new())
        }
    }
}

fn local_requirement() -> VersionReq {
    // ^PROTOCOL_VERSION; the constant always parses, STAR is a type-level fallback
    VersionReq::parse(&format!("^{PROTOCOL_VERSION}")).unwrap_or(VersionReq::STAR)
}

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("envelope is not decodable JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("envelope version {0:?} is not valid semver")]
    BadVersion(String),

    #[error("peer version {remote} is incompatible with {PROTOCOL_VERSION}")]
    IncompatibleVersion { remote: Version },

    #[error("unknown payload type {0:?}")]
    UnknownType(String),

    #[error("payload does not decode as {kind}")]
    Decode { kind: &'static str },
}
