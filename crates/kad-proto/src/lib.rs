//! # kad-proto
//!
//! The wire vocabulary shared between the dispatcher and the lookup
//! engine: the `Request`/`Reply` tagged variants of the three overlay
//! RPCs (`FIND_NODE`, `STORE_VALUE`, `GET_VALUE`), and the versioned
//! envelope they travel inside.
//!
//! Encoding is CBOR via [`ciborium`]; the spec treats the wire format as
//! implementation-defined as long as the logical fields round-trip.

pub mod cbor;

use kad_id::Id;
use kad_table::Peer;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Current envelope version. Bumped on any incompatible change to the
/// `Request`/`Reply` schema.
pub const PROTOCOL_VERSION: u8 = 1;

/// Upper bound on a decoded envelope's encoded size, to avoid allocating
/// arbitrarily large buffers for malformed or hostile input.
pub const MAX_ENVELOPE_SIZE: usize = 65536;

/// Errors raised while encoding or decoding the wire protocol.
#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("failed to encode envelope: {0}")]
    Encode(String),
    #[error("failed to decode envelope: {0}")]
    Decode(String),
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),
    #[error("envelope exceeds maximum size ({0} > {MAX_ENVELOPE_SIZE})")]
    TooLarge(usize),
}

/// One of the three overlay RPCs, as sent by a caller.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Request {
    /// Ask the callee for its K closest known peers to `target`.
    FindNode { target: Id },
    /// Ask the callee to record `value` under `key` in its local store.
    StoreValue { key: String, value: String },
    /// Ask the callee for the value stored under `data_key`; `target` is
    /// supplied so the callee can fall back to `FindNode`-style routing
    /// on a miss.
    GetValue { data_key: String, target: Id },
}

/// A node triple as returned in a `FindNode`/miss reply: `(id, host,
/// port)`. Reuses [`Peer`] directly since the fields are identical.
pub type NodeTriple = Peer;

/// The reply to a [`Request`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Reply {
    /// Up to K peers closest to the queried target, from a `FindNode` or
    /// a `GetValue` miss.
    Nodes(Vec<NodeTriple>),
    /// The value found for a `GetValue` hit.
    Value(String),
    /// Acknowledgement of a `StoreValue`.
    Ok,
    /// The envelope could not be decoded or dispatched; a minimal error
    /// reply carrying a human-readable reason.
    Error(String),
}

/// Either direction of traffic, carried inside an [`Envelope`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Message {
    Request(Request),
    Reply(Reply),
}

/// The versioned envelope every message travels in.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    pub version: u8,
    pub msg_id: [u8; 16],
    pub from: Peer,
    pub body: Message,
}

impl Envelope {
    /// Wrap a `request` originating from `from` in a fresh envelope.
    pub fn new_request(from: Peer, request: Request) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            msg_id: random_msg_id(),
            from,
            body: Message::Request(request),
        }
    }

    /// Wrap a `reply` originating from `from`, correlated to the request
    /// it answers via `msg_id`.
    pub fn new_reply(from: Peer, msg_id: [u8; 16], reply: Reply) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            msg_id,
            from,
            body: Message::Reply(reply),
        }
    }

    /// Encode this envelope to CBOR bytes for transmission.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtoError> {
        cbor::to_vec(self)
    }

    /// Decode and validate an envelope received from the wire.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtoError> {
        if data.len() > MAX_ENVELOPE_SIZE {
            return Err(ProtoError::TooLarge(data.len()));
        }
        let envelope: Self = cbor::from_slice(data)?;
        envelope.validate()?;
        Ok(envelope)
    }

    fn validate(&self) -> Result<(), ProtoError> {
        if self.version != PROTOCOL_VERSION {
            return Err(ProtoError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

fn random_msg_id() -> [u8; 16] {
    let mut bytes = [0u8; 16];
    rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut bytes);
    bytes
}
