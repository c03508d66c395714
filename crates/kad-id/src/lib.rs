//! # kad-id
//!
//! The identifier and XOR-metric model underlying the Kademlia routing
//! table and lookup engine: a fixed-width node/key identifier, the XOR
//! distance between two identifiers, and the total order used to rank
//! peers by closeness to a target.
//!
//! ## Key Parameters
//!
//! | Parameter | Value |
//! |---|---|
//! | `B` (identifier width, bytes) | 32 |
//! | Bucket count (`B * 8`) | 256 |

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The only fallible operation this crate exposes: parsing an identifier
/// back out of its hex representation (CLI flags, config files).
#[derive(Debug, Error)]
pub enum IdParseError {
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("expected {B} bytes, got {0}")]
    WrongLength(usize),
}

/// Identifier width in bytes. Build-time constant; must be `>= 20` and
/// divisible by 8.
pub const B: usize = 32;

/// Number of routing-table buckets, one per bit of the identifier space.
pub const NUM_BUCKETS: usize = B * 8;

/// A fixed-width identifier for a peer or a stored key.
///
/// Equality and hashing are byte-wise. Ids are immutable once constructed.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Id(#[serde(with = "id_bytes")] [u8; B]);

impl Id {
    /// Construct an `Id` from raw bytes.
    pub const fn from_bytes(bytes: [u8; B]) -> Self {
        Self(bytes)
    }

    /// Return the raw bytes of this identifier.
    pub fn as_bytes(&self) -> &[u8; B] {
        &self.0
    }

    /// The all-zero identifier. Never assigned to a real peer; useful as a
    /// sentinel in tests.
    pub const ZERO: Id = Id([0u8; B]);

    /// Component-wise XOR of two identifiers.
    pub fn xor(&self, other: &Id) -> Id {
        let mut out = [0u8; B];
        for i in 0..B {
            out[i] = self.0[i] ^ other.0[i];
        }
        Id(out)
    }

    /// Number of leading zero bits, counted from the msb of byte 0.
    ///
    /// Returns `B * 8 - 1` (the saturated maximum) when `self` is the
    /// all-zero identifier, per the spec's resolution of the source's
    /// inconsistent zero-id handling: self-distance and zero-id distance
    /// are treated identically rather than as two different special cases.
    pub fn leading_zero_bits(&self) -> u32 {
        for (byte_idx, byte) in self.0.iter().enumerate() {
            if *byte != 0 {
                return (byte_idx as u32) * 8 + byte.leading_zeros();
            }
        }
        (NUM_BUCKETS - 1) as u32
    }

    /// Derive an identifier from an arbitrary byte string (e.g. a
    /// value-store key), for routing a `STORE_VALUE`/`GET_VALUE` to the
    /// peers nearest the resulting id.
    ///
    /// Not a secure/self-certifying derivation (secure-ID generation is
    /// explicitly out of scope) -- just a deterministic way to place a
    /// key in the identifier space.
    pub fn hash_key(data: &[u8]) -> Id {
        Id(*blake3::hash(data).as_bytes())
    }

    /// A pseudo-random identifier. Not cryptographically secure; suitable
    /// for assigning a peer its own id at startup or for tests.
    pub fn random() -> Id {
        let mut bytes = [0u8; B];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut bytes);
        Id(bytes)
    }

    /// Render the identifier as a lowercase hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse an identifier from its hex representation.
    pub fn from_hex(s: &str) -> Result<Id, IdParseError> {
        let decoded = hex::decode(s)?;
        let bytes: [u8; B] = decoded
            .try_into()
            .map_err(|v: Vec<u8>| IdParseError::WrongLength(v.len()))?;
        Ok(Id(bytes))
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({}…)", &self.to_hex()[..8])
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// The distance between two identifiers, as a total order suitable for
/// sorting shortlists: primarily by leading-zero-bit count (more shared
/// prefix bits == closer), with ties broken by lexicographic order of the
/// raw XOR bytes.
///
/// `leading_zero_bits` alone is not a total order (two different XOR
/// values can share a leading-zero count); the lex tie-break makes
/// "closest K" deterministic, which the source's bucket-index-only
/// ordering did not guarantee.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Distance {
    leading_zero_bits: u32,
    xor_bytes: [u8; B],
}

impl Distance {
    /// The distance between `a` and `b`.
    pub fn between(a: &Id, b: &Id) -> Distance {
        let xor = a.xor(b);
        Distance {
            leading_zero_bits: xor.leading_zero_bits(),
            xor_bytes: xor.0,
        }
    }

    /// The bucket index a peer at this distance from `self_id` belongs in:
    /// the leading-zero-bit count of the XOR.
    pub fn bucket_index(&self) -> usize {
        self.leading_zero_bits as usize
    }
}

impl PartialOrd for Distance {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Distance {
    /// Closest first: larger `leading_zero_bits` sorts before smaller, and
    /// within equal `leading_zero_bits` the raw XOR bytes break the tie in
    /// ascending order.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .leading_zero_bits
            .cmp(&self.leading_zero_bits)
            .then_with(|| self.xor_bytes.cmp(&other.xor_bytes))
    }
}

/// Serde support for `Id` as a byte array (avoids leaking a raw `[u8; 32]`
/// in the public API while keeping the wire representation compact).
mod id_bytes {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &[u8; super::B], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        bytes.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; super::B], D::Error>
    where
        D: Deserializer<'de>,
    {
        <[u8; super::B]>::deserialize(deserializer)
    }
}
