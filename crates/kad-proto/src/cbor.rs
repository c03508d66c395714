//! Thin CBOR (RFC 8949) helpers used to encode and decode [`crate::Envelope`]
//! and its contents.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtoError;

/// Serialize a value to CBOR bytes.
pub fn to_vec<T: Serialize>(value: &T) -> Result<Vec<u8>, ProtoError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)
        .map_err(|e| ProtoError::Encode(format!("CBOR encode failed: {e}")))?;
    Ok(buf)
}

/// Deserialize a value from CBOR bytes.
pub fn from_slice<T: DeserializeOwned>(data: &[u8]) -> Result<T, ProtoError> {
    ciborium::from_reader(data).map_err(|e| ProtoError::Decode(format!("CBOR decode failed: {e}")))
}
