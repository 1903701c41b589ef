//! CBOR encoding of persisted records

use bytes::Bytes;
use serde::{Serialize, de::DeserializeOwned};

use crate::error::{NomadError, NomadResult};

/// Encode a value for storage
pub fn encode<T: Serialize>(value: &T) -> NomadResult<Bytes> {
    let mut buffer = Vec::new();
    ciborium::ser::into_writer(value, &mut buffer)
        .map_err(|e| NomadError::Codec(format!("failed to encode: {e}")))?;
    Ok(Bytes::from(buffer))
}

/// Decode a value read from storage
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> NomadResult<T> {
    ciborium::de::from_reader(bytes).map_err(|e| NomadError::Codec(format!("failed to decode: {e}")))
}
