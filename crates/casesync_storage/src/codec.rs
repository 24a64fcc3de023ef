//! CBOR encoding of document bodies.

use crate::error::{StorageError, StorageResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes a value to CBOR bytes.
pub fn encode<T: Serialize>(value: &T) -> StorageResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(value, &mut bytes)
        .map_err(|e| StorageError::Codec(format!("encoding failed: {e}")))?;
    Ok(bytes)
}

/// Decodes a value from CBOR bytes.
///
/// Unknown fields are ignored, so a narrower type can be used as a
/// projection of a wider document.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StorageResult<T> {
    ciborium::de::from_reader(bytes)
        .map_err(|e| StorageError::Codec(format!("decoding failed: {e}")))
}
