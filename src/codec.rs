//! Item serialization.
//!
//! A [`Codec`] turns an application value into the payload stored in a row and
//! back. Stores are generic over the codec; [`JsonCodec`] is the default.

use crate::error::{StoreError, StoreResult};
use serde::{de::DeserializeOwned, Serialize};

/// Encodes items into stored payloads and decodes them back.
pub trait Codec<T>: Send + Sync + 'static {
    /// Serialize an item to payload bytes.
    fn encode(&self, item: &T) -> StoreResult<Vec<u8>>;

    /// Parse payload bytes back into an item.
    fn decode(&self, bytes: &[u8]) -> StoreResult<T>;

    /// Serialize an item to a UTF-8 document, for text payload columns.
    fn encode_text(&self, item: &T) -> StoreResult<String> {
        let bytes = self.encode(item)?;
        String::from_utf8(bytes)
            .map_err(|e| StoreError::Encode(format!("payload is not valid UTF-8: {}", e)))
    }
}

/// JSON codec backed by `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl<T> Codec<T> for JsonCodec
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, item: &T) -> StoreResult<Vec<u8>> {
        serde_json::to_vec(item).map_err(|e| StoreError::Encode(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> StoreResult<T> {
        serde_json::from_slice(bytes).map_err(|e| StoreError::Decode(e.to_string()))
    }
}
