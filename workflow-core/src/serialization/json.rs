use crate::codec::{Decoder, Encoder, sealed};
use anyhow::{Context, Result};
use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// JSON payload codec backed by `serde_json`.
///
/// Struct fields serialize in declaration order, so equal values always produce
/// equal bytes. Bookmark hashes are computed over these bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Encoder for JsonCodec {}
impl Decoder for JsonCodec {}

impl<T> sealed::EncodeValue<T> for JsonCodec
where
    T: Serialize,
{
    fn encode_value(&self, value: &T) -> Result<Bytes> {
        let bytes = serde_json::to_vec(value).context("Failed to encode payload as JSON")?;
        Ok(Bytes::from(bytes))
    }
}

impl<T> sealed::DecodeValue<T> for JsonCodec
where
    T: DeserializeOwned,
{
    fn decode_value(&self, bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).context("Failed to decode JSON payload")
    }
}
