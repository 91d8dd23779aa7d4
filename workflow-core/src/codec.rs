use anyhow::Result;
use bytes::Bytes;

/// Sealed helper traits for codec implementations.
///
/// Bookmark payloads and workflow state are opaque bytes to the engine. A codec
/// decides how a typed value maps onto those bytes; the helper traits let each
/// codec pick its own bounds (serde for JSON, something else for a binary format).
pub mod sealed {
    use super::*;

    pub trait EncodeValue<T>: Send + Sync + 'static {
        fn encode_value(&self, value: &T) -> Result<Bytes>;
    }

    pub trait DecodeValue<T>: Send + Sync + 'static {
        fn decode_value(&self, bytes: &[u8]) -> Result<T>;
    }
}

/// Serializes a typed value into an opaque payload.
pub trait Encoder: Send + Sync + 'static {
    fn encode<T>(&self, value: &T) -> Result<Bytes>
    where
        Self: sealed::EncodeValue<T>,
    {
        sealed::EncodeValue::encode_value(self, value)
    }
}

/// Deserializes an opaque payload into a typed value.
pub trait Decoder: Send + Sync + 'static {
    fn decode<T>(&self, bytes: &[u8]) -> Result<T>
    where
        Self: sealed::DecodeValue<T>,
    {
        sealed::DecodeValue::decode_value(self, bytes)
    }
}

/// A codec that can serialize and deserialize payloads.
pub trait Codec: Encoder + Decoder {}

impl<U> Codec for U where U: Encoder + Decoder {}
