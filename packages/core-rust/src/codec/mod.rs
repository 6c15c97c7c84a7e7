//! Payload codecs.
//!
//! A [`Codec`] turns typed request and reply records into bytes and back. The
//! server is generic over its codec, so the choice is made once when the
//! server is built and dispatch never pays for dynamic lookup.
//!
//! - [`JsonCodec`]: `serde_json`, human readable.
//! - [`MsgPackCodec`]: `rmp-serde` with named fields, binary. Reuses pooled
//!   byte buffers on its decode path.

mod buffer;
mod json;
mod msgpack;

pub use buffer::{BufferPool, PooledBuffer};
pub use json::JsonCodec;
pub use msgpack::MsgPackCodec;

use std::io::{Read, Write};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CodecError;

/// Pluggable encode/decode/marshal/unmarshal strategy for payloads.
///
/// `encode`/`decode` work on streams; `marshal`/`unmarshal` work on whole
/// byte buffers. Compression, when enabled, is applied to the output of
/// `marshal` only.
pub trait Codec: Clone + Send + Sync + 'static {
    /// Value for the `Content-Type` header of encoded replies.
    fn content_type(&self) -> &'static str;

    /// Writes `value` to `writer`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    fn encode<W, T>(&self, writer: W, value: &T) -> Result<(), CodecError>
    where
        W: Write,
        T: Serialize + ?Sized;

    /// Reads a `T` from `reader`.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the bytes are not a valid `T`.
    fn decode<R, T>(&self, reader: R) -> Result<T, CodecError>
    where
        R: Read,
        T: DeserializeOwned;

    /// Serializes `value` into a new buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    fn marshal<T>(&self, value: &T) -> Result<Vec<u8>, CodecError>
    where
        T: Serialize + ?Sized;

    /// Deserializes a `T` from `data`.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` is not a valid `T`.
    fn unmarshal<T>(&self, data: &[u8]) -> Result<T, CodecError>
    where
        T: DeserializeOwned;
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use proptest::prelude::*;
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Args {
        a: i64,
        b: i64,
        label: String,
        tags: Vec<String>,
        attrs: BTreeMap<String, u32>,
        note: Option<String>,
    }

    fn args_strategy() -> impl Strategy<Value = Args> {
        (
            any::<i64>(),
            any::<i64>(),
            ".*",
            prop::collection::vec("[a-z]{0,8}", 0..4),
            prop::collection::btree_map("[a-z]{1,6}", any::<u32>(), 0..4),
            prop::option::of(".{0,16}"),
        )
            .prop_map(|(a, b, label, tags, attrs, note)| Args {
                a,
                b,
                label,
                tags,
                attrs,
                note,
            })
    }

    fn roundtrip<C: Codec>(codec: &C, args: &Args) {
        let bytes = codec.marshal(args).unwrap();
        let back: Args = codec.unmarshal(&bytes).unwrap();
        assert_eq!(&back, args);

        let mut stream = Vec::new();
        codec.encode(&mut stream, args).unwrap();
        let back: Args = codec.decode(stream.as_slice()).unwrap();
        assert_eq!(&back, args);
    }

    proptest! {
        #[test]
        fn json_roundtrip(args in args_strategy()) {
            roundtrip(&JsonCodec, &args);
        }

        #[test]
        fn msgpack_roundtrip(args in args_strategy()) {
            roundtrip(&MsgPackCodec::new(), &args);
        }
    }

    #[test]
    fn codecs_disagree_on_wire_format() {
        let args = Args {
            a: 7,
            b: 8,
            label: "mul".into(),
            tags: vec![],
            attrs: BTreeMap::new(),
            note: None,
        };
        let json = JsonCodec.marshal(&args).unwrap();
        let msgpack = MsgPackCodec::new().marshal(&args).unwrap();
        assert_ne!(json, msgpack);
        assert!(MsgPackCodec::new().unmarshal::<Args>(&json).is_err());
    }
}
