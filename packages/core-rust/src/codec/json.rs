use std::io::{Read, Write};

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::Codec;
use crate::error::CodecError;

/// JSON codec backed by `serde_json`. The default codec of the server.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn encode<W, T>(&self, writer: W, value: &T) -> Result<(), CodecError>
    where
        W: Write,
        T: Serialize + ?Sized,
    {
        serde_json::to_writer(writer, value)?;
        Ok(())
    }

    fn decode<R, T>(&self, reader: R) -> Result<T, CodecError>
    where
        R: Read,
        T: DeserializeOwned,
    {
        Ok(serde_json::from_reader(reader)?)
    }

    fn marshal<T>(&self, value: &T) -> Result<Vec<u8>, CodecError>
    where
        T: Serialize + ?Sized,
    {
        Ok(serde_json::to_vec(value)?)
    }

    fn unmarshal<T>(&self, data: &[u8]) -> Result<T, CodecError>
    where
        T: DeserializeOwned,
    {
        Ok(serde_json::from_slice(data)?)
    }
}
