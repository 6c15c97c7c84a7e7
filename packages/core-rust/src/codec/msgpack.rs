use std::io::{Read, Write};

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{BufferPool, Codec};
use crate::error::CodecError;

/// Initial capacity of buffers handed out by the decode pool.
const DECODE_BUFFER_CAPACITY: usize = 512;

/// `MessagePack` codec backed by `rmp-serde`.
///
/// Structs are written as maps with field names (`to_vec_named`), so peers
/// can evolve their schemas by adding optional fields. The decode path reads
/// the request into a pooled buffer; clones share the same pool.
#[derive(Debug, Clone)]
pub struct MsgPackCodec {
    buffers: BufferPool,
}

impl MsgPackCodec {
    #[must_use]
    pub fn new() -> Self {
        Self::with_buffer_pool(BufferPool::new(DECODE_BUFFER_CAPACITY))
    }

    /// Uses an explicit buffer pool, e.g. one shared with other components.
    #[must_use]
    pub fn with_buffer_pool(buffers: BufferPool) -> Self {
        Self { buffers }
    }

    /// The pool used on the decode path.
    #[must_use]
    pub fn buffer_pool(&self) -> &BufferPool {
        &self.buffers
    }
}

impl Default for MsgPackCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec for MsgPackCodec {
    fn content_type(&self) -> &'static str {
        "application/msgpack"
    }

    fn encode<W, T>(&self, mut writer: W, value: &T) -> Result<(), CodecError>
    where
        W: Write,
        T: Serialize + ?Sized,
    {
        rmp_serde::encode::write_named(&mut writer, value)?;
        Ok(())
    }

    fn decode<R, T>(&self, mut reader: R) -> Result<T, CodecError>
    where
        R: Read,
        T: DeserializeOwned,
    {
        let mut buf = self.buffers.get();
        reader.read_to_end(&mut buf)?;
        Ok(rmp_serde::from_slice(&buf)?)
    }

    fn marshal<T>(&self, value: &T) -> Result<Vec<u8>, CodecError>
    where
        T: Serialize + ?Sized,
    {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    fn unmarshal<T>(&self, data: &[u8]) -> Result<T, CodecError>
    where
        T: DeserializeOwned,
    {
        Ok(rmp_serde::from_slice(data)?)
    }
}
