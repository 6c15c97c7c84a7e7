//! Error types shared by the codec, compression and dispatch layers.

use std::fmt;

/// HTTP status used when an error carries no explicit code.
pub const DEFAULT_ERROR_STATUS: u16 = 500;

/// HTTP status used for request bodies that cannot be decoded.
pub const DECODE_ERROR_STATUS: u16 = 400;

/// Errors produced by a [`Codec`](crate::codec::Codec).
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("msgpack encode: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),
    #[error("msgpack decode: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the reply compression step.
#[derive(Debug, thiserror::Error)]
#[error("snappy: {0}")]
pub struct CompressionError(#[from] pub snap::Error);

/// Errors raised while dispatching a single request.
///
/// Methods return `RpcError` from their handlers. Use [`RpcError::status`] to
/// choose the HTTP status; anything else is reported as 500 except decode
/// failures, which are the client's fault and map to 400.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// An error with an explicit HTTP status. The message becomes the body.
    #[error("{message}")]
    Status { code: u16, message: String },
    #[error("rpc: unable to decode request: {0}")]
    Decode(#[source] CodecError),
    #[error("rpc: unable to encode response: {0}")]
    Encode(#[source] CodecError),
    #[error("rpc: unable to compress response: {0}")]
    Compression(#[from] CompressionError),
    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl RpcError {
    /// Builds an error that is rendered with the given HTTP status code.
    pub fn status(code: u16, message: impl fmt::Display) -> Self {
        Self::Status {
            code,
            message: message.to_string(),
        }
    }

    /// HTTP status code this error is rendered with.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Status { code, .. } => *code,
            Self::Decode(_) => DECODE_ERROR_STATUS,
            Self::Encode(_) | Self::Compression(_) | Self::Internal(_) => DEFAULT_ERROR_STATUS,
        }
    }
}
