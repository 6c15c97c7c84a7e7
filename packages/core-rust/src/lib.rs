//! Postwire Core: routing, codecs, compression, discovery and audit contracts.

pub mod audit;
pub mod codec;
pub mod compression;
pub mod discovery;
pub mod error;
pub mod metadata;
pub mod route;

pub use audit::{ErrorEvent, ErrorLogger, TracingErrorLogger};
pub use codec::{BufferPool, Codec, JsonCodec, MsgPackCodec};
pub use discovery::{Discovery, Node};
pub use error::{CodecError, CompressionError, RpcError};
pub use metadata::Metadata;
pub use route::{parse_route, Route, RouteError};
