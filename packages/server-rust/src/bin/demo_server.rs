//! Demo RPC server exposing an `Arith` service.
//!
//! ```text
//! postwire-demo --port 8080
//! curl -X POST localhost:8080/Arith/Multiply -d '{"a":6,"b":7}'
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use postwire_core::{Codec, JsonCodec, MsgPackCodec, RpcError};
use postwire_server::network::TlsConfig;
use postwire_server::{
    CallContext, ConcurrencyLimit, NetworkConfig, ServerBuilder, ServiceBuilder,
    TracingMiddleware,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CodecKind {
    Json,
    Msgpack,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Parser)]
#[command(author, version, about = "Postwire demo RPC server")]
struct Args {
    /// Host address to bind to
    #[arg(long, env = "POSTWIRE_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on (0 picks a free port)
    #[arg(long, env = "POSTWIRE_PORT", default_value_t = 8080)]
    port: u16,

    /// Payload codec
    #[arg(long, env = "POSTWIRE_CODEC", value_enum, default_value_t = CodecKind::Json)]
    codec: CodecKind,

    /// Snappy-compress replies
    #[arg(long, env = "POSTWIRE_COMPRESSION")]
    compression: bool,

    /// Maximum concurrent calls before shedding load
    #[arg(long, env = "POSTWIRE_MAX_CONCURRENT", default_value_t = 1024)]
    max_concurrent: usize,

    /// Seconds to wait for in-flight calls on shutdown
    #[arg(long, env = "POSTWIRE_DRAIN_TIMEOUT", default_value_t = 30)]
    drain_timeout: u64,

    /// Path to a PEM certificate; enables TLS together with --tls-key
    #[arg(long, env = "POSTWIRE_TLS_CERT", requires = "tls_key")]
    tls_cert: Option<PathBuf>,

    /// Path to a PEM private key
    #[arg(long, env = "POSTWIRE_TLS_KEY", requires = "tls_cert")]
    tls_key: Option<PathBuf>,

    #[arg(long, env = "POSTWIRE_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

// ---------------------------------------------------------------------------
// Arith service
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Operands {
    a: i64,
    b: i64,
}

#[derive(Debug, Serialize)]
struct Quotient {
    quo: i64,
    rem: i64,
}

struct Arith;

impl Arith {
    async fn multiply(self: Arc<Self>, ctx: CallContext, args: Operands) -> Result<i64, RpcError> {
        if let Some(id) = ctx.metadata("x-request-id") {
            ctx.set_response_metadata("x-handled-request", id);
        }
        args.a
            .checked_mul(args.b)
            .ok_or_else(|| RpcError::status(400, "overflow"))
    }

    async fn divide(self: Arc<Self>, args: Operands) -> Result<Quotient, RpcError> {
        if args.b == 0 {
            return Err(RpcError::status(400, "divide by zero"));
        }
        Ok(Quotient {
            quo: args.a / args.b,
            rem: args.a % args.b,
        })
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,postwire_server=debug"));
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }
}

async fn run<C: Codec>(codec: C, args: Args) -> anyhow::Result<()> {
    let network = NetworkConfig {
        host: args.host,
        port: args.port,
        tls: args
            .tls_cert
            .zip(args.tls_key)
            .map(|(cert_path, key_path)| TlsConfig {
                cert_path,
                key_path,
            }),
        drain_timeout: Duration::from_secs(args.drain_timeout),
        ..NetworkConfig::default()
    };

    let arith = ServiceBuilder::new(Arc::new(Arith))
        .method("Multiply", Arith::multiply)
        .bare_method("Divide", Arith::divide);

    let server = ServerBuilder::with_codec(codec)
        .network(network)
        .compression(args.compression)
        .middleware(Arc::new(TracingMiddleware))
        .middleware(Arc::new(ConcurrencyLimit::new(args.max_concurrent)))
        .service(arith)?
        .build();

    server
        .run(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Ctrl-C received, shutting down");
        })
        .await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);
    info!(codec = ?args.codec, "postwire-demo starting up");

    match args.codec {
        CodecKind::Json => run(JsonCodec, args).await,
        CodecKind::Msgpack => run(MsgPackCodec::new(), args).await,
    }
}
