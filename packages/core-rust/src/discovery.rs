//! Service discovery contract.
//!
//! A discovery backend (etcd, consul, ...) tracks which service instances are
//! reachable at which address. The server registers every service on start
//! and deregisters on stop; presence is advisory and consumers must tolerate
//! stale entries.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One service instance as announced to a discovery backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Unique identity of the registered service instance.
    pub id: String,
    /// Service name clients route to.
    pub name: String,
    pub host: String,
    /// Port as written in the listen address. Empty when the address has none.
    pub port: String,
    /// Full listen address, `host:port`.
    pub address: String,
}

impl Node {
    /// Builds a node, deriving host and port from `address`.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, address: &str) -> Self {
        let (host, port) = split_host_port(address);
        Self {
            id: id.into(),
            name: name.into(),
            host: host.to_string(),
            port: port.to_string(),
            address: address.to_string(),
        }
    }
}

/// Splits a listen address on its last colon.
///
/// An address without a colon is all host and has an empty port. IPv6
/// brackets are kept on the host, e.g. `"[::1]:80"` -> `("[::1]", "80")`.
#[must_use]
pub fn split_host_port(address: &str) -> (&str, &str) {
    address.rsplit_once(':').unwrap_or((address, ""))
}

/// External registry of reachable service instances.
#[async_trait]
pub trait Discovery: Send + Sync {
    /// Announces a service instance.
    async fn register(&self, node: &Node) -> anyhow::Result<()>;

    /// Withdraws the instance `id` of service `name`.
    async fn deregister(&self, name: &str, id: &str) -> anyhow::Result<()>;
}
