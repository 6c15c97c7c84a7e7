//! Registers services with a [`Discovery`] backend on start and withdraws
//! them on stop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use postwire_core::{Codec, Discovery, Node};
use tracing::{info, warn};

use super::registry::ServiceRegistry;

/// Discovery registrations for one server.
///
/// Every call is attempted once. Failures are logged and the loop moves on,
/// so one unreachable backend entry never blocks startup or shutdown.
/// `deregister_all` only acts after a `register_all`, and only once per
/// registration.
pub struct DiscoveryLifecycle {
    discovery: Option<Arc<dyn Discovery>>,
    /// `(id, name)` of every registered service, in registration order.
    services: Vec<(String, String)>,
    announced: AtomicBool,
}

impl DiscoveryLifecycle {
    #[must_use]
    pub fn new<C: Codec>(discovery: Option<Arc<dyn Discovery>>, registry: &ServiceRegistry<C>) -> Self {
        Self {
            discovery,
            services: registry
                .iter()
                .map(|s| (s.id().to_string(), s.name().to_string()))
                .collect(),
            announced: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.discovery.is_some()
    }

    /// Announces every service at `address`. Returns how many succeeded.
    pub async fn register_all(&self, address: &str) -> usize {
        let Some(discovery) = &self.discovery else {
            return 0;
        };
        self.announced.store(true, Ordering::Release);
        let mut registered = 0;
        for (id, name) in &self.services {
            let node = Node::new(id.as_str(), name.as_str(), address);
            match discovery.register(&node).await {
                Ok(()) => {
                    info!(service = %name, id = %id, address = %address, "Registered with discovery");
                    registered += 1;
                }
                Err(e) => warn!(service = %name, id = %id, error = %e, "Discovery register failed"),
            }
        }
        registered
    }

    /// Withdraws every service. Returns how many succeeded.
    pub async fn deregister_all(&self) -> usize {
        let Some(discovery) = &self.discovery else {
            return 0;
        };
        if !self.announced.swap(false, Ordering::AcqRel) {
            return 0;
        }
        let mut deregistered = 0;
        for (id, name) in &self.services {
            match discovery.deregister(name, id).await {
                Ok(()) => {
                    info!(service = %name, id = %id, "Deregistered from discovery");
                    deregistered += 1;
                }
                Err(e) => warn!(service = %name, id = %id, error = %e, "Discovery deregister failed"),
            }
        }
        deregistered
    }
}
