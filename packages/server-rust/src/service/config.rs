/// Dispatch-level configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Snappy-compress every reply.
    pub compression: bool,
    /// Idle request contexts kept for reuse.
    pub context_pool_capacity: usize,
    /// Audit events that can wait for the error logger before new ones are
    /// dropped.
    pub audit_queue_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            compression: false,
            context_pool_capacity: 1024,
            audit_queue_capacity: 256,
        }
    }
}
