//! Free list of reusable [`RequestContext`] values.
//!
//! `acquire()` hands out a [`PooledContext`] guard with exclusive ownership.
//! Dropping the guard resets the context and returns it to the pool, so every
//! exit path of a request (success, error, panic) releases it.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::Mutex;

use super::context::RequestContext;

/// Thread-safe pool of request contexts. Cloning shares the free list.
#[derive(Debug, Clone)]
pub struct ContextPool {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    free: Mutex<Vec<RequestContext>>,
    /// Contexts beyond this many idle ones are dropped on release.
    max_idle: usize,
}

impl ContextPool {
    #[must_use]
    pub fn new(max_idle: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                free: Mutex::new(Vec::new()),
                max_idle,
            }),
        }
    }

    /// Takes a reset context, allocating one if the free list is empty.
    #[must_use]
    pub fn acquire(&self) -> PooledContext {
        let ctx = self.shared.free.lock().pop().unwrap_or_default();
        PooledContext {
            ctx: Some(ctx),
            pool: Arc::clone(&self.shared),
        }
    }

    /// Number of contexts waiting for reuse.
    #[must_use]
    pub fn idle(&self) -> usize {
        self.shared.free.lock().len()
    }
}

/// A context checked out of a [`ContextPool`].
#[derive(Debug)]
pub struct PooledContext {
    /// Always `Some` until `drop` takes it back.
    ctx: Option<RequestContext>,
    pool: Arc<Shared>,
}

impl Deref for PooledContext {
    type Target = RequestContext;

    fn deref(&self) -> &RequestContext {
        match &self.ctx {
            Some(ctx) => ctx,
            None => unreachable!("pooled context is only taken on drop"),
        }
    }
}

impl DerefMut for PooledContext {
    fn deref_mut(&mut self) -> &mut RequestContext {
        match &mut self.ctx {
            Some(ctx) => ctx,
            None => unreachable!("pooled context is only taken on drop"),
        }
    }
}

impl Drop for PooledContext {
    fn drop(&mut self) {
        if let Some(mut ctx) = self.ctx.take() {
            ctx.reset();
            let mut free = self.pool.free.lock();
            if free.len() < self.pool.max_idle {
                free.push(ctx);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::service::context::ResolvedRoute;
    use crate::service::method::ContextInjection;

    fn route() -> ResolvedRoute {
        ResolvedRoute {
            service_id: Arc::from("id-1"),
            service_name: Arc::from("Arith"),
            method_name: Arc::from("Multiply"),
        }
    }

    #[test]
    fn release_returns_context_to_pool() {
        let pool = ContextPool::new(8);
        assert_eq!(pool.idle(), 0);

        let ctx = pool.acquire();
        assert_eq!(pool.idle(), 0);
        drop(ctx);
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn reused_slot_never_leaks_previous_request() {
        let pool = ContextPool::new(8);

        let first_map = {
            let mut ctx = pool.acquire();
            ctx.insert_metadata("authorization", "Bearer secret");
            ctx.set_response_metadata("x-out", "1");
            ctx.set_route(route());
            ctx.set_compression(true);
            ctx.mark_responded();
            std::ptr::from_ref(ctx.metadata())
        };
        assert_eq!(pool.idle(), 1);

        let ctx = pool.acquire();
        assert_eq!(
            std::ptr::from_ref(ctx.metadata()),
            first_map,
            "same slot is reused"
        );
        assert!(ctx.metadata().is_empty());
        assert!(ctx.route().is_none());
        assert!(!ctx.is_responded());
        assert!(!ctx.compression());

        let mut headers = http::HeaderMap::new();
        ctx.write_response_metadata(&mut headers);
        assert!(headers.is_empty());
    }

    #[test]
    fn second_cycle_is_also_clean() {
        let pool = ContextPool::new(1);
        for user in ["alice", "bob"] {
            let mut ctx = pool.acquire();
            assert_eq!(ctx.metadata_value("x-user"), None);
            ctx.insert_metadata("x-user", user);
        }
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn idle_contexts_are_capped() {
        let pool = ContextPool::new(2);
        let held: Vec<_> = (0..5).map(|_| pool.acquire()).collect();
        drop(held);
        assert_eq!(pool.idle(), 2);
    }

    #[test]
    fn leaked_call_context_does_not_share_with_next_request() {
        let pool = ContextPool::new(4);
        let leaked = {
            let mut ctx = pool.acquire();
            ctx.insert_metadata("x-user", "alice");
            ctx.call_context(route(), ContextInjection::Metadata)
        };

        let ctx = pool.acquire();
        assert!(ctx.metadata().is_empty());
        assert_eq!(leaked.metadata("x-user"), Some("alice"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_acquire_release_is_exclusive() {
        let pool = ContextPool::new(64);
        let mut tasks = Vec::new();

        for worker in 0..32 {
            let pool = pool.clone();
            tasks.push(tokio::spawn(async move {
                for round in 0..100 {
                    let mut ctx = pool.acquire();
                    assert!(ctx.metadata().is_empty(), "context handed out dirty");
                    let tag = format!("{worker}-{round}");
                    ctx.insert_metadata("x-tag", tag.clone());
                    tokio::task::yield_now().await;
                    assert_eq!(ctx.metadata_value("x-tag"), Some(tag.as_str()));
                }
            }));
        }

        for task in tasks {
            task.await.unwrap();
        }
        assert!(pool.idle() <= 64);
        assert!(pool.idle() > 0);
    }
}
