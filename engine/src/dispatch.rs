//! Fire-and-forget match dispatch, bounded by a semaphore so a trigger scan
//! that fans out hundreds of attempts cannot exhaust the connection pool.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

use crate::error::EngineError;
use crate::matching::MatchingEngine;

/// Maximum match operations in flight at any instant.
pub const MAX_CONCURRENT_MATCHES: usize = 10;

pub struct MatchDispatcher {
    engine: Arc<MatchingEngine>,
    semaphore: Arc<Semaphore>,
    runtime: Handle,
}

impl MatchDispatcher {
    pub fn new(engine: Arc<MatchingEngine>, runtime: Handle) -> Self {
        Self {
            engine,
            semaphore: Arc::new(Semaphore::new(MAX_CONCURRENT_MATCHES)),
            runtime,
        }
    }

    /// Queue a match attempt for the order. Never blocks the caller; the
    /// blocking database work runs on the blocking pool once a permit is
    /// held.
    pub fn dispatch(&self, order_id: i64) {
        let engine = Arc::clone(&self.engine);
        let semaphore = Arc::clone(&self.semaphore);

        self.runtime.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    // Semaphore closed during shutdown; the order stays new
                    // and the next tick retries.
                    warn!(order_id, "match dispatch abandoned");
                    return;
                }
            };

            match tokio::task::spawn_blocking(move || engine.match_order(order_id)).await {
                Ok(Ok(outcome)) => {
                    debug!(order_id, ?outcome, "match attempt finished");
                }
                // A concurrent dispatch won the race; nothing to do.
                Ok(Err(EngineError::IllegalTransition(status))) => {
                    debug!(order_id, %status, "order no longer matchable");
                }
                Ok(Err(err)) => {
                    warn!(order_id, %err, "match attempt failed");
                }
                Err(err) => {
                    error!(order_id, %err, "match task panicked");
                }
            }
        });
    }
}
