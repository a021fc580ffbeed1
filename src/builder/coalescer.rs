//! Request coalescing.
//!
//! Concurrent callers asking for the same key share one computation. The
//! computation runs on its own task, so the caller that started it can go
//! away without cancelling the work for everyone else.

use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{GatewayError, GatewayResult};
use crate::observability::metrics;

type InFlight<V> = Shared<BoxFuture<'static, GatewayResult<V>>>;
type InFlightMap<K, V> = Arc<Mutex<HashMap<K, InFlight<V>>>>;

/// In-flight registry keyed by `K`.
pub struct Coalescer<K, V> {
    in_flight: InFlightMap<K, V>,
}

impl<K, V> Coalescer<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Join the computation running for `key`, or start `computation` if
    /// there is none. Every caller gets the same result.
    pub async fn coalesce<F, Fut>(&self, key: K, computation: F) -> GatewayResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = GatewayResult<V>> + Send + 'static,
    {
        let shared = {
            let mut in_flight = lock(&self.in_flight);
            match in_flight.get(&key) {
                Some(existing) => {
                    tracing::debug!(key = ?key, "Joining in-flight computation");
                    metrics::record_coalesced("joined");
                    existing.clone()
                }
                None => {
                    metrics::record_coalesced("leader");
                    let shared = self.start(key.clone(), computation());
                    in_flight.insert(key, shared.clone());
                    shared
                }
            }
        };

        shared.await
    }

    /// Number of keys with a computation running.
    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }

    fn start<Fut>(&self, key: K, fut: Fut) -> InFlight<V>
    where
        Fut: Future<Output = GatewayResult<V>> + Send + 'static,
    {
        let guard = Deregister {
            in_flight: Arc::clone(&self.in_flight),
            key: key.clone(),
        };

        let handle = tokio::spawn(async move {
            let _guard = guard;
            fut.await
        });

        async move {
            match handle.await {
                Ok(result) => result,
                Err(err) => {
                    tracing::error!(key = ?key, error = %err, "Coalesced computation aborted");
                    Err(GatewayError::Internal("computation aborted".to_string()))
                }
            }
        }
        .boxed()
        .shared()
    }
}

impl<K, V> Default for Coalescer<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

fn lock<K, V>(map: &InFlightMap<K, V>) -> MutexGuard<'_, HashMap<K, InFlight<V>>> {
    map.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes the key when the computation finishes or unwinds.
struct Deregister<K: Eq + Hash, V> {
    in_flight: InFlightMap<K, V>,
    key: K,
}

impl<K: Eq + Hash, V> Drop for Deregister<K, V> {
    fn drop(&mut self) {
        lock(&self.in_flight).remove(&self.key);
    }
}
