//! Coalescing of concurrent identical fetches

use crate::error::ProviderError;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

type SharedFetch<V> = Shared<BoxFuture<'static, Result<V, ProviderError>>>;

struct Slot<V> {
    id: u64,
    fetch: SharedFetch<V>,
}

/// Map from key to the fetch currently in flight for it
///
/// Callers arriving while a fetch for the same key is running await that
/// fetch instead of starting their own. Fetches run on their own task, so
/// they finish even when every caller has gone away, and each one clears
/// its own slot when done.
pub struct SingleFlight<K, V> {
    inflight: Arc<Mutex<HashMap<K, Slot<V>>>>,
    next_id: AtomicU64,
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            inflight: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Runs the future produced by `start`, or joins the one already running
    /// for `key`
    ///
    /// Dropping the returned future only stops waiting; the fetch itself
    /// runs to completion.
    pub async fn run<F>(&self, key: K, start: F) -> Result<V, ProviderError>
    where
        F: FnOnce() -> BoxFuture<'static, Result<V, ProviderError>>,
    {
        let fetch = {
            let mut inflight = self.inflight.lock().await;
            match inflight.get(&key) {
                Some(slot) => {
                    tracing::debug!(key = ?key, "Joining in-flight fetch");
                    slot.fetch.clone()
                }
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let slots = Arc::clone(&self.inflight);
                    let slot_key = key.clone();
                    let work = start();

                    // Removal waits on the lock held here, so the slot is
                    // always inserted before it can be cleared.
                    let handle = tokio::spawn(async move {
                        let result = work.await;
                        let mut map = slots.lock().await;
                        if map.get(&slot_key).is_some_and(|slot| slot.id == id) {
                            map.remove(&slot_key);
                        }
                        result
                    });

                    let fetch = join_fetch(handle).boxed().shared();
                    inflight.insert(
                        key,
                        Slot {
                            id,
                            fetch: fetch.clone(),
                        },
                    );
                    fetch
                }
            }
        };

        fetch.await
    }

    /// Number of keys with a fetch in flight
    pub async fn in_flight(&self) -> usize {
        self.inflight.lock().await.len()
    }
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Runs `fetch` on its own task and waits for it
///
/// Used when coalescing is off; the fetch still completes if the caller is
/// dropped.
pub async fn run_detached<V>(
    fetch: BoxFuture<'static, Result<V, ProviderError>>,
) -> Result<V, ProviderError>
where
    V: Send + 'static,
{
    join_fetch(tokio::spawn(fetch)).await
}

async fn join_fetch<V>(handle: JoinHandle<Result<V, ProviderError>>) -> Result<V, ProviderError> {
    handle
        .await
        .unwrap_or_else(|e| Err(ProviderError::Unknown(format!("fetch task failed: {}", e))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn slow_fetch(calls: Arc<AtomicUsize>, value: u32) -> BoxFuture<'static, Result<u32, ProviderError>> {
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(value)
        }
        .boxed()
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_fetch() {
        let flight = SingleFlight::<String, u32>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, b) = tokio::join!(
            flight.run("btc".to_string(), || slow_fetch(calls.clone(), 1)),
            flight.run("btc".to_string(), || slow_fetch(calls.clone(), 2)),
        );

        assert_eq!(a, Ok(1));
        assert_eq!(b, Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(flight.in_flight().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_keys_fetch_independently() {
        let flight = SingleFlight::<String, u32>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, b) = tokio::join!(
            flight.run("btc".to_string(), || slow_fetch(calls.clone(), 1)),
            flight.run("eth".to_string(), || slow_fetch(calls.clone(), 2)),
        );

        assert_eq!((a, b), (Ok(1), Ok(2)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_callers_fetch_again() {
        let flight = SingleFlight::<String, u32>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        flight.run("btc".to_string(), || slow_fetch(calls.clone(), 1)).await.unwrap();
        flight.run("btc".to_string(), || slow_fetch(calls.clone(), 2)).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_finishes_after_caller_is_dropped() {
        let flight = SingleFlight::<String, u32>::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicUsize::new(0));

        let finished = done.clone();
        let counted = calls.clone();
        let waited = tokio::time::timeout(
            Duration::from_millis(50),
            flight.run("btc".to_string(), move || {
                async move {
                    let value = slow_fetch(counted, 7).await;
                    finished.fetch_add(1, Ordering::SeqCst);
                    value
                }
                .boxed()
            }),
        )
        .await;
        assert!(waited.is_err());
        assert_eq!(flight.in_flight().await, 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert_eq!(flight.in_flight().await, 0);

        // the next caller starts a new fetch rather than reusing the old one
        let next = flight.run("btc".to_string(), || slow_fetch(calls.clone(), 8)).await;
        assert_eq!(next, Ok(8));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detached_fetch_survives_dropped_caller() {
        let calls = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicUsize::new(0));

        let finished = done.clone();
        let work = slow_fetch(calls.clone(), 3);
        let waited = tokio::time::timeout(
            Duration::from_millis(50),
            run_detached(
                async move {
                    let value = work.await;
                    finished.fetch_add(1, Ordering::SeqCst);
                    value
                }
                .boxed(),
            ),
        )
        .await;
        assert!(waited.is_err());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_errors_are_shared() {
        let flight = SingleFlight::<&'static str, u32>::new();
        let result = flight
            .run("btc", || async { Err(ProviderError::RateLimited) }.boxed())
            .await;
        assert_eq!(result, Err(ProviderError::RateLimited));
    }
}
