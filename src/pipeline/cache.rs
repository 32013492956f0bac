//! Month cache: single-flight memoization with TTL.
//!
//! An explicit cache service owned by the engine (never global state), with
//! an injected clock so expiry is testable. Concurrent callers for the same
//! key share one computation; distinct keys proceed in parallel.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Time source for TTL decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

struct Slot<V> {
    cell: Arc<OnceCell<V>>,
    expires: DateTime<Utc>,
}

/// Single-flight TTL cache keyed by string.
///
/// `get_or_compute` never returns a partially-written entry: a value is
/// either absent, being computed exactly once while other callers wait, or
/// complete.
pub struct MonthCache<V> {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    slots: Mutex<HashMap<String, Slot<V>>>,
}

impl<V: Clone + Send + Sync + 'static> MonthCache<V> {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        MonthCache {
            ttl,
            clock,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Look up `key`, computing the value with `compute` on miss or expiry.
    ///
    /// Under concurrent callers with the same key the computation runs
    /// exactly once; every caller receives the same value.
    pub async fn get_or_compute<F, Fut>(&self, key: &str, compute: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        let cell = {
            let now = self.clock.now();
            let mut slots = self.slots.lock();
            let fresh = match slots.get(key) {
                Some(slot) if slot.expires > now => false,
                _ => true,
            };
            if fresh {
                slots.insert(
                    key.to_string(),
                    Slot {
                        cell: Arc::new(OnceCell::new()),
                        expires: now + self.ttl,
                    },
                );
            }
            Arc::clone(&slots.get(key).expect("slot just ensured").cell)
        };

        cell.get_or_init(compute).await.clone()
    }

    /// Drop an entry, forcing recomputation on the next lookup. A stale or
    /// malformed entry is handled the same way: invalidate and recompute,
    /// never surfaced to the caller.
    pub fn invalidate(&self, key: &str) {
        self.slots.lock().remove(key);
    }

    /// Number of live (possibly expired) slots; used by debug output.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}
