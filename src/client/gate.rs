//! Concurrency admission control and the hard request budget

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};

/// Semaphore size standing in for "unlimited" when a cap is disabled.
const UNBOUNDED: usize = 1000;

/// Global + per-host in-flight caps. Both permits are held for the whole
/// attempt sequence of a request.
pub struct ConcurrencyGate {
    global: Arc<Semaphore>,
    per_host_limit: usize,
    per_host: Mutex<HashMap<String, Arc<Semaphore>>>,
}

/// Permits for one in-flight request; dropping releases both gates.
pub struct GatePermit {
    _global: OwnedSemaphorePermit,
    _host: OwnedSemaphorePermit,
}

impl ConcurrencyGate {
    pub fn new(concurrency: usize, per_host_concurrency: usize) -> Self {
        let global = if concurrency > 0 { concurrency } else { UNBOUNDED };
        let per_host = if per_host_concurrency > 0 {
            per_host_concurrency
        } else {
            UNBOUNDED
        };
        Self {
            global: Arc::new(Semaphore::new(global)),
            per_host_limit: per_host,
            per_host: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire the global gate, then the host gate. Host semaphores are
    /// created on first use.
    pub async fn admit(&self, host: &str) -> GatePermit {
        let global = self
            .global
            .clone()
            .acquire_owned()
            .await
            .expect("gate semaphore closed");

        let host_sem = {
            let mut map = self.per_host.lock().await;
            map.entry(host.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(self.per_host_limit)))
                .clone()
        };
        let host = host_sem
            .acquire_owned()
            .await
            .expect("gate semaphore closed");

        GatePermit {
            _global: global,
            _host: host,
        }
    }
}

/// Monotonic request budget. Once `limit` consumptions have happened,
/// every further attempt is refused without I/O. `limit = 0` disables
/// the budget.
pub struct RequestBudget {
    limit: u64,
    used: AtomicU64,
}

impl RequestBudget {
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            used: AtomicU64::new(0),
        }
    }

    /// Consume one unit; false once the budget is exhausted.
    pub fn try_consume(&self) -> bool {
        if self.limit == 0 {
            return true;
        }
        self.used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                if used < self.limit { Some(used + 1) } else { None }
            })
            .is_ok()
    }
}
