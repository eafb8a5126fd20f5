//! Worker pool hosting one task per monitor.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::PoolError;

/// Runs monitor workers on a tokio runtime.
///
/// Constructed explicitly and handed to each monitor, so its lifetime is tied
/// to whoever owns it rather than to the process. After [`close`](Self::close)
/// no new workers are accepted; [`shutdown`](Self::shutdown) drains the rest.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use streamwatch_monitor::MonitorPool;
///
/// # tokio_test::block_on(async {
/// let pool = MonitorPool::current();
/// pool.spawn(async { /* a monitor worker */ }).unwrap();
/// pool.shutdown(Duration::from_secs(1)).await;
/// assert!(pool.spawn(async {}).is_err());
/// # });
/// ```
#[derive(Debug)]
pub struct MonitorPool {
    handle: Handle,
    tasks: Mutex<JoinSet<()>>,
    closed: AtomicBool,
}

impl MonitorPool {
    /// Create a pool that spawns onto the given runtime.
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            tasks: Mutex::new(JoinSet::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Create a pool on the runtime of the calling task.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    /// Run `worker` on the pool.
    pub fn spawn<F>(&self, worker: F) -> Result<(), PoolError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        // Checked under the lock so a concurrent shutdown cannot take the set
        // between the check and the spawn.
        let mut tasks = self.tasks.lock();
        if self.is_closed() {
            return Err(PoolError::Closed);
        }
        // Reap finished workers so the set does not grow with churn.
        while tasks.try_join_next().is_some() {}
        tasks.spawn_on(worker, &self.handle);
        Ok(())
    }

    /// Number of workers that have not been reaped yet.
    pub fn active(&self) -> usize {
        let mut tasks = self.tasks.lock();
        while tasks.try_join_next().is_some() {}
        tasks.len()
    }

    /// Stop accepting workers.
    pub fn close(&self) {
        let _tasks = self.tasks.lock();
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Close the pool and wait up to `grace` for workers to finish, then
    /// abort whatever is left.
    ///
    /// Monitors should be asked to stop before calling this; aborting a
    /// worker still runs its cleanup.
    pub async fn shutdown(&self, grace: Duration) {
        let mut tasks = {
            let mut tasks = self.tasks.lock();
            self.closed.store(true, Ordering::SeqCst);
            std::mem::take(&mut *tasks)
        };
        let running = tasks.len();

        let drained = tokio::time::timeout(grace, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;

        match drained {
            Ok(()) => info!(workers = running, "Monitor pool drained"),
            Err(_) => {
                warn!(
                    remaining = tasks.len(),
                    "Monitor pool grace period elapsed, aborting remaining workers"
                );
                tasks.shutdown().await;
            }
        }
    }
}
