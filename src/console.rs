//! Registry of the monitors currently running in this process.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use streamwatch_monitor::{InstanceMonitor, MonitorRegistry};
use tokio::sync::Notify;
use tracing::debug;

/// Keeps one monitor per host name.
///
/// Monitors deregister themselves when they clean up, so the console only
/// ever lists monitors that still hold (or are trying to hold) a connection.
#[derive(Debug, Default)]
pub struct MonitorConsole {
    monitors: RwLock<BTreeMap<String, Arc<InstanceMonitor>>>,
    changed: Notify,
}

impl MonitorConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a monitor. Returns `false` if one with the same name is present.
    pub fn register(&self, monitor: Arc<InstanceMonitor>) -> bool {
        let mut monitors = self.monitors.write();
        if monitors.contains_key(monitor.name()) {
            return false;
        }
        debug!(host = monitor.name(), "Registered monitor");
        monitors.insert(monitor.name().to_string(), monitor);
        true
    }

    pub fn get(&self, name: &str) -> Option<Arc<InstanceMonitor>> {
        self.monitors.read().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.monitors.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.monitors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.monitors.read().is_empty()
    }

    /// Ask every registered monitor to stop.
    pub fn stop_all(&self) {
        let monitors: Vec<_> = self.monitors.read().values().cloned().collect();
        for monitor in monitors {
            monitor.stop();
        }
    }

    /// Wait until every monitor has deregistered.
    pub async fn wait_until_empty(&self) {
        loop {
            let notified = self.changed.notified();
            if self.is_empty() {
                return;
            }
            notified.await;
        }
    }
}

impl MonitorRegistry for MonitorConsole {
    fn deregister(&self, monitor_name: &str) {
        if self.monitors.write().remove(monitor_name).is_some() {
            debug!(host = monitor_name, "Deregistered monitor");
        }
        self.changed.notify_waiters();
    }
}
