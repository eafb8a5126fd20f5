//! Interfaces to the components a monitor reports to.
//!
//! Both are shared by every monitor in the process and must be safe to call
//! concurrently from many workers.

use streamwatch_types::{HostTarget, MetricEvent};

/// Downstream fan-out that receives parsed events.
pub trait Dispatcher: Send + Sync {
    /// Deliver events from `host`.
    ///
    /// Returns `false` when nobody is interested in this host any more; the
    /// monitor then stops itself.
    fn push(&self, host: &HostTarget, events: Vec<MetricEvent>) -> bool;

    /// The monitor for `host` is shutting down for good.
    fn notify_host_lost(&self, host: &HostTarget);
}

/// Tracks which hosts currently have a monitor.
pub trait MonitorRegistry: Send + Sync {
    /// Forget the monitor called `monitor_name`.
    fn deregister(&self, monitor_name: &str);
}
