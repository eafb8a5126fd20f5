//! Fan-out dispatcher writing events to every configured output.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::RwLock;
use streamwatch_monitor::Dispatcher;
use streamwatch_types::{HostTarget, MetricEvent};
use tracing::{info, warn};

use crate::config::OutputSection;
use crate::Output;

/// Per-host delivery counters.
#[derive(Debug, Default)]
pub struct HostCounters {
    pub events: AtomicU64,
    pub batches: AtomicU64,
}

/// Sends every pushed event to all outputs.
///
/// A push reports "keep going" while at least one output is still open:
/// stdout and files always are, channels only until their receiver drops.
///
/// # Example
///
/// ```rust
/// use streamwatch::{FanoutDispatcher, Output};
/// use streamwatch_monitor::Dispatcher;
/// use streamwatch_types::{HostTarget, MetricEvent};
///
/// let (output, mut rx) = Output::channel(8);
/// let dispatcher = FanoutDispatcher::new(vec![output]);
/// let host = HostTarget::builder().hostname("api-1").build();
///
/// assert!(dispatcher.push(&host, vec![MetricEvent::builder("t", "n").build()]));
/// assert_eq!(rx.try_recv().unwrap().name, "n");
///
/// drop(rx);
/// assert!(!dispatcher.push(&host, vec![MetricEvent::builder("t", "n").build()]));
/// ```
#[derive(Debug, Default)]
pub struct FanoutDispatcher {
    outputs: Vec<Output>,
    hosts: RwLock<BTreeMap<String, Arc<HostCounters>>>,
}

impl FanoutDispatcher {
    pub fn new(outputs: Vec<Output>) -> Self {
        Self {
            outputs,
            hosts: RwLock::new(BTreeMap::new()),
        }
    }

    /// Open the outputs named in the `[output]` section.
    pub fn from_config(section: &OutputSection) -> Result<Self> {
        let mut outputs = Vec::new();
        if section.stdout {
            outputs.push(Output::stdout());
        }
        if let Some(path) = &section.file {
            let output = Output::file(path)
                .with_context(|| format!("failed to open output file {}", path.display()))?;
            outputs.push(output);
        }
        Ok(Self::new(outputs))
    }

    /// Add an output. Only possible before the dispatcher is shared.
    pub fn with_output(mut self, output: Output) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    /// Whether any output is still being read.
    pub fn has_listeners(&self) -> bool {
        self.outputs.iter().any(Output::is_open)
    }

    /// Events delivered for `hostname` since its monitor started.
    pub fn events_for(&self, hostname: &str) -> u64 {
        self.hosts
            .read()
            .get(hostname)
            .map(|c| c.events.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Hosts that have delivered at least one batch and are not lost.
    pub fn hosts(&self) -> Vec<String> {
        self.hosts.read().keys().cloned().collect()
    }

    fn counters(&self, hostname: &str) -> Arc<HostCounters> {
        // Fast path: check if it exists
        {
            let hosts = self.hosts.read();
            if let Some(counters) = hosts.get(hostname) {
                return counters.clone();
            }
        }

        let mut hosts = self.hosts.write();
        hosts
            .entry(hostname.to_string())
            .or_insert_with(|| Arc::new(HostCounters::default()))
            .clone()
    }
}

impl Dispatcher for FanoutDispatcher {
    fn push(&self, host: &HostTarget, events: Vec<MetricEvent>) -> bool {
        let live: Vec<&Output> = self.outputs.iter().filter(|o| o.is_open()).collect();
        if live.is_empty() {
            return false;
        }

        let counters = self.counters(host.hostname());
        counters.batches.fetch_add(1, Ordering::Relaxed);

        for event in &events {
            let json = match serde_json::to_string(event) {
                Ok(json) => json,
                Err(e) => {
                    warn!(host = host.hostname(), error = %e, "Could not serialize event");
                    continue;
                }
            };
            for output in &live {
                if let Err(e) = output.emit(event, &json) {
                    warn!(host = host.hostname(), error = %e, "Could not write event");
                }
            }
            counters.events.fetch_add(1, Ordering::Relaxed);
        }
        true
    }

    fn notify_host_lost(&self, host: &HostTarget) {
        let removed = self.hosts.write().remove(host.hostname());
        let events = removed
            .map(|c| c.events.load(Ordering::Relaxed))
            .unwrap_or(0);
        info!(host = host.hostname(), cluster = host.cluster(), events, "Host lost");
    }
}
