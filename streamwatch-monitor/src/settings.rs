//! Runtime-tunable monitor settings.
//!
//! A single [`MonitorSettings`] is shared by every monitor. Each field is
//! stored independently and read on every use, so values changed at runtime
//! take effect on the next line without restarting any monitor.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Default latency above which events are discarded (2.5 seconds).
pub const DEFAULT_LATENCY_THRESHOLD_MS: u64 = 2500;

/// Default cooldown after a latent event (500 ms).
pub const DEFAULT_SKIP_DELAY_MS: u64 = 500;

/// Default wait between reconnect attempts (1 second).
pub const DEFAULT_RECONNECT_BACKOFF_MS: u64 = 1000;

/// Shared, hot-reloadable settings.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use streamwatch_monitor::MonitorSettings;
///
/// let settings = Arc::new(MonitorSettings::default());
/// assert!(settings.skip_logic_enabled());
///
/// // Later, from a config reload:
/// settings.set_latency_threshold_ms(5000);
/// assert_eq!(settings.latency_threshold_ms(), 5000);
/// ```
#[derive(Debug)]
pub struct MonitorSettings {
    skip_logic_enabled: AtomicBool,
    latency_threshold_ms: AtomicU64,
    skip_delay_ms: AtomicU64,
    reconnect_backoff_ms: AtomicU64,
    debug_hosts: RwLock<BTreeSet<String>>,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self::from_snapshot(&SettingsSnapshot::default())
    }
}

impl MonitorSettings {
    pub fn from_snapshot(snapshot: &SettingsSnapshot) -> Self {
        Self {
            skip_logic_enabled: AtomicBool::new(snapshot.skip_logic_enabled),
            latency_threshold_ms: AtomicU64::new(snapshot.latency_threshold_ms),
            skip_delay_ms: AtomicU64::new(snapshot.skip_delay_ms),
            reconnect_backoff_ms: AtomicU64::new(snapshot.reconnect_backoff_ms),
            debug_hosts: RwLock::new(snapshot.debug_hosts.clone()),
        }
    }

    /// Whether the latency-based skip-ahead policy is active.
    pub fn skip_logic_enabled(&self) -> bool {
        self.skip_logic_enabled.load(Ordering::Relaxed)
    }

    pub fn set_skip_logic_enabled(&self, enabled: bool) {
        self.skip_logic_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn latency_threshold_ms(&self) -> u64 {
        self.latency_threshold_ms.load(Ordering::Relaxed)
    }

    pub fn set_latency_threshold_ms(&self, millis: u64) {
        self.latency_threshold_ms.store(millis, Ordering::Relaxed);
    }

    pub fn skip_delay_ms(&self) -> u64 {
        self.skip_delay_ms.load(Ordering::Relaxed)
    }

    pub fn set_skip_delay_ms(&self, millis: u64) {
        self.skip_delay_ms.store(millis, Ordering::Relaxed);
    }

    pub fn reconnect_backoff_ms(&self) -> u64 {
        self.reconnect_backoff_ms.load(Ordering::Relaxed)
    }

    pub fn set_reconnect_backoff_ms(&self, millis: u64) {
        self.reconnect_backoff_ms.store(millis, Ordering::Relaxed);
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms())
    }

    /// Whether verbose per-line logging is on for this host.
    pub fn debug_enabled_for(&self, hostname: &str) -> bool {
        self.debug_hosts.read().contains(hostname)
    }

    pub fn set_debug_for(&self, hostname: &str, enabled: bool) {
        let mut hosts = self.debug_hosts.write();
        if enabled {
            hosts.insert(hostname.to_string());
        } else {
            hosts.remove(hostname);
        }
    }

    /// Copy out the current values.
    pub fn snapshot(&self) -> SettingsSnapshot {
        SettingsSnapshot {
            skip_logic_enabled: self.skip_logic_enabled(),
            latency_threshold_ms: self.latency_threshold_ms(),
            skip_delay_ms: self.skip_delay_ms(),
            reconnect_backoff_ms: self.reconnect_backoff_ms(),
            debug_hosts: self.debug_hosts.read().clone(),
        }
    }

    /// Replace every value with those from `snapshot`.
    pub fn apply(&self, snapshot: &SettingsSnapshot) {
        self.set_skip_logic_enabled(snapshot.skip_logic_enabled);
        self.set_latency_threshold_ms(snapshot.latency_threshold_ms);
        self.set_skip_delay_ms(snapshot.skip_delay_ms);
        self.set_reconnect_backoff_ms(snapshot.reconnect_backoff_ms);
        *self.debug_hosts.write() = snapshot.debug_hosts.clone();
    }
}

/// Plain view of [`MonitorSettings`], for configuration and reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsSnapshot {
    pub skip_logic_enabled: bool,
    pub latency_threshold_ms: u64,
    pub skip_delay_ms: u64,
    pub reconnect_backoff_ms: u64,
    pub debug_hosts: BTreeSet<String>,
}

impl Default for SettingsSnapshot {
    fn default() -> Self {
        Self {
            skip_logic_enabled: true,
            latency_threshold_ms: DEFAULT_LATENCY_THRESHOLD_MS,
            skip_delay_ms: DEFAULT_SKIP_DELAY_MS,
            reconnect_backoff_ms: DEFAULT_RECONNECT_BACKOFF_MS,
            debug_hosts: BTreeSet::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let settings = MonitorSettings::default();
        assert!(settings.skip_logic_enabled());
        assert_eq!(settings.latency_threshold_ms(), 2500);
        assert_eq!(settings.skip_delay_ms(), 500);
        assert_eq!(settings.reconnect_backoff(), Duration::from_secs(1));
        assert!(!settings.debug_enabled_for("any"));
    }

    #[test]
    fn apply_replaces_all_values() {
        let settings = MonitorSettings::default();
        settings.set_debug_for("old-host", true);

        let mut snapshot = SettingsSnapshot {
            skip_logic_enabled: false,
            latency_threshold_ms: 100,
            skip_delay_ms: 50,
            reconnect_backoff_ms: 10,
            ..Default::default()
        };
        snapshot.debug_hosts.insert("new-host".to_string());
        settings.apply(&snapshot);

        assert_eq!(settings.snapshot(), snapshot);
        assert!(!settings.debug_enabled_for("old-host"));
        assert!(settings.debug_enabled_for("new-host"));
    }

    #[test]
    fn debug_toggle_is_per_host() {
        let settings = MonitorSettings::default();
        settings.set_debug_for("a", true);
        assert!(settings.debug_enabled_for("a"));
        assert!(!settings.debug_enabled_for("b"));

        settings.set_debug_for("a", false);
        assert!(!settings.debug_enabled_for("a"));
    }

    #[test]
    fn snapshot_deserializes_with_defaults() {
        let snapshot: SettingsSnapshot =
            serde_json::from_str(r#"{"latency_threshold_ms": 4000}"#).unwrap();
        assert_eq!(snapshot.latency_threshold_ms, 4000);
        assert!(snapshot.skip_logic_enabled);
        assert_eq!(snapshot.skip_delay_ms, DEFAULT_SKIP_DELAY_MS);
    }
}
