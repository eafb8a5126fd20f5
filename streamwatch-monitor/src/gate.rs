//! Latency gate: skip ahead in the stream instead of falling behind.
//!
//! A monitor reads its feed strictly in order. When an event arrives later
//! than the configured threshold, the gate drops it and opens a cooldown
//! window during which raw lines are read and thrown away unparsed, letting
//! the reader catch up with the head of the stream.

use streamwatch_types::{MetricEvent, CURRENT_TIME};

use crate::MonitorSettings;

/// What to do with a parsed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateVerdict {
    Forward,
    /// The event is too old; a cooldown window has been opened.
    Discard { latency_ms: i64 },
}

/// Per-monitor skip-ahead state.
///
/// All time enters through `now_ms` arguments (epoch millis).
#[derive(Debug, Default)]
pub struct LatencyGate {
    skip_until_ms: i64,
}

impl LatencyGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a cooldown window is open; such lines must not be parsed.
    pub fn should_skip_line(&self, now_ms: i64, settings: &MonitorSettings) -> bool {
        settings.skip_logic_enabled() && now_ms < self.skip_until_ms
    }

    /// Epoch millis until which lines are skipped; 0 when never triggered.
    pub fn skip_until_ms(&self) -> i64 {
        self.skip_until_ms
    }

    /// Check a parsed event's latency.
    ///
    /// Events without a usable `currentTime` are stamped with `now_ms`, so
    /// their latency is tracked from this point on.
    pub fn evaluate(
        &mut self,
        event: &mut MetricEvent,
        now_ms: i64,
        settings: &MonitorSettings,
    ) -> GateVerdict {
        if !settings.skip_logic_enabled() {
            return GateVerdict::Forward;
        }

        let event_time = match event.current_time() {
            Some(t) => t,
            None => {
                event.numeric.insert(CURRENT_TIME.to_string(), now_ms);
                event.strings.remove(CURRENT_TIME);
                now_ms
            }
        };
        event.timestamp_ms = event_time;

        let latency_ms = now_ms.saturating_sub(event_time);
        let threshold = i64::try_from(settings.latency_threshold_ms()).unwrap_or(i64::MAX);
        if latency_ms > threshold {
            let delay = i64::try_from(settings.skip_delay_ms()).unwrap_or(i64::MAX);
            self.skip_until_ms = now_ms.saturating_add(delay);
            return GateVerdict::Discard { latency_ms };
        }

        GateVerdict::Forward
    }
}
