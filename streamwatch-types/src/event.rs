//! Metric events - one parsed line of a host's stream.

use alloc::collections::BTreeMap;
use alloc::string::String;

/// Numeric attribute every event carries: how many hosts contributed to it.
pub const REPORTING_HOSTS: &str = "reportingHosts";

/// Attribute holding the time (epoch millis) the host produced the event.
pub const CURRENT_TIME: &str = "currentTime";

/// A value inside a nested numeric map attribute.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum NumberValue {
    Integer(i64),
    Float(f64),
}

impl NumberValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            Self::Integer(v) => v as f64,
            Self::Float(v) => v,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::Integer(v) => Some(v),
            Self::Float(_) => None,
        }
    }
}

/// A structured metric record produced from one stream line.
///
/// `event_type` and `name` are the reserved keys of the JSON object; every
/// other key lands in exactly one of the three attribute maps.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MetricEvent {
    /// The `type` field of the source object.
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub event_type: String,

    /// The `name` field of the source object.
    pub name: String,

    /// Hostname of the stream this event came from.
    pub host: String,

    /// Integer attributes.
    #[cfg_attr(feature = "serde", serde(default))]
    pub numeric: BTreeMap<String, i64>,

    /// Attributes that were neither integers nor numeric maps, stringified.
    #[cfg_attr(feature = "serde", serde(default))]
    pub strings: BTreeMap<String, String>,

    /// Nested objects whose members are all numbers.
    #[cfg_attr(feature = "serde", serde(default))]
    pub maps: BTreeMap<String, BTreeMap<String, NumberValue>>,

    /// When the event was produced (epoch millis), best effort.
    pub timestamp_ms: i64,
}

impl MetricEvent {
    /// Create a builder for an event with the given type and name.
    pub fn builder(event_type: impl Into<String>, name: impl Into<String>) -> MetricEventBuilder {
        MetricEventBuilder::new(event_type, name)
    }

    /// The `reportingHosts` counter, 1 when absent.
    pub fn reporting_hosts(&self) -> i64 {
        self.numeric.get(REPORTING_HOSTS).copied().unwrap_or(1)
    }

    /// The host-provided `currentTime`, if it is a positive integer.
    pub fn current_time(&self) -> Option<i64> {
        self.numeric.get(CURRENT_TIME).copied().filter(|t| *t > 0)
    }

    pub fn numeric(&self, key: &str) -> Option<i64> {
        self.numeric.get(key).copied()
    }

    pub fn string(&self, key: &str) -> Option<&str> {
        self.strings.get(key).map(String::as_str)
    }
}

/// Builder for [`MetricEvent`].
#[derive(Debug)]
pub struct MetricEventBuilder {
    event: MetricEvent,
}

impl MetricEventBuilder {
    pub fn new(event_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            event: MetricEvent {
                event_type: event_type.into(),
                name: name.into(),
                host: String::new(),
                numeric: BTreeMap::new(),
                strings: BTreeMap::new(),
                maps: BTreeMap::new(),
                timestamp_ms: 0,
            },
        }
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.event.host = host.into();
        self
    }

    pub fn numeric(mut self, key: impl Into<String>, value: i64) -> Self {
        self.event.numeric.insert(key.into(), value);
        self
    }

    pub fn string(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.event.strings.insert(key.into(), value.into());
        self
    }

    pub fn map(mut self, key: impl Into<String>, value: BTreeMap<String, NumberValue>) -> Self {
        self.event.maps.insert(key.into(), value);
        self
    }

    pub fn timestamp_ms(mut self, timestamp_ms: i64) -> Self {
        self.event.timestamp_ms = timestamp_ms;
        self
    }

    pub fn build(self) -> MetricEvent {
        self.event
    }
}
