//! Line parser for `data: {json}` metric streams.
//!
//! Pure: no I/O and no state between calls. Every line yields an event, a
//! skip, or a malformed marker; the read loop treats the last two the same.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use streamwatch_types::{MetricEvent, NumberValue, CURRENT_TIME, REPORTING_HOSTS};

/// Literal every data-bearing line starts with.
pub const DATA_PREFIX: &str = "data";

const TYPE_KEY: &str = "type";
const NAME_KEY: &str = "name";

/// Result of parsing one raw line.
#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    /// A complete event.
    Event(MetricEvent),
    /// Not a data line (blank, keep-alive ping, no JSON).
    Skipped,
    /// A data line whose payload could not be used. The reason is for logs only.
    Malformed(String),
}

impl LineOutcome {
    pub fn into_event(self) -> Option<MetricEvent> {
        match self {
            LineOutcome::Event(event) => Some(event),
            LineOutcome::Skipped | LineOutcome::Malformed(_) => None,
        }
    }
}

/// Parse one line of the stream.
///
/// `now_ms` becomes the event timestamp unless the payload carries a positive
/// integer `currentTime`.
///
/// # Example
///
/// ```rust
/// use streamwatch_monitor::parser::{parse_line, LineOutcome};
///
/// let outcome = parse_line(r#"data: {"type":"t","name":"n","count":5}"#, "h1", 0);
/// let LineOutcome::Event(event) = outcome else { panic!("expected an event") };
/// assert_eq!(event.numeric("count"), Some(5));
/// assert_eq!(event.reporting_hosts(), 1);
/// ```
pub fn parse_line(line: &str, host: &str, now_ms: i64) -> LineOutcome {
    let line = line.trim();
    if line.is_empty() || !line.starts_with(DATA_PREFIX) {
        return LineOutcome::Skipped;
    }

    let Some(pos) = line.find('{') else {
        return LineOutcome::Skipped;
    };

    let mut json: Map<String, Value> = match serde_json::from_str(&line[pos..]) {
        Ok(json) => json,
        Err(e) => return LineOutcome::Malformed(format!("invalid json: {}", e)),
    };

    let (Some(event_type), Some(name)) = (
        take_identifier(&mut json, TYPE_KEY),
        take_identifier(&mut json, NAME_KEY),
    ) else {
        return LineOutcome::Malformed("type and/or name missing".to_string());
    };

    let mut numeric = BTreeMap::new();
    let mut strings = BTreeMap::new();
    let mut maps = BTreeMap::new();

    for (key, value) in json {
        match classify(value) {
            Attribute::Numeric(v) => {
                numeric.insert(key, v);
            }
            Attribute::Map(v) => {
                maps.insert(key, v);
            }
            Attribute::String(v) => {
                strings.insert(key, v);
            }
        }
    }

    numeric.entry(REPORTING_HOSTS.to_string()).or_insert(1);

    let timestamp_ms = numeric
        .get(CURRENT_TIME)
        .copied()
        .filter(|t| *t > 0)
        .unwrap_or(now_ms);

    LineOutcome::Event(MetricEvent {
        event_type,
        name,
        host: host.to_string(),
        numeric,
        strings,
        maps,
        timestamp_ms,
    })
}

/// Remove a reserved key, accepting only non-empty strings.
fn take_identifier(json: &mut Map<String, Value>, key: &str) -> Option<String> {
    match json.remove(key)? {
        Value::String(s) if !s.is_empty() => Some(s),
        _ => None,
    }
}

enum Attribute {
    Numeric(i64),
    Map(BTreeMap<String, NumberValue>),
    String(String),
}

fn classify(value: Value) -> Attribute {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(v) => Attribute::Numeric(v),
            None => Attribute::String(n.to_string()),
        },
        Value::Object(obj) => match numeric_map(&obj) {
            Some(map) => Attribute::Map(map),
            None => Attribute::String(Value::Object(obj).to_string()),
        },
        Value::String(s) => Attribute::String(s),
        other => Attribute::String(other.to_string()),
    }
}

fn numeric_map(obj: &Map<String, Value>) -> Option<BTreeMap<String, NumberValue>> {
    obj.iter()
        .map(|(k, v)| {
            let Value::Number(n) = v else {
                return None;
            };
            let value = match n.as_i64() {
                Some(i) => NumberValue::Integer(i),
                None => NumberValue::Float(n.as_f64()?),
            };
            Some((k.clone(), value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(line: &str) -> MetricEvent {
        match parse_line(line, "host-a", 1_000) {
            LineOutcome::Event(event) => event,
            other => panic!("expected event, got {:?}", other),
        }
    }

    #[test]
    fn parses_basic_data_line() {
        let e = event(r#"data: {"type":"t","name":"n","count":5}"#);
        assert_eq!(e.event_type, "t");
        assert_eq!(e.name, "n");
        assert_eq!(e.host, "host-a");
        assert_eq!(e.numeric.len(), 2);
        assert_eq!(e.numeric("count"), Some(5));
        assert_eq!(e.numeric(REPORTING_HOSTS), Some(1));
        assert!(e.strings.is_empty());
        assert!(e.maps.is_empty());
    }

    #[test]
    fn missing_type_yields_no_event() {
        let outcome = parse_line(r#"data: {"name":"n","count":5}"#, "h", 0);
        assert!(matches!(outcome, LineOutcome::Malformed(_)));
        assert_eq!(outcome.into_event(), None);
    }

    #[test]
    fn missing_name_yields_no_event() {
        let outcome = parse_line(r#"data: {"type":"t"}"#, "h", 0);
        assert_eq!(outcome.into_event(), None);
    }

    #[test]
    fn non_string_or_empty_identifiers_yield_no_event() {
        assert_eq!(parse_line(r#"data: {"type":1,"name":"n"}"#, "h", 0).into_event(), None);
        assert_eq!(parse_line(r#"data: {"type":"t","name":""}"#, "h", 0).into_event(), None);
    }

    #[test]
    fn non_data_lines_are_skipped() {
        assert_eq!(parse_line("", "h", 0), LineOutcome::Skipped);
        assert_eq!(parse_line("   \t ", "h", 0), LineOutcome::Skipped);
        assert_eq!(parse_line("ping: {}", "h", 0), LineOutcome::Skipped);
        assert_eq!(parse_line(": keep-alive", "h", 0), LineOutcome::Skipped);
        assert_eq!(parse_line("data: no json here", "h", 0), LineOutcome::Skipped);
    }

    #[test]
    fn invalid_json_is_malformed() {
        let outcome = parse_line(r#"data: {"type":"t","name""#, "h", 0);
        assert!(matches!(outcome, LineOutcome::Malformed(ref r) if r.starts_with("invalid json")));
    }

    #[test]
    fn json_array_payload_is_malformed() {
        // Everything after the first brace is not a single object.
        let outcome = parse_line(r#"data: [{"type":"t"}]"#, "h", 0);
        assert!(matches!(outcome, LineOutcome::Malformed(_)));
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        let e = event("  data:{\"type\":\"t\",\"name\":\"n\"}  \r");
        assert_eq!(e.name, "n");
    }

    #[test]
    fn large_integers_are_exact() {
        let e = event(r#"data: {"type":"t","name":"n","big":9223372036854775807,"neg":-9223372036854775808}"#);
        assert_eq!(e.numeric("big"), Some(i64::MAX));
        assert_eq!(e.numeric("neg"), Some(i64::MIN));
    }

    #[test]
    fn integers_beyond_i64_are_stringified() {
        let e = event(r#"data: {"type":"t","name":"n","huge":18446744073709551615}"#);
        assert_eq!(e.numeric("huge"), None);
        assert_eq!(e.string("huge"), Some("18446744073709551615"));
    }

    #[test]
    fn values_are_classified() {
        let e = event(
            r#"data: {"type":"HystrixCommand","name":"GetUser","group":"users","isCircuitBreakerOpen":false,"errorPercentage":1.5,"latencyExecute":{"0":1,"99.5":12,"mean":3.25},"tags":["a"],"owner":null}"#,
        );
        assert_eq!(e.string("group"), Some("users"));
        assert_eq!(e.string("isCircuitBreakerOpen"), Some("false"));
        assert_eq!(e.string("errorPercentage"), Some("1.5"));
        assert_eq!(e.string("tags"), Some(r#"["a"]"#));
        assert_eq!(e.string("owner"), Some("null"));

        let latency = e.maps.get("latencyExecute").unwrap();
        assert_eq!(latency.get("0"), Some(&NumberValue::Integer(1)));
        assert_eq!(latency.get("99.5"), Some(&NumberValue::Integer(12)));
        assert_eq!(latency.get("mean"), Some(&NumberValue::Float(3.25)));
    }

    #[test]
    fn objects_with_non_numeric_members_are_stringified() {
        let e = event(r#"data: {"type":"t","name":"n","meta":{"a":"b"}}"#);
        assert!(e.maps.is_empty());
        assert_eq!(e.string("meta"), Some(r#"{"a":"b"}"#));
    }

    #[test]
    fn reporting_hosts_is_kept_when_present() {
        let e = event(r#"data: {"type":"t","name":"n","reportingHosts":3}"#);
        assert_eq!(e.reporting_hosts(), 3);
    }

    #[test]
    fn non_integer_reporting_hosts_is_replaced_by_default() {
        let e = event(r#"data: {"type":"t","name":"n","reportingHosts":"many"}"#);
        assert_eq!(e.numeric(REPORTING_HOSTS), Some(1));
        assert_eq!(e.string(REPORTING_HOSTS), Some("many"));
    }

    #[test]
    fn timestamp_prefers_positive_current_time() {
        let e = event(r#"data: {"type":"t","name":"n","currentTime":1700000000000}"#);
        assert_eq!(e.timestamp_ms, 1_700_000_000_000);

        let e = event(r#"data: {"type":"t","name":"n","currentTime":0}"#);
        assert_eq!(e.timestamp_ms, 1_000);

        let e = event(r#"data: {"type":"t","name":"n"}"#);
        assert_eq!(e.timestamp_ms, 1_000);
    }
}
