//! # streamwatch-monitor
//!
//! Per-host monitors for newline-delimited JSON metric streams.
//!
//! Each [`InstanceMonitor`] keeps one long-lived streaming connection open to
//! one host, parses every `data: {json}` line into a
//! [`MetricEvent`](streamwatch_types::MetricEvent) and pushes it to a
//! [`Dispatcher`]. Connections that drop are re-established with a fixed
//! backoff; hosts that answer with the wrong status or cannot be reached at
//! all are given up on. When a monitor falls behind its feed, the
//! [`LatencyGate`] discards stale events and skips ahead.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use streamwatch_monitor::{
//!     Dispatcher, HttpTransport, InstanceMonitor, MonitorPool, MonitorRegistry,
//!     MonitorSettings,
//! };
//! use streamwatch_types::{HostTarget, MetricEvent};
//!
//! struct Stdout;
//!
//! impl Dispatcher for Stdout {
//!     fn push(&self, host: &HostTarget, events: Vec<MetricEvent>) -> bool {
//!         for event in events {
//!             println!("{} {} {}", host.hostname(), event.event_type, event.name);
//!         }
//!         true
//!     }
//!
//!     fn notify_host_lost(&self, host: &HostTarget) {
//!         eprintln!("lost {}", host.hostname());
//!     }
//! }
//!
//! impl MonitorRegistry for Stdout {
//!     fn deregister(&self, _name: &str) {}
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = Arc::new(MonitorPool::current());
//!     let monitor = Arc::new(InstanceMonitor::new(
//!         HostTarget::builder().hostname("api-1").cluster("api").build(),
//!         Arc::new(HttpTransport::builder().build()?),
//!         Arc::new(Stdout),
//!         Arc::new(Stdout),
//!         Arc::new(MonitorSettings::default()),
//!         pool.clone(),
//!     ));
//!
//!     monitor.start();
//!     tokio::signal::ctrl_c().await?;
//!     monitor.stop();
//!     pool.shutdown(std::time::Duration::from_secs(5)).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `http` (default) - the reqwest-based [`HttpTransport`]

pub mod collaborators;
pub mod connection;
pub mod error;
pub mod gate;
pub mod monitor;
pub mod parser;
pub mod pool;
pub mod settings;
pub mod source;

#[cfg(feature = "http")]
pub mod http;

pub use collaborators::{Dispatcher, MonitorRegistry};
pub use connection::{ConnectionManager, Transport};
pub use error::{ConnectError, FailureKind, MonitorError, PoolError};
pub use gate::{GateVerdict, LatencyGate};
pub use monitor::InstanceMonitor;
pub use parser::{parse_line, LineOutcome};
pub use pool::MonitorPool;
pub use settings::{MonitorSettings, SettingsSnapshot};
pub use source::{LineSource, ReaderLineSource};

#[cfg(feature = "http")]
pub use http::{HttpTransport, HttpTransportBuilder};

// Re-export types for convenience
pub use streamwatch_types::{HostTarget, MetricEvent, MonitorState, NumberValue, UrlTemplate};
