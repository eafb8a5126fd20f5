//! # streamwatch-types
//!
//! Core types shared by the streamwatch monitor and its collaborators.
//!
//! ## Overview
//!
//! - [`HostTarget`]: immutable identity of one monitored endpoint
//! - [`MetricEvent`]: one parsed line of a host's metric stream
//! - [`NumberValue`]: a value inside a nested numeric map attribute
//! - [`MonitorState`]: the ordered lifecycle of an instance monitor
//!
//! ## Features
//!
//! - `std` (default): Standard library support
//! - `serde`: Serialization of events and hosts via serde
//!
//! ## Example
//!
//! ```rust
//! use streamwatch_types::{HostTarget, MetricEvent};
//!
//! let host = HostTarget::builder()
//!     .hostname("api-1.internal")
//!     .cluster("api")
//!     .url("https://api-1.internal:8080/tenacity/metrics.stream")
//!     .build();
//!
//! let event = MetricEvent::builder("HystrixCommand", "GetUser")
//!     .host(host.hostname())
//!     .numeric("requestCount", 42)
//!     .build();
//!
//! assert_eq!(event.reporting_hosts(), 1);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod event;
mod host;
mod state;

pub use event::*;
pub use host::*;
pub use state::*;
