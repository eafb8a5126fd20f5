//! # streamwatch
//!
//! Follow Hystrix-style metric streams from many hosts at once and fan the
//! events out to stdout, a file or an in-process channel.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          streamwatch                         │
//! │  ┌──────────┐    ┌─────────────────┐    ┌──────────────────┐ │
//! │  │  config  │───▶│ InstanceMonitor │───▶│ FanoutDispatcher │ │
//! │  │ (hosts)  │    │   (per host)    │    │    (outputs)     │ │
//! │  └──────────┘    └────────┬────────┘    └──────────────────┘ │
//! │                           │                                  │
//! │                           ▼                                  │
//! │                  ┌─────────────────┐                         │
//! │                  │ MonitorConsole  │                         │
//! │                  │   (registry)    │                         │
//! │                  └─────────────────┘                         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **[`config`]**: config file and environment loading, periodic reload of
//!   the runtime-tunable monitor settings
//! - **[`dispatch`]**: the [`FanoutDispatcher`] that writes events to every
//!   [`Output`]
//! - **[`console`]**: the [`MonitorConsole`] tracking live monitors
//! - **[`duration`]**: duration strings such as `"2500ms"`
//!
//! The monitors themselves live in `streamwatch-monitor`.

pub mod config;
pub mod console;
pub mod dispatch;
pub mod duration;
pub mod output;

pub use config::AppConfig;
pub use console::MonitorConsole;
pub use dispatch::FanoutDispatcher;
pub use output::Output;
