//! Error types for monitors and their connections.

use std::error::Error as StdError;
use std::io;

use thiserror::Error;

/// Whether a failed connection attempt may be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The endpoint itself is wrong or unreachable; never retry.
    Fatal,
    /// Network flakiness; retry after the backoff.
    Transient,
}

/// Errors that can occur while establishing a stream connection.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The hostname could not be resolved.
    #[error("could not resolve host: {0}")]
    Unresolvable(String),

    /// No route to the host or its network.
    #[error("no route to host: {0}")]
    NoRoute(String),

    /// The endpoint answered, but not with 200. Usually a wrong path.
    #[error("host answered with status {status}: {body}")]
    MisconfiguredHost { status: u16, body: String },

    /// The stream URL cannot be built or parsed.
    #[error("invalid stream url: {0}")]
    InvalidUrl(String),

    /// Any other I/O failure: timeouts, resets, refused connections.
    #[error("connection failed: {0}")]
    Io(String),
}

impl ConnectError {
    /// Classify this failure for the reconnect procedure.
    pub fn kind(&self) -> FailureKind {
        match self {
            ConnectError::Unresolvable(_)
            | ConnectError::NoRoute(_)
            | ConnectError::MisconfiguredHost { .. }
            | ConnectError::InvalidUrl(_) => FailureKind::Fatal,
            ConnectError::Io(_) => FailureKind::Transient,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind() == FailureKind::Fatal
    }
}

impl From<io::Error> for ConnectError {
    fn from(err: io::Error) -> Self {
        classify_io(&err).unwrap_or_else(|| ConnectError::Io(err.to_string()))
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for ConnectError {
    fn from(err: reqwest::Error) -> Self {
        let message = error_chain(&err);
        if err.is_builder() {
            return ConnectError::InvalidUrl(message);
        }
        if err.is_connect() {
            if let Some(classified) = find_io_error(&err).and_then(classify_io) {
                return classified;
            }
            if looks_like_dns_failure(&message) {
                return ConnectError::Unresolvable(message);
            }
        }
        ConnectError::Io(message)
    }
}

/// Errors that end a monitor's worker.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Reconnecting stopped because the monitor is no longer running.
    #[error("giving up on host connection")]
    GaveUp,

    /// A connection attempt failed.
    #[error(transparent)]
    Connect(#[from] ConnectError),
}

/// Errors from the worker pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The pool has been closed and accepts no more workers.
    #[error("monitor pool is closed")]
    Closed,
}

fn classify_io(err: &io::Error) -> Option<ConnectError> {
    match err.kind() {
        io::ErrorKind::HostUnreachable | io::ErrorKind::NetworkUnreachable => {
            Some(ConnectError::NoRoute(err.to_string()))
        }
        _ if looks_like_dns_failure(&err.to_string()) => {
            Some(ConnectError::Unresolvable(err.to_string()))
        }
        _ => None,
    }
}

fn looks_like_dns_failure(message: &str) -> bool {
    message.contains("dns error") || message.contains("failed to lookup address")
}

/// Walk the source chain looking for the underlying I/O error.
#[cfg_attr(not(feature = "http"), allow(dead_code))]
fn find_io_error<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a io::Error> {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<io::Error>() {
            return Some(io);
        }
        current = e.source();
    }
    None
}

/// Render an error and all of its sources as `outer: inner: root`.
#[cfg_attr(not(feature = "http"), allow(dead_code))]
pub(crate) fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut current = err.source();
    while let Some(e) = current {
        let text = e.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        current = e.source();
    }
    message
}
