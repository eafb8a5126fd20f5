//! Connection manager: owns the one live connection of a monitor.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use streamwatch_types::HostTarget;
use tracing::{debug, info};

use crate::{ConnectError, LineSource};

/// Opens stream connections.
///
/// Implementations perform the handshake, validate the response and hand
/// back a [`LineSource`]. Failures must be classified through
/// [`ConnectError`] so the monitor can tell fatal from transient.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to `url`, attaching `route` as the routing header when given.
    async fn connect(
        &self,
        url: &str,
        route: Option<&str>,
    ) -> Result<Box<dyn LineSource>, ConnectError>;
}

/// Owns the active connection for one host.
///
/// At most one connection is held at a time. It is released before every
/// new attempt and on teardown.
pub struct ConnectionManager {
    hostname: String,
    url: Result<String, String>,
    route: Option<String>,
    transport: Arc<dyn Transport>,
    handle: Option<Box<dyn LineSource>>,
}

impl ConnectionManager {
    /// Create a manager for `target`. The effective URL is resolved once here.
    pub fn new(target: &HostTarget, transport: Arc<dyn Transport>) -> Self {
        let url = effective_url(target).map_err(|e| match e {
            ConnectError::InvalidUrl(reason) => reason,
            other => other.to_string(),
        });
        Self {
            hostname: target.hostname().to_string(),
            url,
            route: target.route_header_value(),
            transport,
            handle: None,
        }
    }

    /// The URL connections go to, if it could be resolved.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref().ok()
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Establish a fresh connection, releasing any previous one first.
    pub async fn open(&mut self) -> Result<(), ConnectError> {
        self.release();
        let url = self
            .url
            .as_deref()
            .map_err(|reason| ConnectError::InvalidUrl(reason.clone()))?;

        debug!(host = %self.hostname, url, "Opening stream connection");
        let source = self.transport.connect(url, self.route.as_deref()).await?;
        self.handle = Some(source);
        info!(host = %self.hostname, url, "Stream connection established");
        Ok(())
    }

    /// Drop the active connection. Safe to call with nothing open.
    ///
    /// Returns `true` if a connection was released.
    pub fn release(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => {
                drop(handle);
                debug!(host = %self.hostname, "Released stream connection");
                true
            }
            None => false,
        }
    }

    /// Read the next line from the active connection.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        match self.handle.as_mut() {
            Some(handle) => handle.next_line().await,
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "no active stream connection",
            )),
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("hostname", &self.hostname)
            .field("url", &self.url)
            .field("open", &self.is_open())
            .finish()
    }
}

/// Resolve the URL a host is actually reached at.
///
/// Hosts carrying a global routing marker are reached through it: the
/// marker's scheme and host (without its port) replace the configured ones,
/// and the configured port and path are kept.
///
/// # Example
///
/// ```rust
/// use streamwatch_monitor::connection::effective_url;
/// use streamwatch_types::HostTarget;
///
/// let host = HostTarget::builder()
///     .hostname("api-1")
///     .url("https://api-1:8080/tenacity/metrics.stream")
///     .attribute("global", "https://gw.example.com:443")
///     .build();
///
/// assert_eq!(
///     effective_url(&host).unwrap(),
///     "https://gw.example.com:8080/tenacity/metrics.stream"
/// );
/// ```
pub fn effective_url(target: &HostTarget) -> Result<String, ConnectError> {
    let Some(global) = target.global_route() else {
        return Ok(target.url().to_string());
    };

    let port_and_path = target.url().splitn(3, ':').nth(2).ok_or_else(|| {
        ConnectError::InvalidUrl(format!(
            "{} has no explicit port to route through {}",
            target.url(),
            global
        ))
    })?;

    Ok(format!("{}:{}", strip_port(global)?, port_and_path))
}

/// Remove the port from a URL's authority, keeping scheme, host and path.
fn strip_port(url: &str) -> Result<String, ConnectError> {
    let (scheme, rest) = url
        .split_once("://")
        .ok_or_else(|| ConnectError::InvalidUrl(format!("{} is not an absolute url", url)))?;

    let (authority, path) = match rest.find('/') {
        Some(pos) => rest.split_at(pos),
        None => (rest, ""),
    };
    if authority.is_empty() {
        return Err(ConnectError::InvalidUrl(format!("{} has no host", url)));
    }

    let host = match authority.rsplit_once(':') {
        Some((host, port))
            if !authority.ends_with(']') && port.chars().all(|c| c.is_ascii_digit()) =>
        {
            host
        }
        _ => authority,
    };

    let path = path.trim_end_matches('/');
    Ok(format!("{}://{}{}", scheme, host, path))
}
