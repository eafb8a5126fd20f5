//! HTTP streaming transport built on reqwest.
//!
//! Issues one long-lived GET per connection and splits the chunked response
//! body into lines as it arrives.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use streamwatch_monitor::{HttpTransport, Transport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = HttpTransport::builder()
//!         .connect_timeout(Duration::from_secs(5))
//!         .read_timeout(Duration::from_secs(10))
//!         .build()?;
//!
//!     let mut lines = transport
//!         .connect("http://localhost:8080/hystrix.stream", None)
//!         .await?;
//!
//!     while let Some(line) = lines.next_line().await? {
//!         println!("{}", line);
//!     }
//!     Ok(())
//! }
//! ```

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use tokio::time::timeout;

use crate::source::decode_line;
use crate::{ConnectError, LineSource, Transport};

/// Default connect timeout (10 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time allowed between two body chunks (10 seconds).
///
/// Streams send a keep-alive ping every few seconds even when idle, so a
/// silent connection this long is treated as broken.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Default name of the header carrying a host's routing value.
pub const DEFAULT_ROUTE_HEADER: &str = "X-Route";

/// Largest error body kept for diagnostics.
const MAX_ERROR_BODY: usize = 4096;

/// Transport that opens metric streams over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    read_timeout: Duration,
    route_header: String,
}

impl HttpTransport {
    /// Create a new builder for configuring the transport.
    pub fn builder() -> HttpTransportBuilder {
        HttpTransportBuilder::default()
    }

    pub fn route_header(&self) -> &str {
        &self.route_header
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn connect(
        &self,
        url: &str,
        route: Option<&str>,
    ) -> Result<Box<dyn LineSource>, ConnectError> {
        let mut request = self.client.get(url);
        if let Some(route) = route {
            request = request.header(self.route_header.as_str(), route);
        }

        // A peer that accepts the connection but never answers counts as a
        // silent read.
        let response = match timeout(self.read_timeout, request.send()).await {
            Ok(response) => response?,
            Err(_) => return Err(silent_for(self.read_timeout).into()),
        };

        if response.status() != StatusCode::OK {
            let status = response.status().as_u16();
            let body = error_body(response, self.read_timeout).await;
            return Err(ConnectError::MisconfiguredHost { status, body });
        }

        Ok(Box::new(HttpLineSource {
            response,
            buf: Vec::new(),
            read_timeout: self.read_timeout,
            finished: false,
        }))
    }
}

/// Read at most [`MAX_ERROR_BODY`] bytes of a failed response, giving up on
/// the body after `read_timeout` of silence.
async fn error_body(mut response: Response, read_timeout: Duration) -> String {
    let mut body = Vec::new();
    while body.len() < MAX_ERROR_BODY {
        match timeout(read_timeout, response.chunk()).await {
            Ok(Ok(Some(chunk))) => body.extend_from_slice(&chunk),
            Ok(Ok(None)) | Ok(Err(_)) | Err(_) => break,
        }
    }
    body.truncate(MAX_ERROR_BODY);
    String::from_utf8_lossy(&body).trim().to_string()
}

fn silent_for(read_timeout: Duration) -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, format!("no data for {:?}", read_timeout))
}

/// Line source over a streaming response body.
struct HttpLineSource {
    response: Response,
    buf: Vec<u8>,
    read_timeout: Duration,
    finished: bool,
}

#[async_trait]
impl LineSource for HttpLineSource {
    async fn next_line(&mut self) -> io::Result<Option<String>> {
        loop {
            if let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = self.buf.drain(..=pos).collect();
                return Ok(Some(decode_line(&line)));
            }

            if self.finished {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                let rest = std::mem::take(&mut self.buf);
                return Ok(Some(decode_line(&rest)));
            }

            match timeout(self.read_timeout, self.response.chunk()).await {
                Err(_) => return Err(silent_for(self.read_timeout)),
                Ok(Err(e)) => return Err(io::Error::other(e)),
                Ok(Ok(Some(chunk))) => self.buf.extend_from_slice(&chunk),
                Ok(Ok(None)) => self.finished = true,
            }
        }
    }
}

/// Builder for [`HttpTransport`].
#[derive(Debug, Default)]
pub struct HttpTransportBuilder {
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    route_header: Option<String>,
}

impl HttpTransportBuilder {
    /// Set the connect timeout (default: 10 seconds).
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the longest allowed silence on an open stream (default: 10 seconds).
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Set the routing header name (default: "X-Route").
    pub fn route_header(mut self, name: impl Into<String>) -> Self {
        self.route_header = Some(name.into());
        self
    }

    /// Build the transport.
    pub fn build(self) -> Result<HttpTransport, ConnectError> {
        let client = Client::builder()
            .connect_timeout(self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT))
            .build()?;

        Ok(HttpTransport {
            client,
            read_timeout: self.read_timeout.unwrap_or(DEFAULT_READ_TIMEOUT),
            route_header: self
                .route_header
                .unwrap_or_else(|| DEFAULT_ROUTE_HEADER.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let transport = HttpTransport::builder().build().unwrap();
        assert_eq!(transport.route_header(), "X-Route");
        assert_eq!(transport.read_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_builder_custom() {
        let transport = HttpTransport::builder()
            .read_timeout(Duration::from_secs(3))
            .route_header("X-Gateway-Route")
            .build()
            .unwrap();
        assert_eq!(transport.route_header(), "X-Gateway-Route");
        assert_eq!(transport.read_timeout(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn invalid_url_is_fatal() {
        let transport = HttpTransport::builder().build().unwrap();
        let err = match transport.connect("not a url", None).await {
            Err(e) => e,
            Ok(_) => panic!("connect should fail"),
        };
        assert!(err.is_fatal(), "unexpected classification: {:?}", err);
    }
}
