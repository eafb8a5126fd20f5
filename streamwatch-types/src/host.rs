//! Host identity - the endpoint a monitor streams from.

use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::{String, ToString};

/// Attribute carrying the global routing marker (a base URL such as
/// `https://gateway.example.com`). When present, connections go through it.
pub const ATTR_GLOBAL_ROUTE: &str = "global";

/// Attribute carrying the routing IP for the route header.
pub const ATTR_ROUTE_IP: &str = "routeIp";

/// Attribute carrying the routing id for the route header.
pub const ATTR_ROUTE_ID: &str = "routeId";

/// Immutable identity of a monitored endpoint.
///
/// Created once when a host is discovered and never mutated afterwards;
/// there are no setters, only the builder.
///
/// # Example
///
/// ```rust
/// use streamwatch_types::HostTarget;
///
/// let host = HostTarget::builder()
///     .hostname("web-3")
///     .cluster("web")
///     .url("https://web-3:8080/tenacity/metrics.stream")
///     .attribute("routeIp", "10.0.0.3")
///     .attribute("routeId", "7")
///     .build();
///
/// assert_eq!(host.route_header_value().as_deref(), Some("10.0.0.3-7"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HostTarget {
    hostname: String,
    cluster: String,
    #[cfg_attr(feature = "serde", serde(default))]
    attributes: BTreeMap<String, String>,
    url: String,
}

impl HostTarget {
    /// Create a builder for host targets.
    pub fn builder() -> HostTargetBuilder {
        HostTargetBuilder::new()
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    /// The configured stream URL, before any routing override.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// The global routing marker, if this host is reached through a gateway.
    pub fn global_route(&self) -> Option<&str> {
        self.attribute(ATTR_GLOBAL_ROUTE)
    }

    /// Value for the routing header: `"{routeIp}-{routeId}"`.
    ///
    /// Only present when both routing attributes are set.
    pub fn route_header_value(&self) -> Option<String> {
        let ip = self.attribute(ATTR_ROUTE_IP)?;
        let id = self.attribute(ATTR_ROUTE_ID)?;
        Some(format!("{}-{}", ip, id))
    }
}

/// Builder for [`HostTarget`].
#[derive(Debug, Default)]
pub struct HostTargetBuilder {
    hostname: String,
    cluster: String,
    attributes: BTreeMap<String, String>,
    url: Option<String>,
    template: Option<UrlTemplate>,
}

impl HostTargetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    pub fn cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = cluster.into();
        self
    }

    /// Set the stream URL explicitly. Takes precedence over a template.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Resolve the URL from a template when no explicit URL is given.
    pub fn url_template(mut self, template: UrlTemplate) -> Self {
        self.template = Some(template);
        self
    }

    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn attributes<I, K, V>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.attributes
            .extend(attributes.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn build(self) -> HostTarget {
        let url = match (self.url, self.template) {
            (Some(url), _) => url,
            (None, Some(template)) => template.resolve(&self.hostname),
            (None, None) => UrlTemplate::default().resolve(&self.hostname),
        };
        HostTarget {
            hostname: self.hostname,
            cluster: self.cluster,
            attributes: self.attributes,
            url,
        }
    }
}

/// Default path appended to a hostname to reach its metric stream.
pub const DEFAULT_URL_SUFFIX: &str = ":8080/tenacity/metrics.stream";

/// How a hostname becomes a stream URL: `{protocol}://{hostname}{suffix}`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UrlTemplate {
    pub protocol: String,
    pub suffix: String,
}

impl UrlTemplate {
    pub fn new(protocol: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            suffix: suffix.into(),
        }
    }

    pub fn resolve(&self, hostname: &str) -> String {
        format!("{}://{}{}", self.protocol, hostname, self.suffix)
    }
}

impl Default for UrlTemplate {
    fn default() -> Self {
        Self {
            protocol: "https".to_string(),
            suffix: DEFAULT_URL_SUFFIX.to_string(),
        }
    }
}
