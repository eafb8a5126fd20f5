//! Configuration file loading.
//!
//! A config file (TOML, YAML or JSON, picked by extension) is layered under
//! environment overrides prefixed with `STREAMWATCH`:
//!
//! ```toml
//! reload_interval = "30s"
//!
//! [monitor]
//! skip_logic_enabled = true
//! latency_threshold = "2500ms"
//! skip_delay = "500ms"
//! reconnect_backoff = "1s"
//! debug_hosts = ["api-1"]
//!
//! [http]
//! connect_timeout = "10s"
//! read_timeout = "10s"
//! route_header = "X-Route"
//!
//! [url]
//! protocol = "https"
//! suffix = ":8080/tenacity/metrics.stream"
//! protocols = { legacy = "http" }
//!
//! [[hosts]]
//! hostname = "api-1"
//! cluster = "api"
//!
//! [output]
//! stdout = true
//! file = "events.ndjson"
//! ```
//!
//! Environment variables use `__` between section and key, for example
//! `STREAMWATCH_MONITOR__SKIP_LOGIC_ENABLED=false`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use streamwatch_monitor::http::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT, DEFAULT_ROUTE_HEADER};
use streamwatch_monitor::{HttpTransport, MonitorSettings, SettingsSnapshot};
use streamwatch_types::{
    HostTarget, UrlTemplate, ATTR_GLOBAL_ROUTE, ATTR_ROUTE_ID, ATTR_ROUTE_IP, DEFAULT_URL_SUFFIX,
};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::duration::{parse_duration, parse_millis};

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "STREAMWATCH";

/// Cluster given to hosts passed on the command line.
pub const ADHOC_CLUSTER: &str = "adhoc";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub monitor: MonitorSection,
    pub http: HttpSection,
    pub url: UrlSection,
    pub hosts: Vec<HostEntry>,
    pub output: OutputSection,
    /// How often to re-read the file for `[monitor]` changes.
    pub reload_interval: Option<String>,
}

/// Runtime-tunable monitor settings. Durations are strings like `"500ms"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorSection {
    pub skip_logic_enabled: bool,
    pub latency_threshold: String,
    pub skip_delay: String,
    pub reconnect_backoff: String,
    pub debug_hosts: Vec<String>,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            skip_logic_enabled: true,
            latency_threshold: "2500ms".to_string(),
            skip_delay: "500ms".to_string(),
            reconnect_backoff: "1s".to_string(),
            debug_hosts: Vec::new(),
        }
    }
}

impl MonitorSection {
    pub fn to_snapshot(&self) -> Result<SettingsSnapshot> {
        Ok(SettingsSnapshot {
            skip_logic_enabled: self.skip_logic_enabled,
            latency_threshold_ms: parse_millis(&self.latency_threshold)
                .context("invalid monitor.latency_threshold")?,
            skip_delay_ms: parse_millis(&self.skip_delay).context("invalid monitor.skip_delay")?,
            reconnect_backoff_ms: parse_millis(&self.reconnect_backoff)
                .context("invalid monitor.reconnect_backoff")?,
            debug_hosts: self.debug_hosts.iter().cloned().collect(),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSection {
    pub connect_timeout: String,
    pub read_timeout: String,
    pub route_header: String,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            connect_timeout: format!("{}s", DEFAULT_CONNECT_TIMEOUT.as_secs()),
            read_timeout: format!("{}s", DEFAULT_READ_TIMEOUT.as_secs()),
            route_header: DEFAULT_ROUTE_HEADER.to_string(),
        }
    }
}

impl HttpSection {
    pub fn build_transport(&self) -> Result<HttpTransport> {
        let connect_timeout =
            parse_duration(&self.connect_timeout).context("invalid http.connect_timeout")?;
        let read_timeout =
            parse_duration(&self.read_timeout).context("invalid http.read_timeout")?;
        if read_timeout.is_zero() {
            bail!("http.read_timeout must be greater than zero");
        }

        let transport = HttpTransport::builder()
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .route_header(self.route_header.clone())
            .build()?;
        Ok(transport)
    }
}

/// How stream URLs are derived from hostnames.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UrlSection {
    pub protocol: String,
    pub suffix: String,
    /// Per-cluster protocol overrides.
    pub protocols: BTreeMap<String, String>,
}

impl Default for UrlSection {
    fn default() -> Self {
        Self {
            protocol: "https".to_string(),
            suffix: DEFAULT_URL_SUFFIX.to_string(),
            protocols: BTreeMap::new(),
        }
    }
}

impl UrlSection {
    pub fn template_for(&self, cluster: &str) -> UrlTemplate {
        let protocol = self.protocols.get(cluster).unwrap_or(&self.protocol);
        UrlTemplate::new(protocol.clone(), self.suffix.clone())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HostEntry {
    pub hostname: String,
    pub cluster: String,
    /// Full stream URL; derived from `[url]` when absent.
    pub url: Option<String>,
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    pub stdout: bool,
    /// NDJSON file events are appended to.
    pub file: Option<PathBuf>,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            stdout: true,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load from an optional file plus environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| match path {
                Some(path) => format!("failed to load config from {}", path.display()),
                None => "failed to load config from environment".to_string(),
            })?;

        let app: AppConfig = config.try_deserialize()?;
        app.validate()?;
        Ok(app)
    }

    fn validate(&self) -> Result<()> {
        for (i, host) in self.hosts.iter().enumerate() {
            if host.hostname.trim().is_empty() {
                bail!("hosts[{}] has no hostname", i);
            }
        }
        self.monitor.to_snapshot()?;
        Ok(())
    }

    pub fn reload_interval(&self) -> Result<Option<Duration>> {
        match &self.reload_interval {
            None => Ok(None),
            Some(s) => {
                let interval = parse_duration(s).context("invalid reload_interval")?;
                if interval.is_zero() {
                    bail!("reload_interval must be greater than zero");
                }
                Ok(Some(interval))
            }
        }
    }

    /// The configured hosts as monitor targets.
    pub fn targets(&self) -> Vec<HostTarget> {
        self.hosts
            .iter()
            .map(|entry| {
                let mut builder = HostTarget::builder()
                    .hostname(entry.hostname.trim())
                    .cluster(entry.cluster.clone())
                    .attributes(
                        entry
                            .attributes
                            .iter()
                            .map(|(k, v)| (canonical_attribute(k), v.clone())),
                    )
                    .url_template(self.url.template_for(&entry.cluster));
                if let Some(url) = &entry.url {
                    builder = builder.url(url.clone());
                }
                builder.build()
            })
            .collect()
    }
}

/// Restore the casing of the routing attributes; config keys may arrive
/// lowercased.
fn canonical_attribute(key: &str) -> String {
    [ATTR_GLOBAL_ROUTE, ATTR_ROUTE_IP, ATTR_ROUTE_ID]
        .into_iter()
        .find(|known| known.eq_ignore_ascii_case(key))
        .unwrap_or(key)
        .to_string()
}

/// Build a target from a bare stream URL given on the command line.
///
/// The hostname is the URL's host.
pub fn host_from_url(url: &str) -> Result<HostTarget> {
    let Some((_, rest)) = url.split_once("://") else {
        bail!("host url must be absolute: {}", url);
    };
    let authority = rest.split('/').next().unwrap_or_default();
    let hostname = if let Some(bracketed) = authority.strip_prefix('[') {
        bracketed.split(']').next().unwrap_or_default()
    } else {
        authority.split(':').next().unwrap_or_default()
    };
    if hostname.is_empty() {
        bail!("host url has no host: {}", url);
    }

    Ok(HostTarget::builder()
        .hostname(hostname)
        .cluster(ADHOC_CLUSTER)
        .url(url)
        .build())
}

/// Periodically re-read `path` and apply its `[monitor]` section to `settings`.
///
/// Bad reloads are logged and the previous settings kept.
pub fn spawn_reload(
    path: PathBuf,
    interval: Duration,
    settings: Arc<MonitorSettings>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match reload_once(&path, &settings) {
                Ok(true) => info!(path = %path.display(), "Reloaded monitor settings"),
                Ok(false) => debug!(path = %path.display(), "Monitor settings unchanged"),
                Err(e) => warn!(path = %path.display(), error = %e, "Could not reload config"),
            }
        }
    })
}

/// Apply the file's monitor settings; returns whether anything changed.
pub fn reload_once(path: &Path, settings: &MonitorSettings) -> Result<bool> {
    let snapshot = AppConfig::load(Some(path))?.monitor.to_snapshot()?;
    if snapshot == settings.snapshot() {
        return Ok(false);
    }
    settings.apply(&snapshot);
    Ok(true)
}
