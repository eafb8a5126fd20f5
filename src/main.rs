use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;
use streamwatch::config::{host_from_url, spawn_reload};
use streamwatch::{AppConfig, FanoutDispatcher, MonitorConsole};
use streamwatch_monitor::{InstanceMonitor, MonitorPool, MonitorSettings};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// How long monitors get to clean up after a stop before they are aborted.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "streamwatch")]
#[command(about = "Follow metric streams from many hosts and fan the events out")]
struct Args {
    /// Path to a config file (TOML, YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stream URL to monitor in addition to the configured hosts (repeatable)
    #[arg(long = "host", value_name = "URL")]
    hosts: Vec<String>,

    /// Log filter, e.g. "info" or "streamwatch_monitor=debug" (default: $RUST_LOG, then "info")
    #[arg(long)]
    log_level: Option<String>,

    /// Do not write events to stdout
    #[arg(long)]
    no_stdout: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_level.as_deref());

    let mut config = AppConfig::load(args.config.as_deref())?;
    if args.no_stdout {
        config.output.stdout = false;
    }

    let mut targets = config.targets();
    for url in &args.hosts {
        targets.push(host_from_url(url)?);
    }
    if targets.is_empty() {
        bail!("No hosts to monitor: add [[hosts]] to the config or pass --host");
    }

    let dispatcher = Arc::new(FanoutDispatcher::from_config(&config.output)?);
    if !dispatcher.has_listeners() {
        bail!("No outputs enabled: set output.stdout or output.file");
    }

    let settings = Arc::new(MonitorSettings::from_snapshot(&config.monitor.to_snapshot()?));
    let transport = Arc::new(config.http.build_transport()?);
    let console = Arc::new(MonitorConsole::new());
    let pool = Arc::new(MonitorPool::current());

    for target in targets {
        let name = target.hostname().to_string();
        let monitor = Arc::new(InstanceMonitor::new(
            target,
            transport.clone(),
            dispatcher.clone(),
            console.clone(),
            settings.clone(),
            pool.clone(),
        ));
        if console.register(monitor.clone()) {
            monitor.start();
        } else {
            warn!(host = %name, "Host listed twice, keeping the first entry");
        }
    }
    info!(hosts = console.len(), "Monitoring started");

    let reload = match (&args.config, config.reload_interval()?) {
        (Some(path), Some(interval)) => Some(spawn_reload(path.clone(), interval, settings.clone())),
        (None, Some(_)) => {
            warn!("reload_interval is set but no config file was given, not reloading");
            None
        }
        _ => None,
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Interrupted, stopping monitors");
        }
        _ = console.wait_until_empty() => {
            info!("All monitors have stopped");
        }
    }

    console.stop_all();
    pool.shutdown(SHUTDOWN_GRACE).await;
    if let Some(reload) = reload {
        reload.abort();
    }
    Ok(())
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    // Events go to stdout, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
