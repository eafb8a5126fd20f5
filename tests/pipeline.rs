//! Monitors wired to the fan-out dispatcher and the console.

use std::io::{self, Cursor};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use streamwatch::{FanoutDispatcher, MonitorConsole, Output};
use streamwatch_monitor::{
    ConnectError, InstanceMonitor, LineSource, MonitorPool, MonitorSettings, MonitorState,
    ReaderLineSource, Transport,
};
use streamwatch_types::HostTarget;

/// Serves `body` on the first connection and an idle stream afterwards.
struct OneShot {
    body: &'static str,
    served: parking_lot::Mutex<bool>,
}

struct Idle;

#[async_trait]
impl LineSource for Idle {
    async fn next_line(&mut self) -> io::Result<Option<String>> {
        std::future::pending().await
    }
}

#[async_trait]
impl Transport for OneShot {
    async fn connect(
        &self,
        _url: &str,
        _route: Option<&str>,
    ) -> Result<Box<dyn LineSource>, ConnectError> {
        let mut served = self.served.lock();
        if *served {
            return Ok(Box::new(Idle));
        }
        *served = true;
        Ok(Box::new(ReaderLineSource::new(Cursor::new(self.body))))
    }
}

fn transport(body: &'static str) -> Arc<OneShot> {
    Arc::new(OneShot {
        body,
        served: parking_lot::Mutex::new(false),
    })
}

fn spawn_monitor(
    hostname: &str,
    transport: Arc<OneShot>,
    dispatcher: &Arc<FanoutDispatcher>,
    console: &Arc<MonitorConsole>,
    pool: &Arc<MonitorPool>,
) -> Arc<InstanceMonitor> {
    let monitor = Arc::new(InstanceMonitor::new(
        HostTarget::builder()
            .hostname(hostname)
            .cluster("api")
            .url(format!("http://{}:8080/tenacity/metrics.stream", hostname))
            .build(),
        transport,
        dispatcher.clone(),
        console.clone(),
        Arc::new(MonitorSettings::default()),
        pool.clone(),
    ));
    assert!(console.register(monitor.clone()));
    monitor.start();
    monitor
}

#[tokio::test]
async fn events_flow_to_channel_output() {
    let (output, mut rx) = Output::channel(16);
    let dispatcher = Arc::new(FanoutDispatcher::new(vec![output]));
    let console = Arc::new(MonitorConsole::new());
    let pool = Arc::new(MonitorPool::current());

    spawn_monitor(
        "api-1",
        transport("data: {\"type\":\"HystrixCommand\",\"name\":\"GetUser\",\"errorCount\":1}\n"),
        &dispatcher,
        &console,
        &pool,
    );
    spawn_monitor(
        "api-2",
        transport("data: {\"type\":\"HystrixThreadPool\",\"name\":\"Users\",\"reportingHosts\":3}\n"),
        &dispatcher,
        &console,
        &pool,
    );

    let mut received = Vec::new();
    for _ in 0..2 {
        let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("no event")
            .unwrap();
        received.push(event);
    }
    received.sort_by(|a, b| a.host.cmp(&b.host));

    assert_eq!(received[0].host, "api-1");
    assert_eq!(received[0].numeric("errorCount"), Some(1));
    assert_eq!(received[0].reporting_hosts(), 1);
    assert_eq!(received[1].host, "api-2");
    assert_eq!(received[1].reporting_hosts(), 3);
    assert_eq!(dispatcher.events_for("api-1"), 1);

    console.stop_all();
    tokio::time::timeout(Duration::from_secs(10), console.wait_until_empty())
        .await
        .expect("monitors did not deregister");
    pool.shutdown(Duration::from_secs(1)).await;
    assert!(dispatcher.hosts().is_empty());
}

#[tokio::test]
async fn dropped_receiver_stops_monitor() {
    let (output, rx) = Output::channel(16);
    let dispatcher = Arc::new(FanoutDispatcher::new(vec![output]));
    let console = Arc::new(MonitorConsole::new());
    let pool = Arc::new(MonitorPool::current());
    drop(rx);

    let monitor = spawn_monitor(
        "api-1",
        transport("data: {\"type\":\"t\",\"name\":\"n\"}\n"),
        &dispatcher,
        &console,
        &pool,
    );

    tokio::time::timeout(Duration::from_secs(10), monitor.wait_stopped())
        .await
        .expect("monitor did not stop");
    assert_eq!(monitor.state(), MonitorState::CleanedUp);
    assert!(console.is_empty());
}
