#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

use anyhow::{bail, Result};
use clap::Parser;
use kube::runtime::watcher;
use mesh_ingress_controller::{Announcement, ApiVersion, Monitor, MonitoredNamespaces};
use std::sync::Arc;
use tokio::{
    sync::{mpsc, oneshot},
    time,
};
use tracing::Instrument;

#[derive(Parser)]
#[command(version)]
struct Args {
    #[arg(
        long,
        env = "MESH_INGRESS_LOG_LEVEL",
        default_value = "mesh_ingress=info,warn"
    )]
    log_level: kubert::LogFilter,

    #[arg(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[command(flatten)]
    client: kubert::ClientArgs,

    #[command(flatten)]
    admin: kubert::AdminArgs,

    /// The ingress API version to watch
    #[arg(
        long,
        env = "MESH_INGRESS_API_VERSION",
        default_value = "networking.k8s.io/v1"
    )]
    ingress_api_version: ApiVersion,

    /// Namespaces whose ingresses are announced. All namespaces are monitored
    /// when none are given.
    #[arg(long = "namespace", short = 'n')]
    namespaces: Vec<String>,

    /// How often every monitored ingress is re-announced. 0 disables resyncs.
    #[arg(long, default_value = "300")]
    resync_interval_secs: u64,

    #[arg(long, short = 'l')]
    label_selector: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let Args {
        log_level,
        log_format,
        client,
        admin,
        ingress_api_version,
        namespaces,
        resync_interval_secs,
        label_selector,
    } = Args::parse();

    let runtime = kubert::Runtime::builder()
        .with_log(log_level, log_format)
        .with_admin(admin)
        .with_client(client)
        .build()
        .await?;

    let mut config = watcher::Config::default();
    if let Some(selector) = label_selector.as_deref() {
        config = config.labels(selector);
    }
    let filter = Arc::new(namespaces.into_iter().collect::<MonitoredNamespaces>());
    let (announcements_tx, announcements_rx) = mpsc::channel(1000);
    let mut monitor = Monitor::new(ingress_api_version, filter, announcements_tx)
        .watch(runtime.client(), config)
        .with_resync(time::Duration::from_secs(resync_interval_secs));

    tokio::spawn(
        log_announcements(announcements_rx).instrument(tracing::info_span!("announcements")),
    );

    // The reflector runs until the runtime shuts down and this sender is
    // dropped.
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    monitor
        .start(async move {
            let _ = stop_rx.await;
        })
        .await?;
    tracing::info!(version = %monitor.api_version(), "watching ingresses");

    // Block the main thread on the shutdown signal, then stop the reflector.
    let res = runtime.run().await;
    drop(stop_tx);
    if res.is_err() {
        bail!("aborted");
    }

    Ok(())
}

/// Consumes ingress announcements. Each is logged.
async fn log_announcements(mut announcements: mpsc::Receiver<Announcement>) {
    while let Some(announcement) = announcements.recv().await {
        tracing::info!(
            kind = %announcement.kind,
            namespace = %announcement.namespace,
            name = %announcement.name,
            "{}",
            announcement.resource_type
        );
    }
    tracing::debug!("announcement stream ended");
}
