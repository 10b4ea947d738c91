//! Example cadflow daemon.
//!
//! Reads line-delimited JSON commands from stdin and drives batches through the pipeline:
//!
//! ```text
//! {"op":"start","batchId":"b-1","sourceFileRef":"s3://bucket/part.step"}
//! {"op":"complete","batchId":"b-1","stage":"readerRunning","outputRefs":["parsed.json"]}
//! {"op":"fail","batchId":"b-1","reason":"operator abort"}
//! ```
//!
//! Usage: `cadflowd [config.json]`. Jobs go to an in-memory cluster unless built with `--features kube`.

mod command;
mod config;
mod shutdown;

use std::{path::PathBuf, sync::Arc, time::Duration};

use taskvisor::{Supervisor, SupervisorConfig};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use cadflow_core::{
    BatchOrchestrator, ChannelBroadcaster, ClusterClient, FanoutBroadcaster, InMemoryStore,
    OrchestratorContext, TimeoutSweeper,
};
use cadflow_observe::{LogBroadcaster, logger_init};
use cadflow_prometheus::{Encoder, PrometheusMetrics, TextEncoder};

use crate::{command::Command, config::CadflowConfig, shutdown::install_shutdown_handler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1) Config + logger
    let path = std::env::args_os().nth(1).map(PathBuf::from);
    let cfg = CadflowConfig::load(path.as_deref())?;
    logger_init(&cfg.logger)?;
    info!(config = ?path, "logger initialized");

    // 2) Adapters
    let metrics = Arc::new(PrometheusMetrics::new()?);
    let channel = ChannelBroadcaster::new(256);
    let mut actions = channel.subscribe();
    let broadcaster = FanoutBroadcaster::new()
        .with(Arc::new(LogBroadcaster))
        .with(Arc::new(channel));

    let ctx = OrchestratorContext::new(Arc::new(InMemoryStore::new()), cluster().await?)
        .with_broadcaster(Arc::new(broadcaster))
        .with_metrics(metrics.clone());
    let orch = Arc::new(BatchOrchestrator::from_context(&ctx, &cfg.core));
    info!(namespace = %cfg.core.jobs.namespace, "orchestrator ready");

    // 3) Sweeper
    let shutdown = install_shutdown_handler();
    let sweeper = Arc::new(TimeoutSweeper::new(
        Arc::clone(&orch),
        ctx.metrics.clone(),
        cfg.core.sweeper,
    ));
    let supervisor = Supervisor::builder(SupervisorConfig::default()).build();
    let sweeper_spec = sweeper.task_spec();
    let sweeper_name = sweeper_spec.name().to_string();
    let runner = {
        let supervisor = Arc::clone(&supervisor);
        tokio::spawn(async move { supervisor.run(vec![sweeper_spec]).await })
    };

    // 4) Command loop
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    info!("reading commands from stdin; press Ctrl+C to stop");
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => match line? {
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => handle_line(&orch, &line).await,
                None => {
                    info!("stdin closed");
                    break;
                }
            },
            action = actions.recv() => {
                if let Ok(action) = action {
                    println!("{}", serde_json::to_string(&action)?);
                }
            }
        }
    }

    // 5) Drain
    shutdown.cancel();
    if let Err(e) = supervisor.cancel(&sweeper_name).await {
        warn!(error = %e, task = %sweeper_name, "failed to cancel sweeper");
    }
    match tokio::time::timeout(Duration::from_secs(5), runner).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => warn!(error = %e, "supervisor stopped with error"),
        Ok(Err(e)) => warn!(error = %e, "supervisor task ended abnormally"),
        Err(_) => warn!("supervisor did not stop in time"),
    }
    let mut buf = Vec::new();
    TextEncoder::new().encode(&metrics.gather(), &mut buf)?;
    info!(metrics = %String::from_utf8_lossy(&buf), "shutting down");

    Ok(())
}

async fn handle_line(orch: &BatchOrchestrator, line: &str) {
    let command = match Command::parse(line) {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "malformed command");
            return;
        }
    };
    match command.apply(orch).await {
        Ok(outcome) => info!(?outcome, "command applied"),
        Err(e) => warn!(error = %e, kind = %e.kind(), "command rejected"),
    }
}

#[cfg(feature = "kube")]
async fn cluster() -> anyhow::Result<Arc<dyn ClusterClient>> {
    let client = cadflow_kube::KubeClusterClient::try_default().await?;
    info!("using kubernetes cluster from ambient configuration");
    Ok(Arc::new(client))
}

#[cfg(not(feature = "kube"))]
async fn cluster() -> anyhow::Result<Arc<dyn ClusterClient>> {
    info!("using in-memory cluster");
    Ok(Arc::new(cadflow_core::InMemoryCluster::new()))
}
