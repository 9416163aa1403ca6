//! # Kubetruth Controller
//!
//! Projects CloudTruth projects and parameters into Kubernetes `ConfigMap`
//! and `Secret` resources, driven by one or more `ProjectMapping` custom
//! resources.
//!
//! ## Overview
//!
//! 1. **Reads `ProjectMapping` CRDs** — exactly one `root` spec plus any
//!    number of per-project `override` specs.
//! 2. **Fetches projects and parameters** from CloudTruth, including their
//!    parent/child hierarchy.
//! 3. **Renders Liquid templates** into `ConfigMap`/`Secret` manifests.
//! 4. **Applies them via server-side apply**, skipping the API call
//!    entirely when nothing has changed.
//! 5. **Polls on an interval**, woken early whenever a `ProjectMapping`
//!    changes in the cluster.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use kubetruth_controller::cli::Settings;
use kubetruth_controller::gateway::KubeGateway;
use kubetruth_controller::observability::{logging, metrics};
use kubetruth_controller::poll::PollLoop;
use kubetruth_controller::reconcile::ReconcileEngine;
use kubetruth_controller::server::{start_server, ServerState};
use kubetruth_controller::source::CloudTruthSource;
use kubetruth_controller::template::LiquidRenderer;

#[tokio::main]
async fn main() -> Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("failed to install rustls crypto provider");

    let settings = Settings::parse();

    logging::init_tracing(settings.log_format);

    info!(
        namespace = %settings.namespace,
        poll_interval_secs = settings.poll_interval_secs,
        dry_run = settings.dry_run,
        "starting kubetruth-controller"
    );

    metrics::register_metrics().context("failed to register metrics")?;

    let server_state = ServerState::new();
    let server_bound = Arc::new(AtomicBool::new(false));
    let server_state_for_task = server_state.clone();
    let server_bound_for_task = server_bound.clone();
    let server_port = settings.server_port;

    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_for_task, server_bound_for_task).await {
            error!(error = %e, "HTTP server error");
        }
    });

    wait_for_server_bound(&server_bound, &server_handle).await?;

    let api_key = settings
        .cloudtruth_api_key
        .clone()
        .context("CLOUDTRUTH_API_KEY must be set")?;

    let source = Arc::new(CloudTruthSource::new(api_key));

    let client = kube::Client::try_default()
        .await
        .context("failed to create Kubernetes client; is KUBECONFIG set?")?;
    let gateway = Arc::new(KubeGateway::new(client, settings.namespace.clone()));
    let renderer = Arc::new(LiquidRenderer);

    let engine = Arc::new(
        ReconcileEngine::new(source, gateway.clone(), renderer).with_dry_run(settings.dry_run),
    );

    let poll_loop = PollLoop::new(settings.poll_interval_secs, gateway);
    poll_loop
        .run(move || {
            let engine = engine.clone();
            let server_state = server_state.clone();
            async move {
                let start = std::time::Instant::now();
                metrics::increment_ticks_total();

                match engine.run().await {
                    Ok(report) => {
                        for outcome in &report.projects {
                            metrics::increment_projects_reconciled();
                            info!(project = %outcome.project, "reconciled project");
                        }
                        for (project, err) in &report.errors {
                            metrics::increment_reconcile_errors(err.kind());
                            warn!(project = %project, error = %err, "project reconciliation failed");
                        }
                        server_state.mark_ready();
                    }
                    Err(e) => {
                        metrics::increment_reconcile_errors(e.kind());
                        error!(error = %e, "reconciliation tick failed");
                    }
                }

                metrics::observe_tick_duration(start.elapsed().as_secs_f64());
            }
        })
        .await;

    Ok(())
}

async fn wait_for_server_bound(
    bound: &Arc<AtomicBool>,
    server_handle: &tokio::task::JoinHandle<()>,
) -> Result<()> {
    let timeout = Duration::from_secs(kubetruth_controller::constants::DEFAULT_SERVER_STARTUP_TIMEOUT_SECS);
    let poll_interval = Duration::from_millis(kubetruth_controller::constants::DEFAULT_SERVER_POLL_INTERVAL_MS);
    let start = std::time::Instant::now();

    loop {
        if server_handle.is_finished() {
            anyhow::bail!("HTTP server failed to start");
        }
        if bound.load(Ordering::Relaxed) {
            info!("HTTP server bound and accepting connections");
            return Ok(());
        }
        if start.elapsed() > timeout {
            anyhow::bail!("HTTP server failed to bind within {}s", timeout.as_secs());
        }
        tokio::time::sleep(poll_interval).await;
    }
}
