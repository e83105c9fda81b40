mod bot;
mod config;
mod inject;
mod ipc;
mod language;
mod process_monitor;
mod supervisor;
mod utils;

use std::sync::Arc;
use tokio::sync::RwLock;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    tracing::info!("bothive core daemon starting");

    let cfg = config::GlobalConfig::load().unwrap_or_default();

    let (mut sup, mut event_rx) = supervisor::Supervisor::new(cfg.bots_file(), cfg.working_dir());
    sup.initialize()?;
    let supervisor = Arc::new(RwLock::new(sup));

    // Lifecycle event loop — the single place where process exit/error
    // notifications are applied to the registry and the store.
    let supervisor_events = supervisor.clone();
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let mut sup = supervisor_events.write().await;
            sup.handle_event(event);
        }
    });

    // Periodic reconciliation: correct persisted running state against
    // actual process liveness.
    let supervisor_reconcile = supervisor.clone();
    let interval = cfg.reconcile_interval_secs();
    tokio::spawn(async move {
        let mut error_count: u32 = 0;
        loop {
            tokio::time::sleep(tokio::time::Duration::from_secs(interval)).await;

            let mut sup = supervisor_reconcile.write().await;
            match sup.reconcile().await {
                Ok(()) => {
                    if error_count > 0 {
                        tracing::info!("Reconciler recovered after {} errors", error_count);
                    }
                    error_count = 0;
                }
                Err(e) => {
                    error_count += 1;
                    if error_count <= 3 || error_count % 10 == 0 {
                        tracing::error!("Reconcile error (count: {}): {}", error_count, e);
                    }
                }
            }
        }
    });

    // Graceful shutdown: terminate registered bot processes on Ctrl+C.
    let supervisor_shutdown = supervisor.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Shutdown signal received, cleaning up...");
        let sup = supervisor_shutdown.read().await;
        sup.shutdown_all();
        tracing::info!("Cleanup complete, exiting");
        std::process::exit(0);
    });

    let ipc_server = ipc::IpcServer::new(supervisor.clone(), &cfg.listen_addr());
    if let Err(e) = ipc_server.start().await {
        tracing::error!("IPC server error: {}", e);
    }

    tracing::info!("bothive core daemon shutting down");
    Ok(())
}
