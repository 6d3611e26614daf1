use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{error, info, warn};

use atelier_inventory as inventory;
use inventory::events::{EventHandler, EventSender, LoggingEventHandler};
use inventory::InventoryServices;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = inventory::config::load_config().context("failed to load configuration")?;
    inventory::config::init_tracing(cfg.log_level(), cfg.log_json);

    let db_pool = inventory::db::establish_connection_from_app_config(&cfg)
        .await
        .context("failed to connect to database")?;
    if cfg.auto_migrate {
        inventory::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }

    let registry = prometheus::Registry::new();
    inventory::metrics::register(&registry).context("failed to register metrics")?;

    let (event_sender, event_rx) = EventSender::channel(cfg.event_channel_capacity);
    let handlers: Vec<Arc<dyn EventHandler>> = vec![Arc::new(LoggingEventHandler)];
    let event_task = tokio::spawn(inventory::events::process_events(event_rx, handlers));

    let services = InventoryServices::new(
        Arc::new(db_pool),
        Arc::new(event_sender),
        cfg.inventory_settings(),
    );

    let interval = cfg.reservation_sweep_interval();
    info!(
        environment = %cfg.environment,
        sweep_interval_secs = interval.as_secs(),
        "inventory worker started"
    );

    let mut ticker = tokio::time::interval(interval);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match services.reservations.cleanup_expired().await {
                    Ok(result) if result.released_count > 0 || result.failed_count > 0 => {
                        info!(
                            released = result.released_count,
                            failed = result.failed_count,
                            "expired reservations swept"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "reservation sweep failed"),
                }
            }
            _ = &mut shutdown => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    // Dropping the services closes the event channel so the processor drains and exits.
    drop(services);
    if let Err(e) = event_task.await {
        error!("event processor terminated abnormally: {}", e);
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
