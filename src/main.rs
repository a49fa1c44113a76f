use std::{sync::Arc, time::Duration};

use anyhow::Context;
use tokio::{signal, sync::mpsc};
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use dukapos_api as api;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config().context("failed to load configuration")?;
    api::config::init_tracing(&cfg.log_level, cfg.log_json);

    let db_pool = api::db::establish_connection_from_app_config(&cfg)
        .await
        .context("failed to connect to database")?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("failed running migrations: {}", e);
            e
        })?;
    }
    let db = Arc::new(db_pool);

    let (event_tx, event_rx) = mpsc::channel(1024);
    let event_sender = api::events::EventSender::new(event_tx);
    tokio::spawn(api::events::process_events(event_rx));

    let services = api::handlers::AppServices::new(db.clone(), Arc::new(event_sender.clone()), &cfg);

    // Overdue-credit sweep. Reads a date, flips statuses, nothing else;
    // safe to run on a plain timer alongside request traffic.
    {
        let credit = services.credit.clone();
        let interval = Duration::from_secs(cfg.overdue_sweep_interval_secs.max(60));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match credit.update_overdue_accounts().await {
                    Ok(0) => {}
                    Ok(count) => info!(count, "overdue sweep transitioned accounts"),
                    Err(e) => warn!(error = %e, "overdue sweep failed"),
                }
            }
        });
    }

    let state = api::AppState {
        db,
        config: cfg.clone(),
        event_sender,
        services,
    };

    let app = api::app_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(Duration::from_secs(30)));

    let addr = cfg.server_addr();
    info!(%addr, "starting server");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install terminate handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c, shutting down"),
        _ = terminate => info!("received terminate, shutting down"),
    }
}
