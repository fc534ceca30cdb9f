mod api;
mod scheduler;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use venue_tasks::{ranking_channel, run_ranking_worker, TaskContext};

use crate::api::{build_app, AppState};

/// Pending ranking events beyond this are dropped; one recompute serves them.
const RANKING_QUEUE_CAPACITY: usize = 32;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = venue_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = venue_db::PoolConfig::from_app_config(&config);
    let pool = venue_db::connect_pool(&config.database_url, pool_config).await?;
    venue_db::run_migrations(&pool).await?;

    let (ranking_tx, ranking_rx) = ranking_channel(RANKING_QUEUE_CAPACITY);
    let ranking_worker = tokio::spawn(run_ranking_worker(
        pool.clone(),
        config.tokens_available,
        ranking_rx,
    ));

    let bind_addr = config.bind_addr;
    let ctx = TaskContext::new(pool.clone(), config)?.with_ranking_events(ranking_tx);
    let mut scheduler = scheduler::build_scheduler(Arc::new(ctx)).await?;

    let app = build_app(AppState { pool });
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(%bind_addr, "venue worker listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown().await?;
    // The scheduler's jobs keep a sender alive, so the worker never sees the
    // channel close on its own.
    ranking_worker.abort();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
