use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::{mpsc, watch};
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use ledger_service::api::http_routes::{self, AppState, ApiDoc};
use ledger_service::config::Config;
use ledger_service::infrastructure::gateways::http_bank_client::HttpBankClient;
use ledger_service::infrastructure::persistence::store::PgStore;
use ledger_service::jobs::{dispatcher::Dispatcher, executor};
use ledger_service::use_cases::deposit::DepositService;
use ledger_service::use_cases::withdrawal::WithdrawalService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("failed to connect to the database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run database migrations")?;

    let store = Arc::new(PgStore::new(pool));
    let bank = Arc::new(HttpBankClient::new(
        config.bank_base_url.clone(),
        config.bank_timeout,
    )?);

    let deposit_service = Arc::new(DepositService::new(store.clone()));
    let withdrawal_service = Arc::new(WithdrawalService::new(store.clone(), bank));

    let (queue_tx, queue_rx) = mpsc::channel(1024);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let dispatcher = Arc::new(Dispatcher::new(
        store.clone(),
        config.withdrawal_max_retries,
        queue_tx.clone(),
    ));

    let due_loop = {
        let dispatcher = dispatcher.clone();
        let interval = config.due_scan_interval;
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move { dispatcher.run_due_loop(interval, shutdown_rx).await })
    };
    let retry_loop = {
        let dispatcher = dispatcher.clone();
        let interval = config.retry_scan_interval;
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move { dispatcher.run_retry_loop(interval, shutdown_rx).await })
    };

    let worker_handles = executor::spawn(config.executor_workers, queue_rx, withdrawal_service.clone());

    let state = AppState {
        store: store.clone(),
        deposit_service,
        withdrawal_service,
        withdrawal_max_retries: config.withdrawal_max_retries,
    };

    let app = http_routes::router(state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port))
        .await
        .context("failed to bind http listener")?;

    info!(host = %config.host, port = config.port, "ledger_service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server error")?;

    info!("shutting down, draining in-flight withdrawals");
    let _ = shutdown_tx.send(true);
    drop(queue_tx);

    due_loop.await.ok();
    retry_loop.await.ok();
    drop(dispatcher);
    for handle in worker_handles {
        handle.await.ok();
    }

    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
