use chainforge_server::{api::app_router, build_state, config::Config, init_tracing, scheduler};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing();
    let state = build_state(&config).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = scheduler::start_period_sweep_scheduler(state.clone(), shutdown_rx);

    let router = app_router(state, &config);
    tracing::info!("Listening on {}", config.listen_addr);
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await?;

    if let Err(e) = sweeper.await {
        tracing::warn!("Period sweep scheduler ended abnormally: {}", e);
    }
    Ok(())
}

/// Resolves on Ctrl-C and tells the scheduler to stop.
async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, draining");
    let _ = shutdown_tx.send(true);
}
