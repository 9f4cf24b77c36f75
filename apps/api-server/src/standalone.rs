use crate::{
    ai::AIHandler,
    config::Config,
    routes::{get_routes, AppState},
};

pub async fn start_server() -> anyhow::Result<()> {
    // reads .env first, so RUST_LOG and the model settings below can come from it
    analytics_tracing::init_tracing();

    let config = Config::from_env()?;
    tracing::debug!("config: {:?}", config);

    // load weights before accepting requests, a broken model setup should not bind the port
    let ai_handler = AIHandler::new(&config.models)?;
    tracing::info!("loading models from {}", config.models.resources_dir.display());
    ai_handler.ready().await?;

    let app = get_routes(AppState::new(ai_handler), config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(config.api_server_addr).await?;
    tracing::info!("Listening on http://{}", config.api_server_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

pub(crate) async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
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
                tracing::error!("failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Ctrl-C received, shut down...");
        },
        _ = terminate => {
            tracing::info!("Terminate signal received, shut down...");
        },
    }
}
