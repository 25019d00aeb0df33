use cloud_deploy_webhook::api::{self, WEBHOOK_PATH};
use cloud_deploy_webhook::config::DEFAULT_CONFIG_PATH;
use cloud_deploy_webhook::db::{self, SqliteContentStore};
use cloud_deploy_webhook::error::StartupError;
use cloud_deploy_webhook::logging::{FileLogger, TracingSink, setup_logging};
use cloud_deploy_webhook::receiver::WebhookReceiver;
use cloud_deploy_webhook::{AppState, resolve_config, seed_store};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

async fn run(config_path: &str) -> Result<(), StartupError> {
    let config = resolve_config(config_path)?;

    let file_logger = config.server.log_directory.clone().map(FileLogger::new);
    let _log_guard = setup_logging(file_logger.as_ref())?;

    info!("Using config at {:?}", config_path);
    config.warn_if_incomplete();

    let pool = db::init_db(config.server.database_path()).await?;
    let store = SqliteContentStore::new(pool);
    seed_store(&store, &config).await?;

    let receiver = WebhookReceiver::new(
        store,
        config.deployment_webhook.clone(),
        Arc::new(TracingSink),
    );
    let app = api::router(Arc::new(AppState::new(receiver)));

    let bind_address = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!("Listening on {} ({})", bind_address, WEBHOOK_PATH);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Resolves when Ctrl+C or SIGTERM is received
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let config_path =
        std::env::var("WEBHOOK_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    if let Err(e) = run(&config_path).await {
        eprintln!("Startup error: {}", e);
        std::process::exit(1);
    }
}
