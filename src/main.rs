use std::sync::Arc;
use tracing::info;

mod api;
mod bus;
mod chat;
mod entity;
mod listing;
mod seed;
mod store;
mod wizard;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    if let Err(e) = dotenvy::dotenv() {
        // It's not fatal if .env doesn't exist, but good to know
        info!("No .env file found or failed to load: {}", e);
    }

    // Initialize logging with default filter if RUST_LOG is not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    info!("Kilamba marketplace daemon starting...");

    let bus = Arc::new(bus::EventBus::new());

    // Database lives at ~/.kilamba/kilamba.db unless KILAMBA_DB overrides it
    let db_path = match std::env::var("KILAMBA_DB") {
        Ok(path) => std::path::PathBuf::from(path),
        Err(_) => {
            let home_dir = std::env::var("HOME").unwrap_or_else(|_| ".".into());
            std::path::Path::new(&home_dir)
                .join(".kilamba")
                .join("kilamba.db")
        }
    };

    info!("Initializing store at {}", db_path.display());
    let store = store::Store::new(&db_path).await?;
    store.init().await?;
    seed::seed_if_empty(&store, &bus).await?;

    let server = api::ApiServer::new(store, bus);
    let app = server.router();

    let port: u16 = std::env::var("KILAMBA_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);
    info!("Starting API server on port {}", port);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        res = axum::serve(listener, app) => {
            if let Err(e) = res {
                info!("Server stopped with error: {}", e);
            }
        }
    }

    Ok(())
}
