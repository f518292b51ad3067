//! Kiosk Server
//!
//! Serves the document store the kiosk agents write check-ins into.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use kiosk_server::routes::{AppState, build_router};
use kiosk_server::storage::DocumentDatabase;

#[derive(Parser, Debug)]
#[command(name = "kiosk-server")]
#[command(version, about = "Kiosk document store")]
struct Args {
    /// Listen address
    #[arg(long, env = "KIOSK_SERVER_ADDR")]
    addr: Option<SocketAddr>,

    /// Database file path
    #[arg(long, env = "KIOSK_SERVER_DB")]
    db_path: Option<PathBuf>,

    /// Collection that the check-in endpoint writes into
    #[arg(long, env = "KIOSK_COLLECTION")]
    checkin_collection: Option<String>,

    /// Log level filter for the server (e.g. "info", "debug", "warn").
    #[arg(long, env = "KIOSK_LOG_LEVEL")]
    log_level: Option<String>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "KIOSK_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let cwd = std::env::current_dir().ok();
    let mut config = kiosk_core::config::load_config(cwd.as_deref())?.server;
    if let Some(addr) = args.addr {
        config.addr = addr;
    }
    if let Some(path) = args.db_path {
        config.database_path = Some(path);
    }
    if let Some(collection) = args.checkin_collection {
        config.checkin_collection = collection;
    }
    if let Some(level) = args.log_level {
        config.log_level = level;
    }

    let log_filter = format!("kiosk_server={}", config.log_level);
    kiosk_core::tracing_init::init_tracing(&log_filter, args.log_json);

    let db_path = config
        .database_path
        .clone()
        .or_else(|| kiosk_core::config::default_data_dir().map(|d| d.join("store.db")))
        .unwrap_or_else(|| PathBuf::from("kiosk-store.db"));

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.addr,
        db = %db_path.display(),
        "Starting kiosk-server"
    );

    let db = DocumentDatabase::open(&db_path).await?;
    let app = build_router(AppState {
        db,
        checkin_collection: config.checkin_collection.clone(),
    });

    let listener = tokio::net::TcpListener::bind(config.addr).await?;

    #[cfg(unix)]
    sd_notify::notify(false, &[sd_notify::NotifyState::Ready])?;

    info!(addr = %config.addr, "Document store ready");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C shutdown signal");
        }
        () = sigterm => {
            info!("Received SIGTERM shutdown signal");
        }
    }
}
