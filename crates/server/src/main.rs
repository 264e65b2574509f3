//! Image archive server binary.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use imagehoard_core::{ImageStore, Ingestor, SqliteStore};
use imagehoard_server::{create_router, AppState, Fetcher};
use tracing_subscriber::EnvFilter;

/// Personal image archive, deduplicated by perceptual hash.
#[derive(Parser, Debug)]
#[command(name = "hoardd", version, about)]
struct Args {
    /// Path to the SQLite database
    #[arg(long, env = "DATABASE", default_value = "imagehoard.db")]
    database: PathBuf,

    /// Directory holding the archived image files
    #[arg(long, env = "ROOT", default_value = "images")]
    root: PathBuf,

    /// Listen address
    #[arg(long, env = "ADDR", default_value = "127.0.0.1:8080")]
    addr: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let store: Arc<dyn ImageStore> = Arc::new(
        SqliteStore::open(&args.database)
            .with_context(|| format!("opening database {}", args.database.display()))?,
    );
    let ingestor = Arc::new(
        Ingestor::new(store.clone(), args.root.clone())
            .with_context(|| format!("preparing storage root {}", args.root.display()))?,
    );
    let fetcher = Fetcher::new().context("building http client")?;

    let app = create_router(AppState::new(store, ingestor, fetcher));
    let listener = tokio::net::TcpListener::bind(&args.addr)
        .await
        .with_context(|| format!("binding {}", args.addr))?;
    tracing::info!(addr = %args.addr, root = %args.root.display(), "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
