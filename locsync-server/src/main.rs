//! locsync-server - localization catalog service
//!
//! Reconciles three write paths into one per-project catalog: runtime SDK
//! capture sessions, bulk language-pack imports/exports, and editorial
//! diff-apply operations.

use anyhow::Result;
use clap::Parser;
use locsync_common::config::Config;
use locsync_common::db::secrets::Secrets;
use locsync_server::{build_router, AppState, SessionWindows};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "locsync-server", about = "LocSync localization catalog service")]
struct Args {
    /// HTTP listen address (e.g. 127.0.0.1:5760)
    #[arg(long)]
    bind: Option<String>,

    /// Path to the SQLite database file
    #[arg(long)]
    database: Option<String>,

    /// Path to a TOML config file
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting LocSync server v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    let config = Config::resolve(
        args.bind.as_deref(),
        args.database.as_deref(),
        args.config.as_deref(),
    )?;
    info!("Database path: {}", config.db_path.display());

    let pool = locsync_common::db::init_database(&config.db_path).await?;
    let secrets = Secrets::load_or_init(&pool).await?;
    let windows = SessionWindows::from_config(&config);

    let state = AppState::new(pool, secrets, windows);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    info!("locsync-server listening on http://{}", config.bind);

    axum::serve(listener, app).await?;

    Ok(())
}
