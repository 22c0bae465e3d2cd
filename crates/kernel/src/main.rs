//! Sift search server
//!
//! Serves configuration-driven search over PostgreSQL tables.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use sift_kernel::config::Config;
use sift_kernel::registry;
use sift_kernel::routes;
use sift_kernel::state::AppState;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Validate the tables file and exit.
    #[arg(long)]
    check_config: bool,

    /// Tables file; overrides TABLES_CONFIG.
    #[arg(long)]
    tables: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing();

    let args = Args::parse();

    if args.check_config {
        let path = args
            .tables
            .or_else(|| std::env::var("TABLES_CONFIG").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("./tables.yml"));
        return check_config(&path);
    }

    info!("Starting sift search server");

    let mut config = Config::from_env().context("failed to load configuration")?;
    if let Some(tables) = args.tables {
        config.tables_config = tables;
    }
    info!(
        port = config.port,
        tables_config = %config.tables_config.display(),
        "Configuration loaded"
    );

    let state = AppState::new(&config)
        .await
        .context("failed to initialize application state")?;
    info!(
        tables = ?state.registry().names().collect::<Vec<_>>(),
        "Search engines ready"
    );

    let app = routes::app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind address")?;
    info!(%addr, "Server listening");

    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}

/// Validate every table in `path`, reporting all problems at once.
fn check_config(path: &std::path::Path) -> Result<()> {
    let tables = registry::load_tables(path)?;
    let problems = registry::check_tables(&tables);
    if problems.is_empty() {
        info!(tables = tables.len(), path = %path.display(), "tables file is valid");
        return Ok(());
    }
    for problem in &problems {
        tracing::error!(%problem, "invalid table config");
    }
    bail!("{} problem(s) in {}", problems.len(), path.display())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug,sqlx=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
