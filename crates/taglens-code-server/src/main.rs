use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use taglens_code_server::{create_router, AppState, BinaryCache, CodeAnalyzer};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "taglens-code-server",
    version,
    about = "Serves symbol definitions and caller bodies from a .tsj tag index"
)]
struct Cli {
    /// Repository root containing the .tsj index directory
    #[arg(long = "code-dir", default_value = ".")]
    code_dir: PathBuf,

    /// Listen address as host:port; port 0 asks the kernel for a free port
    #[arg(long, default_value = "0.0.0.0:0")]
    listen: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taglens_code_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    ensure_tag_index(&cli.code_dir)?;

    let cache = BinaryCache::materialize().context("extracting indexer binaries")?;
    let analyzer = CodeAnalyzer::new(&cli.code_dir, cache.dir())?;
    info!(code_dir = %analyzer.code_dir().display(), "serving tag index");

    let router = create_router(AppState::new(analyzer));
    let listener = tokio::net::TcpListener::bind(&cli.listen)
        .await
        .with_context(|| format!("binding {}", cli.listen))?;
    info!("listening on http://{}", listener.local_addr()?);
    info!("  POST /api/get_symbol - resolve a symbol definition");
    info!("  POST /api/find_refs  - enumerate caller bodies");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Dropping the cache here removes the extracted binaries.
    drop(cache);
    Ok(())
}

fn ensure_tag_index(code_dir: &Path) -> Result<()> {
    let tsj = code_dir.join(".tsj");
    if !tsj.is_dir() {
        bail!(
            ".tsj directory not found under {}; run gtags/ctags first",
            code_dir.display()
        );
    }
    for name in ["tags", "GPATH", "GTAGS", "GRTAGS"] {
        if !tsj.join(name).is_file() {
            bail!(
                ".tsj/{name} missing under {}; regenerate the tag index",
                code_dir.display()
            );
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }
}
