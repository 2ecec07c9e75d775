use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use taglens_executor::{create_router, AppState, ExecutorPaths};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "taglens-executor",
    version,
    about = "Runs LLM analysis tasks against a code-intelligence server"
)]
struct Cli {
    /// Path to the config file (default: config.json next to the executable)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Port to listen on, ":8080" form
    #[arg(long, default_value = ":8080")]
    port: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taglens_executor=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."));

    let paths = ExecutorPaths::beside(&exe_dir, cli.config);
    info!(config = %paths.config_file.display(), "loading configuration");
    let state = AppState::new(paths)?;

    let addr = listen_addr(&cli.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("task executor listening on http://{}", listener.local_addr()?);
    info!(
        "configuration page at http://localhost{}/config",
        cli.port
    );

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Accepts ":8080", "8080" or a full "host:port".
fn listen_addr(port: &str) -> String {
    if port.starts_with(':') {
        format!("0.0.0.0{port}")
    } else if port.contains(':') {
        port.to_string()
    } else {
        format!("0.0.0.0:{port}")
    }
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
