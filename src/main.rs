use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use dora_metrics::config::{self, AppConfig, PersistenceMode};
use dora_metrics::error::DoraError;
use dora_metrics::github::GitHubClient;
use dora_metrics::{create_app, fetcher, AppState};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "dora-metrics")]
#[command(version, about = "Deployment frequency and lead time for changes from GitHub Actions")]
struct Cli {
    /// Log output format
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute metrics once and write the snapshot
    Collect {
        /// Output file (overrides DORA_OUTPUT_PATH)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Persistence mode (overrides DORA_PERSISTENCE_MODE)
        #[arg(long, value_enum)]
        mode: Option<PersistenceMode>,
    },

    /// Serve collected metrics and the dashboard over HTTP
    Serve {
        /// Port to listen on (overrides PORT)
        #[arg(long)]
        port: Option<u16>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = exit_code(&e);
            tracing::error!(exit_code = code, "{:#}", e);
            eprintln!("error: {e:#}");
            ExitCode::from(code)
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "dora_metrics=info,tower_http=info".into());
    // stdout is reserved for the snapshot JSON.
    let layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(layer.json())
            .init(),
        LogFormat::Text => tracing_subscriber::registry().with(filter).with(layer).init(),
    }
}

async fn run(command: Commands) -> anyhow::Result<()> {
    let mut config = AppConfig::from_env().map_err(DoraError::from)?;

    match command {
        Commands::Collect { output, mode } => {
            if let Some(output) = output {
                config.output_path = output;
            }
            if let Some(mode) = mode {
                config.persistence_mode = mode;
            }
            collect(config).await
        }
        Commands::Serve { port } => serve(config, port).await,
    }
}

async fn collect(config: AppConfig) -> anyhow::Result<()> {
    // Checked before any network call.
    let token = config::token_from_env().ok_or(DoraError::MissingToken)?;
    let client = GitHubClient::new(token, &config)?;

    tracing::info!(repo = %config.repository, branch = %config.branch, "Collecting DORA metrics");
    let snapshot = fetcher::collect_and_persist(&client, &config)
        .await
        .with_context(|| format!("Failed to calculate DORA metrics for {}", config.repository))?;

    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

async fn serve(config: AppConfig, port: Option<u16>) -> anyhow::Result<()> {
    let port = match port {
        Some(port) => port,
        None => {
            let port_str = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
            port_str
                .parse::<u16>()
                .with_context(|| format!("Invalid PORT value '{port_str}'"))?
        }
    };

    if let Some(interval) = config.refresh_interval() {
        match config::token_from_env() {
            Some(token) => {
                let client = GitHubClient::new(token, &config)?;
                fetcher::start_background_refresh(client, config.clone(), interval);
            }
            None => tracing::warn!(
                "Refresh interval set but no GitHub token found; serving existing metrics only"
            ),
        }
    }

    let app = create_app(Arc::new(AppState::new(config)));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

/// Maps a failure to the process exit code of its class; unclassified errors are runtime
/// failures.
fn exit_code(e: &anyhow::Error) -> u8 {
    e.chain()
        .find_map(|cause| cause.downcast_ref::<DoraError>())
        .map(DoraError::exit_code)
        .unwrap_or(20)
}

async fn shutdown_signal() {
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("signal received, starting graceful shutdown");
}
