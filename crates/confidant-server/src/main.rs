use anyhow::{Context, Result};
use clap::Parser;
use confidant_infrastructure::ConfidantPaths;
use confidant_interaction::OpenAiCompatibleClient;
use confidant_server::{AppState, router};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "confidant-server", version, about = "Confidant persona chat server")]
struct ServerArgs {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// Address to bind
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    host: String,

    /// Data directory (config, prompt, personas and their logs)
    #[arg(long, env = "CONFIDANT_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,confidant=debug"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_logging();
    let args = ServerArgs::parse();

    let root = match args.data_dir {
        Some(dir) => dir,
        None => ConfidantPaths::default_root()?,
    };
    info!(data_dir = %root.display(), "starting confidant-server");

    let completion = OpenAiCompatibleClient::try_from_env()?;
    if !completion.has_api_key() {
        warn!("SILICONFLOW_API_KEY is not set; /chat will fail until it is");
    }
    info!(endpoint = completion.endpoint(), model = completion.model(), "completion service");

    let state = AppState::new(ConfidantPaths::new(root), Arc::new(completion));
    state
        .bootstrap()
        .await
        .context("failed to prepare the data directory")?;

    let listener = TcpListener::bind((args.host.as_str(), args.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", args.host, args.port))?;
    info!("listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
