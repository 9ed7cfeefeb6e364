use std::{net::SocketAddr, path::PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use tryon_studio::{
    client::HttpTryOnClient,
    workflow::{ModalState, TryOnModal, UserPhoto, DOWNLOAD_FILE_NAME},
    router, AppConfig, AppState,
};

#[derive(Parser)]
#[command(name = "tryon-studio", about = "Virtual try-on proxy service")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service (default)
    Serve {
        /// Overrides PORT
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run one try-on against a running service and save the result
    TryOn {
        #[arg(long)]
        photo: PathBuf,
        #[arg(long)]
        product_url: String,
        #[arg(long, default_value = DOWNLOAD_FILE_NAME)]
        out: PathBuf,
        #[arg(long, env = "TRYON_API_URL", default_value = "http://localhost:8080")]
        api: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    // Init tracing
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    fmt().with_env_filter(filter).init();

    match cli.command.unwrap_or(Commands::Serve { port: None }) {
        Commands::Serve { port } => serve(port).await,
        Commands::TryOn { photo, product_url, out, api } => try_on(photo, product_url, out, api).await,
    }
}

async fn serve(port: Option<u16>) -> Result<()> {
    let mut config = AppConfig::from_env();
    if let Some(port) = port {
        config.port = port;
    }
    tracing::info!("Try-on backend: {}", config.try_on_endpoint());
    if config.allowed_image_hosts.is_empty() {
        tracing::warn!("PROXY_ALLOWED_HOSTS is empty, the image proxy will fetch any host");
    }

    let state = AppState::from_config(&config).context("building HTTP clients")?;
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

async fn try_on(photo: PathBuf, product_url: String, out: PathBuf, api: String) -> Result<()> {
    let client = HttpTryOnClient::new(api);
    let mut modal = TryOnModal::new(product_url);

    let photo = UserPhoto::load(&photo).await.with_context(|| format!("reading {}", photo.display()))?;
    modal.select_photo(photo);

    if modal.generate(&client).await != ModalState::Result {
        bail!("{}", modal.error_message().unwrap_or_else(|| "try-on did not produce an image".into()));
    }
    let Some(result) = modal.result() else {
        bail!("try-on did not produce an image");
    };
    result.save(&out).await.with_context(|| format!("writing {}", out.display()))?;
    tracing::info!("✅ Saved try-on to {}", out.display());
    Ok(())
}
