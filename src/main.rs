//! Upload Storage Daemon
//!
//! Serves the upload endpoint and exposes storage administration commands.
//!
//! ## Usage
//!
//! ```bash
//! # Start the upload server with defaults
//! upload-storage
//!
//! # Start with custom config
//! upload-storage --config /path/to/config.toml
//!
//! # Start with custom HTTP port and storage directory
//! upload-storage --http-port 8096 --storage-dir /data/uploads
//!
//! # Administration
//! upload-storage ls /upload -r
//! upload-storage clear /temp --older-than 2
//! upload-storage scp ./photo.png /upload/
//! upload-storage relocate 3f2c...e1.png
//! ```
//!
//! ## HTTP API
//!
//! - `GET /health` - Health check
//! - `POST /upload` - Upload a file into the temp directory

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use upload_storage::{
    Config, HttpServer, LocalStorage, RelocationEngine, StorageAdmin, StorageCommand,
};

#[derive(Parser, Debug)]
#[command(name = "upload-storage")]
#[command(about = "Upload staging and relocation service")]
struct Args {
    /// Path to config file
    #[arg(short, long, env = "UPLOAD_STORAGE_CONFIG")]
    config: Option<PathBuf>,

    /// Storage directory
    #[arg(long, env = "UPLOAD_STORAGE_DIR")]
    storage_dir: Option<PathBuf>,

    /// HTTP API port for uploads
    #[arg(long)]
    http_port: Option<u16>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the upload server (default)
    Serve,

    #[command(flatten)]
    Storage(StorageCommand),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("upload_storage=info".parse()?),
        )
        .init();

    let args = Args::parse();

    // Load config
    let mut config = if let Some(config_path) = &args.config {
        Config::load(config_path)?
    } else {
        Config::default()
    };

    // Apply CLI overrides
    if let Some(dir) = args.storage_dir {
        config.storage_dir = dir;
    }
    if let Some(port) = args.http_port {
        config.http_port = port;
    }
    config.validate()?;

    let storage = Arc::new(LocalStorage::new(&config.storage_dir).await?);

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, storage).await,
        Command::Storage(command) => {
            let engine = RelocationEngine::from_config(storage, &config)?;
            let output = StorageAdmin::new(engine).run(command).await?;
            for line in output.lines {
                println!("{}", line);
            }
            for warning in output.warnings {
                eprintln!("{}", warning);
            }
            Ok(())
        }
    }
}

async fn serve(config: Config, storage: Arc<LocalStorage>) -> anyhow::Result<()> {
    info!(
        storage_dir = %config.storage_dir.display(),
        http_port = config.http_port,
        temp_dir = %config.temp_dir,
        upload_dir = %config.upload_dir,
        "Starting upload-storage"
    );

    // Save default config if it doesn't exist
    let config_path = config.config_path();
    if !config_path.exists() {
        config.save(&config_path)?;
        info!(path = %config_path.display(), "Created default config");
    }

    let http_addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    let http_server = Arc::new(HttpServer::from_config(storage, &config, http_addr)?);

    info!("HTTP API available at http://{}", http_addr);
    info!("Endpoints:");
    info!("  GET  /health  - Health check");
    info!("  POST /upload  - Upload a file (field '{}')", config.upload.upload_param);
    info!("Press Ctrl+C to stop.");

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutting down...");
    };

    tokio::select! {
        result = http_server.run() => {
            if let Err(e) = result {
                error!(error = %e, "HTTP server error");
                return Err(e.into());
            }
        }
        _ = shutdown => {}
    }

    Ok(())
}
