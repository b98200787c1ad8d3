//! raw-websocket server binary.
//!
//! Listens on `0.0.0.0:1337` by default, saves every received message under
//! `./uploads`, and runs until Ctrl+C.

// ============================================================================
// Imports
// ============================================================================

use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use raw_websocket::{Result, Server, ServerOptions};

// ============================================================================
// Types
// ============================================================================

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "raw-websocket", version, about = "RFC 6455 WebSocket server over raw TCP")]
struct Args {
    /// Port to listen on.
    #[arg(short, long, env = "RAW_WEBSOCKET_PORT")]
    port: Option<u16>,

    /// Address to bind.
    #[arg(short, long)]
    bind: Option<IpAddr>,

    /// Directory for received messages.
    #[arg(short, long)]
    uploads_dir: Option<PathBuf>,

    /// Path to a JSON options file; flags override its values.
    #[arg(short, long, env = "RAW_WEBSOCKET_CONFIG")]
    config: Option<PathBuf>,

    /// Do not send frame diagrams back to clients.
    #[arg(long)]
    no_visualize: bool,

    /// Do not answer client pings.
    #[arg(long)]
    no_ping_reply: bool,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

impl Args {
    /// Merges the options file (if any) with command-line overrides.
    fn options(&self) -> Result<ServerOptions> {
        let mut options = match &self.config {
            Some(path) => ServerOptions::from_json_file(path)?,
            None => ServerOptions::default(),
        };

        if let Some(port) = self.port {
            options.port = port;
        }
        if let Some(bind) = self.bind {
            options.bind = bind;
        }
        if let Some(dir) = &self.uploads_dir {
            options.uploads_dir.clone_from(dir);
        }
        if self.no_visualize {
            options.visualize_frames = false;
        }
        if self.no_ping_reply {
            options.reply_to_ping = false;
        }

        Ok(options)
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let options = args.options()?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        uploads = %options.uploads_dir.display(),
        "Starting raw-websocket"
    );

    let server = Server::builder().options(options).build().await?;

    tokio::select! {
        result = server.run() => result,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            server.shutdown().await;
            Ok(())
        }
    }
}
