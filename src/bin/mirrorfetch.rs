//! mirrorfetch: command-line front end for a relay.
//!
//! Resolves keys and downloads media through the configured mirror pools,
//! sharing the penalty table with every other relay using the same file.

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use mirrorfetch::{Config, MediaHandle, Relay, ResourceId};
use tracing::info;

/// mirrorfetch CLI
#[derive(Parser)]
#[command(name = "mirrorfetch")]
#[command(version = mirrorfetch::PKG_VERSION)]
#[command(about = "Resolve ids and fetch media from redundant mirrors")]
struct Args {
    /// Config file (default: ~/.mirrorfetch/config.toml, then /etc/mirrorfetch/config.toml)
    #[arg(short, long, env = "MIRRORFETCH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve an external key to a resource id
    Resolve {
        /// External key
        key: String,
    },

    /// Download the media for a resource id
    Fetch {
        /// Resource id
        id: String,
        /// Write the body to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Resolve a key, then download its media
    Get {
        /// External key
        key: String,
        /// Write the body to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the penalty table
    Penalties,

    /// Forget all penalties
    ResetPenalties,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;
    let relay = config.builder().build()?;
    info!(version = mirrorfetch::version_string(), "relay ready");

    let found = match args.command {
        Command::Resolve { key } => match relay.resolve_id(&key).await {
            Some(id) => {
                println!("{id}");
                true
            }
            None => false,
        },

        Command::Fetch { id, output } => {
            let id = ResourceId::from(id);
            match relay.fetch_resource(&id).await {
                Some(handle) => write_media(&relay, &id, &handle, output.as_deref())?,
                None => false,
            }
        }

        Command::Get { key, output } => match relay.resolve_and_fetch(&key).await {
            Some((id, handle)) => write_media(&relay, &id, &handle, output.as_deref())?,
            None => false,
        },

        Command::Penalties => {
            let table = relay.penalties().table()?;
            println!("{}", serde_json::to_string_pretty(&table)?);
            true
        }

        Command::ResetPenalties => {
            relay.penalties().reset()?;
            println!("penalties reset");
            true
        }
    };

    relay.shutdown();

    if !found {
        eprintln!("unavailable: every mirror failed");
        process::exit(1);
    }
    Ok(())
}

/// Print or save a downloaded body. Returns false if the handle was revoked
/// before it could be read.
fn write_media(
    relay: &Relay,
    id: &ResourceId,
    handle: &MediaHandle,
    output: Option<&Path>,
) -> std::io::Result<bool> {
    let Some(bytes) = relay.media_bytes(handle) else {
        return Ok(false);
    };
    match output {
        Some(path) => {
            std::fs::write(path, &bytes)?;
            println!("{id}: {} bytes written to {}", bytes.len(), path.display());
        }
        None => println!("{id}: {} bytes ({handle})", bytes.len()),
    }
    Ok(true)
}
