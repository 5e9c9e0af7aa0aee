//! rstdt-cli - Command-line interface for rstdt
//!
//! Sends searches and raw headers to a server, and decodes response bodies offline.

mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use rstdt_client::{Client, ConnectionConfig};
use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rstdt-cli")]
#[command(about = "Command-line interface for the rstdt search server")]
#[command(version)]
struct Cli {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:9999", env = "RSTDT_SERVER")]
    server: SocketAddr,

    /// Connect timeout in seconds
    #[arg(long, default_value = "10")]
    connect_timeout: u64,

    /// Request timeout in seconds
    #[arg(long, default_value = "30")]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Search a resource for records within a price range
    Search {
        /// Resource id (0-7)
        #[arg(short, long, default_value = "0")]
        resource: u8,

        /// Minimum price (inclusive)
        #[arg(long, default_value = "0")]
        min: u16,

        /// Maximum price (inclusive)
        #[arg(long, default_value = "65535")]
        max: u16,

        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Send a header with an arbitrary opcode and print the raw response body
    Raw {
        /// Opcode (0-7)
        #[arg(short, long)]
        opcode: u8,

        /// Resource id (0-7)
        #[arg(short, long, default_value = "0")]
        resource: u8,
    },

    /// Decode a hex-encoded response body without contacting a server
    Decode {
        /// Hex bytes, e.g. 007f00a6
        hex: String,

        /// Input starts with the 2-byte length prefix
        #[arg(long)]
        framed: bool,
    },

    /// Print the quantization lookup tables
    Tables,
}

impl Commands {
    /// Returns whether the command talks to a server.
    pub fn needs_server(&self) -> bool {
        matches!(self, Commands::Search { .. } | Commands::Raw { .. })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    // Offline commands need no server connection
    let client = if cli.command.needs_server() {
        let config = ConnectionConfig::new(cli.server)
            .with_connect_timeout(Duration::from_secs(cli.connect_timeout))
            .with_request_timeout(Duration::from_secs(cli.timeout));
        let client = Client::new(config);

        tracing::debug!("Connecting to {}", cli.server);
        client.connect().await.map_err(|e| {
            eprintln!("{}: {}", "Connection failed".red(), e);
            e
        })?;
        Some(client)
    } else {
        None
    };

    let result = commands::execute(client.as_ref(), cli.command).await;

    match result {
        Ok(output) => {
            println!("{}", output);
        }
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    }

    if let Some(client) = client {
        client.close().await?;
    }
    Ok(())
}
