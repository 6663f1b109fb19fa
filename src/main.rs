mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser, Debug)]
#[command(name = "tracker-gateway", version)]
#[command(about = "TCP gateway for GPS/health tracker devices")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Accept device connections and serve the HTTP status surface
    Serve {
        /// Path to a TOML config file (defaults to $GATEWAY_CONFIG)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Interface to bind both listeners to
        #[arg(long)]
        bind: Option<String>,
        /// Port devices connect to
        #[arg(long)]
        tcp_port: Option<u16>,
        /// Port for the HTTP status, health and test routes
        #[arg(long)]
        http_port: Option<u16>,
    },
    /// Act as a tracker device against a running gateway
    Simulate {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 8888)]
        port: u16,
        #[arg(long, default_value = "868000000000001")]
        imei: String,
        /// Frames to send after logging in
        #[arg(long, default_value_t = 10)]
        count: u32,
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
        /// Write each frame in two segments
        #[arg(long, default_value_t = false)]
        split: bool,
    },
    /// Decode a single frame and print it as JSON
    Parse {
        /// Frame text, e.g. "(123456789012345,BP00,04A6)"
        frame: String,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve {
            config,
            bind,
            tcp_port,
            http_port,
        } => commands::handle_serve(config, bind, tcp_port, http_port).await,
        Commands::Simulate {
            host,
            port,
            imei,
            count,
            interval_ms,
            split,
        } => commands::handle_simulate(host, port, imei, count, interval_ms, split).await,
        Commands::Parse { frame } => commands::handle_parse(&frame),
    }
}
