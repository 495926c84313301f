//! Berth bus broker - publishes installed applications as remote objects.
//!
//! Starts the bus server with an in-memory application store and prints the
//! bound port on stdout for embedding hosts to read.

use anyhow::Result;
use berth_core::MemoryStore;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "berth-bus")]
#[command(about = "Object bus broker for installed applications")]
struct Args {
    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value = "0")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("starting berth bus broker");

    let store = MemoryStore::new();
    let mut broker = berth_bus::start_broker(store, &args.host, args.port).await?;

    // Intentional stdout handshake: hosts read the bound port from here.
    println!("BUS_PORT={}", broker.addr().port());

    info!("broker running on {}", broker.addr());

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, exiting");
    broker.shutdown();

    Ok(())
}
