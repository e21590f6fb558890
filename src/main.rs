use clap::Parser;
use std::error::Error as StdError;
use tracing_subscriber::EnvFilter;
use usher::Args;

#[tokio::main]
async fn main() -> Result<(), Box<dyn StdError>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    tracing::info!(
        "Starting DHCP responder on interface '{}', port {}",
        args.interface,
        args.port
    );

    if let Err(e) = usher::create_server(&args.interface, args.port).await {
        tracing::error!("DHCP responder stopped: {}", e);
        return Err(e.into());
    }

    Ok(())
}
