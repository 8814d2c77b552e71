use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use venuebridge::adapter::inbound::cli::command::{Cli, Commands};
use venuebridge::adapter::inbound::cli::output::{self, OutputConfig};
use venuebridge::adapter::inbound::cli::{market, trade, venues, watch};
use venuebridge::adapter::outbound::memory::MemoryOrderStore;
use venuebridge::adapter::outbound::shared::ConnectorOptions;
use venuebridge::application::{ExchangeManagementService, VenueConnectorFactory};
use venuebridge::infrastructure::config::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let _ = rustls::crypto::ring::default_provider().install_default();
    let cli = Cli::parse();
    output::configure(OutputConfig::new(cli.json, cli.quiet));

    let settings = Settings::load(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;
    settings.init_logging();
    info!(version = env!("CARGO_PKG_VERSION"), "venuebridge starting");

    let options = ConnectorOptions::new(settings.http.clone(), settings.stream.clone());
    let service = ExchangeManagementService::from_settings(
        &settings,
        Arc::new(VenueConnectorFactory::new(options)),
        Arc::new(MemoryOrderStore::new()),
    );
    let connected = service.initialize().await;
    info!(venues = connected.len(), "Venues connected");

    let result = match &cli.command {
        Commands::Venues => venues::execute(&service),
        Commands::Ticker { symbol } => market::ticker(&service, symbol).await,
        Commands::Book { symbol, limit } => market::book(&service, symbol, *limit).await,
        Commands::Balances => market::balances(&service).await,
        Commands::Arbitrage { symbols } => market::arbitrage(&service, symbols).await,
        Commands::Watch { symbol, book } => watch::execute(&service, symbol, *book).await,
        Commands::Route(args) => trade::route(&service, args).await,
        Commands::Cancel { venue, order_id } => trade::cancel(&service, *venue, order_id).await,
    };

    service.disconnect().await;

    if let Err(e) = &result {
        error!(error = %e, "Command failed");
        output::error(&e.to_string());
    }
    info!("venuebridge stopped");
    result.map_err(Into::into)
}
