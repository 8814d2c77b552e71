//! Handler for the `venues` command.

use serde::Serialize;

use crate::adapter::inbound::cli::output;
use crate::application::ExchangeManagementService;
use crate::domain::VenueId;
use crate::error::Result;

#[derive(Serialize)]
struct VenueRow {
    venue: VenueId,
    enabled: bool,
    connected: bool,
    priority: u8,
    authenticated: bool,
}

pub fn execute(service: &ExchangeManagementService) -> Result<()> {
    let connected = service.get_connected_exchanges();
    let rows: Vec<VenueRow> = service
        .get_exchange_configs()
        .into_iter()
        .map(|config| VenueRow {
            venue: config.name,
            enabled: config.enabled,
            connected: connected.contains(&config.name),
            priority: config.priority,
            authenticated: config.has_credentials(),
        })
        .collect();
    if output::record("venues", &rows) {
        return Ok(());
    }

    output::section("Venues");
    for row in &rows {
        let state = match (row.enabled, row.connected) {
            (false, _) => "disabled",
            (true, true) => "connected",
            (true, false) => "unreachable",
        };
        let access = if row.authenticated { "trading" } else { "public only" };
        output::field(
            &row.venue.to_string(),
            format!("{state}, priority {}, {access}", row.priority),
        );
    }
    Ok(())
}
