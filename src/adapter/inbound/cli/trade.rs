//! Handlers for `route` and `cancel`.

use crate::adapter::inbound::cli::command::RouteArgs;
use crate::adapter::inbound::cli::output;
use crate::application::ExchangeManagementService;
use crate::domain::{OrderId, SmartOrderRequest, VenueId};
use crate::error::Result;

pub async fn route(service: &ExchangeManagementService, args: &RouteArgs) -> Result<()> {
    let mut request = SmartOrderRequest::new(args.symbol.clone(), args.side.into(), args.amount)
        .with_strategy(args.strategy.into());
    if let Some(price) = args.price {
        request = request.with_price(price);
    }
    if let Some(venue) = args.venue {
        request = request.with_preferred_venue(venue);
    }
    if let Some(max) = args.max_slippage {
        request = request.with_max_slippage(max);
    }

    let result = service.create_smart_order(&request).await?;
    if output::record("route", &result) {
        return Ok(());
    }

    output::section("Routed");
    for child in &result.children {
        output::field(
            &child.venue.to_string(),
            format!(
                "{} {}: {} of {} @ {}",
                child.order_id, child.status, child.filled, child.requested, child.price
            ),
        );
    }
    output::field("Filled", result.total_amount);
    output::field("Avg price", result.average_price);
    output::field("Fees", result.total_fee);
    output::field("Took", format!("{:?}", result.execution_time));
    Ok(())
}

pub async fn cancel(service: &ExchangeManagementService, venue: VenueId, order_id: &str) -> Result<()> {
    let order = service.cancel_order(venue, &OrderId::new(order_id)).await?;
    if output::record("cancel", &order) {
        return Ok(());
    }
    output::field(&venue.to_string(), format!("{} {}", order.id, order.status()));
    Ok(())
}
