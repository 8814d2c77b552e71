//! Application services (use cases).
//!
//! These services orchestrate domain logic over one or more venue
//! connectors. Nothing here knows a venue's wire format.

pub mod connector_ops;
pub mod factory;
pub mod management;

pub use factory::{ConnectorFactory, VenueConnectorFactory};
pub use management::ExchangeManagementService;
