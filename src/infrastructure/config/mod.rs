//! Infrastructure configuration modules.

pub mod logging;
pub mod network;
pub mod settings;
pub mod venue;

pub use logging::{LogFormat, LoggingConfig};
pub use network::{HttpConfig, StreamConfig};
pub use settings::Settings;
pub use venue::{Credentials, ExchangeConfig};
