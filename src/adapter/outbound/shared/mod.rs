//! Plumbing shared by every venue adapter.

pub mod http;
pub mod keepalive;
pub mod options;
pub mod rate_limiter;
pub mod retry;
pub mod stream;
pub mod symbols;
pub mod wire;

pub use http::{classify_status, encode_params, RestClient, RestRequest, RestSettings};
pub use keepalive::KeepAlive;
pub use options::ConnectorOptions;
pub use rate_limiter::RateLimiter;
pub use retry::{retry, RetryPolicy};
pub use stream::{SessionConfig, SessionSlot, StreamProtocol, TungsteniteTransport, WsConnection, WsTransport};
pub use symbols::{AssetMap, Fallback, SymbolMap};
