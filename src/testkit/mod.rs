//! Shared test utilities available to both unit and integration tests.
//!
//! Enabled via `#[cfg(test)]` (unit tests) or the `testkit` feature
//! (integration tests).
//!
//! # Modules
//!
//! - [`connector`] - `MockConnector`, a scripted in-process
//!   [`ExchangeConnector`](crate::port::ExchangeConnector).
//! - [`transport`] - `ScriptedTransport` for driving streaming sessions
//!   without a network.
//! - [`domain`] - Builders for domain primitives: tickers, books, orders.
//! - [`config`] - Canonical test configurations (fast reconnects, no retries).
//! - [`service`] - `MockFactory` and an initialized management service
//!   over mocks.

pub mod config;
pub mod connector;
pub mod domain;
pub mod service;
pub mod transport;
