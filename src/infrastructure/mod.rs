//! Infrastructure layer.
//!
//! Technical concerns that support the gateway without containing trading
//! logic.
//!
//! # Submodules
//!
//! - [`config`] - Configuration loading and validation

pub mod config;
