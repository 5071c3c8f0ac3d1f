//! Market Core Library
//!
//! Shared types, configuration, and session persistence for the
//! event-outcome trading engine.

pub mod config;
pub mod error;
pub mod store;
pub mod types;

pub use error::{Error, Result};
