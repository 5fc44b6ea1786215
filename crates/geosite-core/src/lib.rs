//! GeoSite Core - Domain models, site table, ports, and configuration
//!
//! This crate contains the core domain types and port definitions shared by the
//! retrieval, scoring, and spatial crates of the GeoSite system.

pub mod config;
pub mod error;
pub mod models;
pub mod ports;

pub use error::{GeositeError, Result};
