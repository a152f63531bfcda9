//! Application initialization and resource setup.
//!
//! This module provides functions to initialize the shared resources a replay
//! run needs:
//! - Logger (plain or JSON)
//! - HTTP client for the geolocation endpoint

mod client;
mod logger;

// Re-export public API
pub use client::init_client;
pub use logger::init_logger_with;
