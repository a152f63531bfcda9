//! Error handling and enrichment statistics.
//!
//! This module provides:
//! - Error type definitions for configuration, session and ingest failures
//! - Enrichment outcome categorization and thread-safe counters
//!
//! Geolocation failures never surface as errors here; they end up as an
//! [`EnrichmentOutcome`] and as the store's last API condition.

mod stats;
mod types;

// Re-export public API
pub use stats::{log_enrichment_statistics, EnrichmentStats};
pub use types::{
    ConfigError, EnrichmentOutcome, IngestError, InitializationError, SessionConfigError,
    StoreError,
};
