//! Geolocation lookup for hop addresses.
//!
//! This module provides the lookup boundary the engine depends on, an HTTP
//! adapter for a hackertarget-style JSON endpoint, and an in-memory cache
//! that can sit in front of any lookup.

mod cache;
mod lookup;
mod types;

// Re-export public API
pub use cache::{CachingGeoLookup, DEFAULT_CACHE_TTL};
pub use lookup::{classify_response, GeoLookup, HttpGeoLookup};
pub use types::{ApiCondition, GeoFailure, GeoRecord};
