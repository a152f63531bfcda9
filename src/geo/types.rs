//! Geolocation data structures.
//!
//! This module defines the record a lookup produces, the classified failure
//! it may end in, and the condition the store keeps about the latest failure.

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use thiserror::Error;

/// Geolocation of a single IP address.
///
/// Text fields missing from the provider answer decode as empty strings so a
/// partial answer still yields a record; coordinates are required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoRecord {
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub country: String,
    /// Region or two-letter state code
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub ip: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Classified failure of a geolocation lookup.
///
/// Every way a lookup can go wrong ends up in one of these variants; nothing
/// propagates past the lookup boundary.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeoFailure {
    /// The provider signaled that the quota is exhausted.
    #[error("rate limited by the geolocation provider")]
    RateLimited,

    /// The provider answered with a non-2xx status.
    #[error("geolocation provider answered HTTP {0}")]
    UpstreamError(u16),

    /// DNS, connection, timeout, or an answer that could not be decoded.
    #[error("geolocation provider not reachable")]
    Unreachable,
}

/// The most recent enrichment failure recorded by the store.
///
/// Only one condition is kept; a newer failure replaces the older one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiCondition {
    pub failure: GeoFailure,
    /// IP whose lookup failed
    pub ip: IpAddr,
    pub observed_at: DateTime<Utc>,
}

impl ApiCondition {
    pub fn new(failure: GeoFailure, ip: IpAddr) -> Self {
        Self {
            failure,
            ip,
            observed_at: Utc::now(),
        }
    }

    /// Banner text for the condition.
    pub fn message(&self) -> String {
        match self.failure {
            GeoFailure::RateLimited => "Geo API: count exceeded".to_string(),
            GeoFailure::UpstreamError(status) => {
                let reason = StatusCode::from_u16(status)
                    .ok()
                    .and_then(|s| s.canonical_reason())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("HTTP {}", status));
                format!("Geo API: {}", reason)
            }
            GeoFailure::Unreachable => "Geo API: not reachable".to_string(),
        }
    }
}
