//! Error type definitions.
//!
//! This module defines the engine-level errors. Geolocation failures are not
//! among them: they are recovered inside the enricher and surfaced only as an
//! [`ApiCondition`](crate::geo::ApiCondition).

use log::SetLoggerError;
use reqwest::Error as ReqwestError;
use strum_macros::EnumIter as EnumIterMacro;
use thiserror::Error;

use crate::session::SessionId;

/// Error types for initialization failures.
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)] // All variants end with "Error" by convention
pub enum InitializationError {
    /// Error initializing the logger.
    #[error("Logger initialization error: {0}")]
    LoggerError(#[from] SetLoggerError),

    /// Error initializing the HTTP client.
    #[error("HTTP client initialization error: {0}")]
    HttpClientError(#[from] ReqwestError),

    /// The engine configuration was rejected.
    #[error("Configuration error: {0}")]
    ConfigError(#[from] ConfigError),
}

/// Invalid engine configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The geolocation endpoint is not an absolute http(s) URL.
    #[error("Invalid geolocation API URL '{0}': {1}")]
    InvalidGeoApiUrl(String, String),

    /// A timeout knob was set to zero.
    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    /// The reorder buffer would give up on hops whose lookup is still
    /// within its own timeout.
    #[error("commit_timeout ({commit_ms}ms) must be longer than lookup_timeout ({lookup_ms}ms)")]
    CommitTimeoutTooShort {
        /// Configured commit timeout in milliseconds
        commit_ms: u128,
        /// Configured lookup timeout in milliseconds
        lookup_ms: u128,
    },
}

/// Invalid trace settings passed at session creation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionConfigError {
    /// `max_hops` was zero.
    #[error("max_hops must be at least 1")]
    ZeroMaxHops,

    /// `max_hops` does not fit the 8-bit TTL field.
    #[error("max_hops must be at most {limit}, got {value}")]
    MaxHopsTooLarge {
        /// Requested value
        value: u32,
        /// Largest accepted value
        limit: u32,
    },

    /// One of the duration settings was zero.
    #[error("{0} must be a positive duration")]
    ZeroDuration(&'static str),
}

/// Errors returned by [`SessionStore`](crate::SessionStore) operations.
///
/// The store never fails because of enrichment; only invalid input, unknown
/// session ids and use after shutdown are reported.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The session id is not (or no longer) known to the store.
    #[error("Session {0} not found")]
    SessionNotFound(SessionId),

    /// The session could not be created from the given settings.
    #[error("Invalid session configuration: {0}")]
    InvalidSessionConfig(#[from] SessionConfigError),

    /// The store was shut down; it no longer accepts sessions or hops.
    #[error("Session store is shut down")]
    ShutDown,

    /// `append` was called outside a Tokio runtime.
    #[error("No Tokio runtime to run hop enrichment on")]
    NoRuntime,
}

/// Errors while reading producer hop events.
#[derive(Error, Debug)]
pub enum IngestError {
    /// The input could not be read.
    #[error("Failed to read hop events: {0}")]
    Io(#[from] std::io::Error),

    /// A line was not a valid hop event.
    #[error("Malformed hop event on line {line}: {source}")]
    Malformed {
        /// 1-based line number in the input
        line: usize,
        /// Decoding error
        #[source]
        source: serde_json::Error,
    },
}

/// Outcome of a single hop enrichment, used for statistics.
///
/// Every enrichment ends in exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIterMacro)]
pub enum EnrichmentOutcome {
    /// Geolocation attached
    Success,
    /// Provider quota exhausted
    RateLimited,
    /// Non-2xx answer from the provider
    UpstreamError,
    /// Transport failure or undecodable body
    Unreachable,
    /// The enricher's own timeout guard fired
    TimedOut,
}

impl EnrichmentOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrichmentOutcome::Success => "Geolocation attached",
            EnrichmentOutcome::RateLimited => "Geo API rate limited",
            EnrichmentOutcome::UpstreamError => "Geo API upstream error",
            EnrichmentOutcome::Unreachable => "Geo API not reachable",
            EnrichmentOutcome::TimedOut => "Geo lookup timed out",
        }
    }

    /// Whether the hop was committed without geolocation.
    pub fn is_failure(&self) -> bool {
        !matches!(self, EnrichmentOutcome::Success)
    }
}
