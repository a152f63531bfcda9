//! trace_sessions library: traceroute session tracking with geolocation
//!
//! This library keeps a set of live traceroute sessions, appends hop
//! observations to them as a tracer reports them, and enriches every hop with
//! the geolocation of its IP address. Lookups run concurrently, but each
//! session's hops always end up in the order they were appended. Failed
//! lookups never lose a hop; the latest failure is kept as an
//! [`ApiCondition`] for display.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use trace_sessions::initialization::init_client;
//! use trace_sessions::{Config, HopObservation, HttpGeoLookup, SessionConfig, SessionStore};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default();
//! let lookup = HttpGeoLookup::new(init_client(&config)?, &config)?;
//! let store = SessionStore::new(Arc::new(lookup), &config)?;
//!
//! let id = store.create(SessionConfig::new("google-dns", "8.8.8.8"))?;
//! let hop: HopObservation = serde_json::from_str(
//!     r#"{"seq":1,"host_name":"gw","ip_addr":"192.168.1.1","hop":1,"ttl":64,"node_type":"Hop","rtt":"0.8 ms"}"#,
//! )?;
//! store.append(id, hop)?.await;
//! store.finish(id)?;
//!
//! if let Some(session) = store.selected_session() {
//!     println!("{}: {} hop(s)", session.name, session.hop_count());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Requirements
//!
//! This library requires a Tokio runtime. [`SessionStore::append`] spawns its
//! enrichment task on the current runtime and returns
//! [`StoreError::NoRuntime`] when called outside one.

pub mod config;
mod enrichment;
mod error_handling;
mod geo;
pub mod ingest;
pub mod initialization;
mod replay;
mod session;

// Re-export public API
pub use config::{Config, LogFormat, LogLevel, Opt};
pub use enrichment::HopEnricher;
pub use error_handling::{
    log_enrichment_statistics, ConfigError, EnrichmentOutcome, EnrichmentStats, IngestError,
    InitializationError, SessionConfigError, StoreError,
};
pub use geo::{
    classify_response, ApiCondition, CachingGeoLookup, GeoFailure, GeoLookup, GeoRecord,
    HttpGeoLookup, DEFAULT_CACHE_TTL,
};
pub use replay::{replay, replay_events, ReplayReport};
pub use session::{
    current_session, AppendHandle, AppendOutcome, EnrichedHop, HopObservation, Session,
    SessionConfig, SessionId, SessionStore, SessionView, StoreSnapshot, TraceSettings,
};
