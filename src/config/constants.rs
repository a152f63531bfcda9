//! Configuration constants.
//!
//! This module defines the defaults used throughout the engine: geolocation
//! endpoint, lookup and commit timeouts, and the trace settings a tracer uses
//! when the caller does not override them.

use std::time::Duration;

/// Default geolocation endpoint.
///
/// Queried as `GET {url}?q={ip}&output=json`. The free tier answers with a
/// plain-text quota message instead of JSON once the daily quota is used up.
pub const DEFAULT_GEO_API_URL: &str = "https://api.hackertarget.com/geoip/";

/// Body marker the geolocation provider returns when the quota is exhausted.
///
/// The provider answers 200 OK in that case, so the body of every 2xx answer
/// is scanned for it. Non-2xx answers are upstream errors regardless.
pub const RATE_LIMIT_MARKER: &str = "API count exceeded";

/// Per-lookup timeout for the geolocation call.
///
/// Expiry is classified as `GeoFailure::Unreachable`.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Extra time a buffered hop waits for earlier tickets beyond the lookup timeout.
///
/// Earlier lookups are bounded by `DEFAULT_LOOKUP_TIMEOUT`, so the gap between
/// the two only has to absorb scheduling jitter.
pub const COMMIT_GRACE: Duration = Duration::from_secs(5);

/// Maximum time an out-of-order hop stays buffered before missing earlier
/// tickets are skipped.
pub const DEFAULT_COMMIT_TIMEOUT: Duration =
    Duration::from_secs(DEFAULT_LOOKUP_TIMEOUT.as_secs() + COMMIT_GRACE.as_secs());

/// Default User-Agent for geolocation requests
pub const DEFAULT_USER_AGENT: &str = concat!("trace_sessions/", env!("CARGO_PKG_VERSION"));

// Trace settings (defaults the tracer uses)
/// Default maximum hop count
pub const DEFAULT_MAX_HOPS: u32 = 30;
/// Upper bound for the hop count; TTL is an 8-bit field
pub const MAX_HOPS_LIMIT: u32 = 255;
/// Delay between sent packets
pub const DEFAULT_SEND_RATE: Duration = Duration::from_secs(2);
/// How long to wait for a single packet reply
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(15);
/// How long a whole trace may run
pub const DEFAULT_TRACE_TIMEOUT: Duration = Duration::from_secs(60);
