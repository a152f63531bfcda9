//! Hop enrichment.
//!
//! Attaches geolocation to a raw hop observation. Enrichment never fails: a
//! failed, panicking, or stalled lookup yields a hop without geolocation, and
//! the failure is published to a single-slot condition channel that always
//! holds only the latest failure.

use futures::FutureExt;
use std::net::IpAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::error_handling::{EnrichmentOutcome, EnrichmentStats};
use crate::geo::{ApiCondition, GeoFailure, GeoLookup};
use crate::session::{EnrichedHop, HopObservation};

/// Wraps each hop observation with a geolocation lookup.
///
/// Cheap to clone; clones share the lookup, the condition slot and the
/// statistics.
#[derive(Clone)]
pub struct HopEnricher {
    lookup: Arc<dyn GeoLookup>,
    timeout: Duration,
    condition: Arc<watch::Sender<Option<ApiCondition>>>,
    stats: Arc<EnrichmentStats>,
}

impl HopEnricher {
    /// Creates an enricher that gives every lookup at most `timeout`.
    pub fn new(lookup: Arc<dyn GeoLookup>, timeout: Duration) -> Self {
        let (condition, _) = watch::channel(None);
        Self {
            lookup,
            timeout,
            condition: Arc::new(condition),
            stats: Arc::new(EnrichmentStats::new()),
        }
    }

    /// Looks up the hop's own IP and returns the enriched hop.
    ///
    /// Returns within `timeout` plus scheduling delay, whatever the lookup does.
    pub async fn enrich(&self, observation: HopObservation) -> EnrichedHop {
        let ip = observation.ip_addr;
        let attempt = AssertUnwindSafe(self.lookup.lookup(ip)).catch_unwind();

        let (geo, outcome) = match tokio::time::timeout(self.timeout, attempt).await {
            Ok(Ok(Ok(record))) => (Some(record), EnrichmentOutcome::Success),
            Ok(Ok(Err(failure))) => {
                self.report(failure, ip);
                (None, outcome_for(failure))
            }
            Ok(Err(_)) => {
                log::error!("Geo lookup for {} panicked", ip);
                self.report(GeoFailure::Unreachable, ip);
                (None, EnrichmentOutcome::Unreachable)
            }
            Err(_) => {
                log::warn!(
                    "Geo lookup for {} exceeded {}ms",
                    ip,
                    self.timeout.as_millis()
                );
                self.report(GeoFailure::Unreachable, ip);
                (None, EnrichmentOutcome::TimedOut)
            }
        };

        self.stats.record(outcome);
        EnrichedHop::new(observation, geo)
    }

    fn report(&self, failure: GeoFailure, ip: IpAddr) {
        let condition = ApiCondition::new(failure, ip);
        log::warn!("{} ({} for {})", condition.message(), failure, ip);
        self.condition.send_replace(Some(condition));
    }

    /// The most recent enrichment failure, if any.
    pub fn last_condition(&self) -> Option<ApiCondition> {
        self.condition.borrow().clone()
    }

    /// Subscribes to changes of the last enrichment failure.
    pub fn conditions(&self) -> watch::Receiver<Option<ApiCondition>> {
        self.condition.subscribe()
    }

    pub fn stats(&self) -> &EnrichmentStats {
        &self.stats
    }
}

fn outcome_for(failure: GeoFailure) -> EnrichmentOutcome {
    match failure {
        GeoFailure::RateLimited => EnrichmentOutcome::RateLimited,
        GeoFailure::UpstreamError(_) => EnrichmentOutcome::UpstreamError,
        GeoFailure::Unreachable => EnrichmentOutcome::Unreachable,
    }
}
