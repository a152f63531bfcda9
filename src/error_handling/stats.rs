//! Enrichment statistics tracking.
//!
//! This module provides thread-safe counters for hop enrichment outcomes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use strum::IntoEnumIterator;

use super::types::EnrichmentOutcome;

/// Thread-safe enrichment statistics tracker.
///
/// Tracks how every hop enrichment ended using atomic counters, allowing
/// concurrent access from multiple enrichment tasks. All outcomes are
/// initialized to zero on creation.
///
/// # Thread Safety
///
/// This struct is thread-safe and can be shared across multiple tasks using `Arc`.
#[derive(Debug)]
pub struct EnrichmentStats {
    outcomes: HashMap<EnrichmentOutcome, AtomicUsize>,
}

impl Default for EnrichmentStats {
    fn default() -> Self {
        Self::new()
    }
}

impl EnrichmentStats {
    pub fn new() -> Self {
        let mut outcomes = HashMap::new();
        for outcome in EnrichmentOutcome::iter() {
            outcomes.insert(outcome, AtomicUsize::new(0));
        }
        EnrichmentStats { outcomes }
    }

    /// Increment the counter for an outcome.
    pub fn record(&self, outcome: EnrichmentOutcome) {
        if let Some(counter) = self.outcomes.get(&outcome) {
            counter.fetch_add(1, Ordering::Relaxed);
        } else {
            log::error!(
                "Attempted to record enrichment outcome {:?} which is not in the map. \
                 This indicates a bug in EnrichmentStats initialization.",
                outcome
            );
        }
    }

    /// Get the count for an outcome.
    ///
    /// Returns 0 if the outcome is not in the map (should never happen if properly initialized).
    pub fn get_count(&self, outcome: EnrichmentOutcome) -> usize {
        self.outcomes
            .get(&outcome)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Total number of enrichments that ended without geolocation.
    pub fn total_failures(&self) -> usize {
        EnrichmentOutcome::iter()
            .filter(EnrichmentOutcome::is_failure)
            .map(|outcome| self.get_count(outcome))
            .sum()
    }

    /// Total number of enrichments, whatever the outcome.
    pub fn total(&self) -> usize {
        EnrichmentOutcome::iter()
            .map(|outcome| self.get_count(outcome))
            .sum()
    }
}

/// Logs a summary of enrichment outcomes.
///
/// Only non-zero counters are listed.
pub fn log_enrichment_statistics(stats: &EnrichmentStats) {
    log::info!(
        "Enriched {} hop(s), {} without geolocation",
        stats.total(),
        stats.total_failures()
    );
    for outcome in EnrichmentOutcome::iter() {
        let count = stats.get_count(outcome);
        if count > 0 {
            log::info!("   {}: {}", outcome.as_str(), count);
        }
    }
}
