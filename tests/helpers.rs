// Shared test helpers: scripted geolocation lookups and hop fixtures.
//
// This module provides common utilities used across multiple test files to reduce duplication.

use async_trait::async_trait;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use trace_sessions::{GeoFailure, GeoLookup, GeoRecord, HopObservation};

/// Builds a hop observation for `ip`.
#[allow(dead_code)] // Used by other test files
pub fn observation(seq: u32, ip: IpAddr) -> HopObservation {
    HopObservation {
        seq,
        host_name: format!("hop-{}", seq),
        ip_addr: ip,
        hop: u8::try_from(seq).ok(),
        ttl: 64,
        node_type: "Hop".to_string(),
        rtt: format!("{}.0 ms", seq),
    }
}

/// Builds a geolocation record for `ip`.
#[allow(dead_code)]
pub fn record(ip: IpAddr) -> GeoRecord {
    GeoRecord {
        city: "Frankfurt".to_string(),
        country: "DE".to_string(),
        state: "HE".to_string(),
        ip: ip.to_string(),
        latitude: 50.11,
        longitude: 8.68,
    }
}

/// Lookup with a per-IP latency and an optional per-IP failure.
///
/// Addresses without a scripted delay answer immediately.
#[allow(dead_code)]
#[derive(Default)]
pub struct ScriptedLookup {
    pub delays: HashMap<IpAddr, Duration>,
    pub failures: HashMap<IpAddr, GeoFailure>,
    pub calls: AtomicUsize,
}

#[allow(dead_code)]
impl ScriptedLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delay(mut self, ip: IpAddr, delay: Duration) -> Self {
        self.delays.insert(ip, delay);
        self
    }

    pub fn fail(mut self, ip: IpAddr, failure: GeoFailure) -> Self {
        self.failures.insert(ip, failure);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GeoLookup for ScriptedLookup {
    async fn lookup(&self, ip: IpAddr) -> Result<GeoRecord, GeoFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delays.get(&ip) {
            tokio::time::sleep(*delay).await;
        }
        match self.failures.get(&ip) {
            Some(failure) => Err(*failure),
            None => Ok(record(ip)),
        }
    }
}

/// `10.{a}.{b}.{c}` for hop `n` of session `session`.
#[allow(dead_code)]
pub fn hop_ip(session: u8, n: u32) -> IpAddr {
    IpAddr::from([10, session, (n / 256) as u8, (n % 256) as u8])
}
