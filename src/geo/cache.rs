//! In-memory cache in front of a geolocation lookup.
//!
//! Traceroutes toward nearby destinations keep crossing the same routers, and
//! the free geolocation tier has a small daily quota. Successful records are
//! reused for `ttl`; failures are never cached so the next hop tries again.

use async_trait::async_trait;
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::lookup::GeoLookup;
use super::types::{GeoFailure, GeoRecord};

/// Default cache TTL (1 hour)
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Wraps a [`GeoLookup`] and serves repeated IPs from memory.
pub struct CachingGeoLookup<L> {
    inner: L,
    ttl: Duration,
    entries: RwLock<HashMap<IpAddr, (Instant, GeoRecord)>>,
}

impl<L: GeoLookup> CachingGeoLookup<L> {
    pub fn new(inner: L) -> Self {
        Self::with_ttl(inner, DEFAULT_CACHE_TTL)
    }

    pub fn with_ttl(inner: L, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Number of cached records. Expired records are dropped on the next
    /// lookup that reaches the inner adapter.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl<L: GeoLookup> GeoLookup for CachingGeoLookup<L> {
    async fn lookup(&self, ip: IpAddr) -> Result<GeoRecord, GeoFailure> {
        if let Some((cached_at, record)) = self.entries.read().await.get(&ip) {
            if cached_at.elapsed() <= self.ttl {
                log::trace!("Geo cache hit for {}", ip);
                return Ok(record.clone());
            }
        }

        let result = self.inner.lookup(ip).await;

        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, (cached_at, _)| cached_at.elapsed() <= self.ttl);
        if entries.len() < before {
            log::trace!("Geo cache evicted {} expired record(s)", before - entries.len());
        }
        if let Ok(record) = &result {
            entries.insert(ip, (Instant::now(), record.clone()));
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingLookup {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl GeoLookup for CountingLookup {
        async fn lookup(&self, ip: IpAddr) -> Result<GeoRecord, GeoFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(GeoFailure::Unreachable);
            }
            Ok(GeoRecord {
                city: "Berlin".to_string(),
                country: "DE".to_string(),
                state: "BE".to_string(),
                ip: ip.to_string(),
                latitude: 52.52,
                longitude: 13.405,
            })
        }
    }

    #[tokio::test]
    async fn test_repeated_ip_is_served_from_cache() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = CachingGeoLookup::new(CountingLookup {
            calls: Arc::clone(&calls),
            fail: false,
        });
        let ip: IpAddr = "192.0.2.1".parse().unwrap();

        let first = cache.lookup(ip).await.unwrap();
        let second = cache.lookup(ip).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = CachingGeoLookup::new(CountingLookup {
            calls: Arc::clone(&calls),
            fail: true,
        });
        let ip: IpAddr = "192.0.2.1".parse().unwrap();

        assert_eq!(cache.lookup(ip).await, Err(GeoFailure::Unreachable));
        assert_eq!(cache.lookup(ip).await, Err(GeoFailure::Unreachable));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_expired_entry_is_refreshed() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = CachingGeoLookup::with_ttl(
            CountingLookup {
                calls: Arc::clone(&calls),
                fail: false,
            },
            Duration::ZERO,
        );
        let ip: IpAddr = "192.0.2.7".parse().unwrap();

        cache.lookup(ip).await.unwrap();
        std::thread::sleep(Duration::from_millis(2));
        cache.lookup(ip).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_expired_records_are_evicted() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = CachingGeoLookup::with_ttl(
            CountingLookup {
                calls: Arc::clone(&calls),
                fail: false,
            },
            Duration::ZERO,
        );

        cache.lookup("192.0.2.1".parse().unwrap()).await.unwrap();
        std::thread::sleep(Duration::from_millis(2));
        cache.lookup("192.0.2.2".parse().unwrap()).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_failed_refresh_drops_expired_record() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = CachingGeoLookup::with_ttl(
            CountingLookup {
                calls: Arc::clone(&calls),
                fail: false,
            },
            Duration::ZERO,
        );
        let ip: IpAddr = "192.0.2.9".parse().unwrap();
        cache.lookup(ip).await.unwrap();
        std::thread::sleep(Duration::from_millis(2));

        let failing = CachingGeoLookup {
            inner: CountingLookup {
                calls: Arc::clone(&calls),
                fail: true,
            },
            ttl: Duration::ZERO,
            entries: RwLock::new(std::mem::take(&mut *cache.entries.write().await)),
        };
        assert_eq!(failing.lookup(ip).await, Err(GeoFailure::Unreachable));
        assert!(failing.is_empty().await);
    }
}
