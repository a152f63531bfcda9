//! Geolocation lookup boundary and its HTTP adapter.

use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::types::{GeoFailure, GeoRecord};
use crate::config::{Config, RATE_LIMIT_MARKER};
use crate::error_handling::ConfigError;

/// Resolves an IP address to a geolocation record.
///
/// Implementations make at most one attempt per call, finish in bounded time,
/// and classify every failure into a [`GeoFailure`] instead of panicking.
#[async_trait]
pub trait GeoLookup: Send + Sync {
    async fn lookup(&self, ip: IpAddr) -> Result<GeoRecord, GeoFailure>;
}

/// Geolocation over HTTP against a hackertarget-style `geoip` endpoint.
///
/// Sends `GET {endpoint}?q={ip}&output=json` and classifies the answer with
/// [`classify_response`]. The request is bounded both by the client timeout
/// and by `tokio::time::timeout`, so a stalled connection cannot outlive
/// `lookup_timeout`.
pub struct HttpGeoLookup {
    client: Arc<reqwest::Client>,
    endpoint: Url,
    timeout: Duration,
}

impl HttpGeoLookup {
    /// Creates an adapter from the engine configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidGeoApiUrl` if `geo_api_url` does not parse.
    pub fn new(client: Arc<reqwest::Client>, config: &Config) -> Result<Self, ConfigError> {
        let endpoint = Url::parse(&config.geo_api_url).map_err(|e| {
            ConfigError::InvalidGeoApiUrl(config.geo_api_url.clone(), e.to_string())
        })?;
        Ok(Self {
            client,
            endpoint,
            timeout: config.lookup_timeout,
        })
    }

    fn request_url(&self, ip: IpAddr) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("q", &ip.to_string())
            .append_pair("output", "json");
        url
    }

    async fn fetch(&self, ip: IpAddr) -> Result<GeoRecord, GeoFailure> {
        let response = self
            .client
            .get(self.request_url(ip))
            .send()
            .await
            .map_err(|e| {
                log::debug!("Geo lookup for {} failed to connect: {}", ip, e);
                GeoFailure::Unreachable
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            log::debug!("Geo lookup for {} failed reading the body: {}", ip, e);
            GeoFailure::Unreachable
        })?;

        classify_response(status.as_u16(), &body, ip)
    }
}

#[async_trait]
impl GeoLookup for HttpGeoLookup {
    async fn lookup(&self, ip: IpAddr) -> Result<GeoRecord, GeoFailure> {
        match tokio::time::timeout(self.timeout, self.fetch(ip)).await {
            Ok(result) => result,
            Err(_) => {
                log::debug!(
                    "Geo lookup for {} timed out after {}ms",
                    ip,
                    self.timeout.as_millis()
                );
                Err(GeoFailure::Unreachable)
            }
        }
    }
}

/// Classifies a provider answer.
///
/// Any non-2xx status is an `UpstreamError`, whatever the body says. On 2xx
/// the body is scanned for the rate-limit marker, since the provider reports
/// an exhausted quota with 200 OK. A 2xx body that does not decode as a geo
/// record is treated as `Unreachable`. A record without an `ip` field gets
/// the queried address.
pub fn classify_response(status: u16, body: &str, ip: IpAddr) -> Result<GeoRecord, GeoFailure> {
    if !(200..300).contains(&status) {
        return Err(GeoFailure::UpstreamError(status));
    }
    if body.contains(RATE_LIMIT_MARKER) {
        return Err(GeoFailure::RateLimited);
    }

    let mut record: GeoRecord = serde_json::from_str(body).map_err(|e| {
        log::debug!("Geo answer for {} is not a geo record: {}", ip, e);
        GeoFailure::Unreachable
    })?;
    if record.ip.is_empty() {
        record.ip = ip.to_string();
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip() -> IpAddr {
        "8.8.8.8".parse().unwrap()
    }

    #[test]
    fn test_classify_success() {
        let body = r#"{"ip":"8.8.8.8","city":"Mountain View","state":"CA","country":"US","latitude":37.386,"longitude":-122.0838}"#;
        let record = classify_response(200, body, ip()).unwrap();
        assert_eq!(record.city, "Mountain View");
        assert_eq!(record.state, "CA");
    }

    #[test]
    fn test_classify_marker_on_ok_status() {
        let body = "API count exceeded - Increase Quota with Membership";
        assert_eq!(
            classify_response(200, body, ip()),
            Err(GeoFailure::RateLimited)
        );
    }

    #[test]
    fn test_classify_status_beats_marker() {
        let body = "API count exceeded - Increase Quota with Membership";
        assert_eq!(
            classify_response(429, body, ip()),
            Err(GeoFailure::UpstreamError(429))
        );
        assert_eq!(
            classify_response(503, "API count exceeded", ip()),
            Err(GeoFailure::UpstreamError(503))
        );
    }

    #[test]
    fn test_classify_non_2xx() {
        assert_eq!(
            classify_response(500, "oops", ip()),
            Err(GeoFailure::UpstreamError(500))
        );
        assert_eq!(
            classify_response(404, "", ip()),
            Err(GeoFailure::UpstreamError(404))
        );
    }

    #[test]
    fn test_classify_undecodable_body() {
        assert_eq!(
            classify_response(200, "error check your input", ip()),
            Err(GeoFailure::Unreachable)
        );
    }

    #[test]
    fn test_classify_fills_missing_ip() {
        let body = r#"{"latitude":1.5,"longitude":2.5}"#;
        let record = classify_response(200, body, ip()).unwrap();
        assert_eq!(record.ip, "8.8.8.8");
    }

    #[test]
    fn test_request_url_keeps_endpoint_path() {
        let config = Config {
            geo_api_url: "https://geo.example.com/geoip/".to_string(),
            ..Default::default()
        };
        let lookup = HttpGeoLookup::new(Arc::new(reqwest::Client::new()), &config).unwrap();
        assert_eq!(
            lookup.request_url("2001:db8::1".parse().unwrap()).as_str(),
            "https://geo.example.com/geoip/?q=2001%3Adb8%3A%3A1&output=json"
        );
    }

    #[test]
    fn test_new_rejects_invalid_url() {
        let config = Config {
            geo_api_url: "::not-a-url".to_string(),
            ..Default::default()
        };
        assert!(HttpGeoLookup::new(Arc::new(reqwest::Client::new()), &config).is_err());
    }
}
