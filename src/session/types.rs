//! Session and hop data structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::config::{
    DEFAULT_MAX_HOPS, DEFAULT_RECEIVE_TIMEOUT, DEFAULT_SEND_RATE, DEFAULT_TRACE_TIMEOUT,
    MAX_HOPS_LIMIT,
};
use crate::error_handling::SessionConfigError;
use crate::geo::GeoRecord;

/// Opaque, collision-free session identifier (UUID v4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generates a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Trace parameters of a session.
///
/// Fixed at creation and carried unchanged for the session's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceSettings {
    /// Maximum hop count (1..=255)
    pub max_hops: u32,
    #[serde(with = "duration_ms")]
    pub send_rate: Duration,
    #[serde(with = "duration_ms")]
    pub receive_timeout: Duration,
    #[serde(with = "duration_ms")]
    pub trace_timeout: Duration,
}

impl Default for TraceSettings {
    fn default() -> Self {
        Self {
            max_hops: DEFAULT_MAX_HOPS,
            send_rate: DEFAULT_SEND_RATE,
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
            trace_timeout: DEFAULT_TRACE_TIMEOUT,
        }
    }
}

impl TraceSettings {
    /// Rejects settings that would corrupt trace semantics downstream.
    pub fn validate(&self) -> Result<(), SessionConfigError> {
        if self.max_hops == 0 {
            return Err(SessionConfigError::ZeroMaxHops);
        }
        if self.max_hops > MAX_HOPS_LIMIT {
            return Err(SessionConfigError::MaxHopsTooLarge {
                value: self.max_hops,
                limit: MAX_HOPS_LIMIT,
            });
        }
        if self.send_rate.is_zero() {
            return Err(SessionConfigError::ZeroDuration("send_rate"));
        }
        if self.receive_timeout.is_zero() {
            return Err(SessionConfigError::ZeroDuration("receive_timeout"));
        }
        if self.trace_timeout.is_zero() {
            return Err(SessionConfigError::ZeroDuration("trace_timeout"));
        }
        Ok(())
    }
}

/// Everything needed to start a session.
///
/// `dest_ip` is kept as text; the tracer has already validated it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub name: String,
    pub dest_ip: String,
    pub settings: TraceSettings,
}

impl SessionConfig {
    /// A session toward `dest_ip` with the default trace settings.
    pub fn new(name: impl Into<String>, dest_ip: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dest_ip: dest_ip.into(),
            settings: TraceSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: TraceSettings) -> Self {
        self.settings = settings;
        self
    }
}

/// One raw hop event as the tracer emits it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HopObservation {
    /// Producer-assigned sequence number
    pub seq: u32,
    #[serde(deserialize_with = "text_or_number")]
    pub host_name: String,
    pub ip_addr: IpAddr,
    /// Hop distance, when the tracer could resolve it
    pub hop: Option<u8>,
    pub ttl: u8,
    pub node_type: String,
    /// Round-trip time, pre-formatted by the producer and never reparsed
    #[serde(deserialize_with = "text_or_number")]
    pub rtt: String,
}

/// A hop observation with its geolocation, if the lookup succeeded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedHop {
    #[serde(flatten)]
    pub observation: HopObservation,
    pub geo: Option<GeoRecord>,
}

impl EnrichedHop {
    pub fn new(observation: HopObservation, geo: Option<GeoRecord>) -> Self {
        Self { observation, geo }
    }

    pub fn has_geo(&self) -> bool {
        self.geo.is_some()
    }
}

/// One trace attempt toward a destination.
///
/// Values handed out by the store are copies; hops are shared read-only.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: SessionId,
    pub name: String,
    pub dest_ip: String,
    pub settings: TraceSettings,
    /// Hops in the order `append` was called
    pub hops: Vec<Arc<EnrichedHop>>,
    pub finished: bool,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Session {
    pub(crate) fn new(id: SessionId, config: SessionConfig) -> Self {
        Self {
            id,
            name: config.name,
            dest_ip: config.dest_ip,
            settings: config.settings,
            hops: Vec::new(),
            finished: false,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Marks the session finished. Returns `false` if it already was.
    pub(crate) fn mark_finished(&mut self) -> bool {
        if self.finished {
            return false;
        }
        self.finished = true;
        self.finished_at = Some(Utc::now());
        true
    }

    pub fn hop_count(&self) -> usize {
        self.hops.len()
    }

    /// Hops that carry a geolocation record.
    pub fn located_hops(&self) -> impl Iterator<Item = &EnrichedHop> {
        self.hops.iter().map(Arc::as_ref).filter(|hop| hop.has_geo())
    }
}

/// Accepts a JSON string as-is or a JSON number as its decimal text.
///
/// Tracer builds differ on whether they format `rtt` (and, in older builds,
/// `host_name`) before emitting the event.
fn text_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(text) => text,
        Raw::Number(number) => number.to_string(),
    })
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_ids_are_unique() {
        let ids: std::collections::HashSet<SessionId> = (0..1000).map(|_| SessionId::new()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_default_settings_are_valid() {
        assert!(TraceSettings::default().validate().is_ok());
    }

    #[test]
    fn test_settings_validation() {
        let settings = TraceSettings {
            max_hops: 0,
            ..Default::default()
        };
        assert_eq!(settings.validate(), Err(SessionConfigError::ZeroMaxHops));

        let settings = TraceSettings {
            max_hops: 256,
            ..Default::default()
        };
        assert_eq!(
            settings.validate(),
            Err(SessionConfigError::MaxHopsTooLarge {
                value: 256,
                limit: 255
            })
        );

        let settings = TraceSettings {
            max_hops: 255,
            ..Default::default()
        };
        assert!(settings.validate().is_ok());

        let settings = TraceSettings {
            receive_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(
            settings.validate(),
            Err(SessionConfigError::ZeroDuration("receive_timeout"))
        );
    }

    #[test]
    fn test_observation_from_formatted_event() {
        let line = r#"{"seq":1,"host_name":"router.local","ip_addr":"10.0.0.1","hop":1,"ttl":64,"node_type":"Hop","rtt":"1.2 ms"}"#;
        let obs: HopObservation = serde_json::from_str(line).unwrap();
        assert_eq!(obs.seq, 1);
        assert_eq!(obs.ip_addr, "10.0.0.1".parse::<IpAddr>().unwrap());
        assert_eq!(obs.hop, Some(1));
        assert_eq!(obs.rtt, "1.2 ms");
    }

    #[test]
    fn test_observation_with_numeric_fields() {
        let line = r#"{"seq":3,"host_name":3,"ip_addr":"2001:db8::1","hop":null,"ttl":62,"node_type":"Destination","rtt":17}"#;
        let obs: HopObservation = serde_json::from_str(line).unwrap();
        assert_eq!(obs.host_name, "3");
        assert_eq!(obs.hop, None);
        assert_eq!(obs.rtt, "17");
    }

    #[test]
    fn test_mark_finished_is_monotonic() {
        let mut session = Session::new(SessionId::new(), SessionConfig::new("t", "8.8.8.8"));
        assert!(!session.finished);
        assert!(session.mark_finished());
        let finished_at = session.finished_at;
        assert!(finished_at.is_some());
        assert!(!session.mark_finished());
        assert!(session.finished);
        assert_eq!(session.finished_at, finished_at);
    }

    #[test]
    fn test_settings_serialize_as_millis() {
        let json = serde_json::to_value(TraceSettings::default()).unwrap();
        assert_eq!(json["max_hops"], 30);
        assert_eq!(json["send_rate"], 2000);
        assert_eq!(json["receive_timeout"], 15000);
        assert_eq!(json["trace_timeout"], 60000);
    }
}
