//! Replay of a recorded (or live, via stdin) hop event stream into one session.

use anyhow::{Context, Result};
use futures::future::join_all;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncBufRead;

use crate::config::Config;
use crate::error_handling::log_enrichment_statistics;
use crate::geo::{ApiCondition, CachingGeoLookup, GeoLookup, HttpGeoLookup};
use crate::ingest::{open_events, HopEventReader};
use crate::initialization::init_client;
use crate::session::{Session, SessionConfig, SessionStore};

/// Result of a replay run.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    /// The finished session, hops in event order
    pub session: Session,
    /// Latest enrichment failure, if any lookup failed
    pub last_condition: Option<ApiCondition>,
    /// Hops committed to the session
    pub total_hops: usize,
    /// Hops carrying a geolocation record
    pub located_hops: usize,
    /// Input lines that were not valid hop events
    pub malformed_lines: usize,
    pub elapsed_seconds: f64,
}

/// Replays the hop events in `path` (or stdin for `-`) as one session.
///
/// Builds the HTTP geolocation adapter from `config` and hands every event to
/// [`SessionStore::append`] as soon as it is read. At end of input it waits
/// for all hops to commit and finishes the session.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the HTTP client cannot
/// be built, the input cannot be read, or the session settings are rejected.
/// Geolocation failures are not errors; they show up in
/// [`ReplayReport::last_condition`].
///
/// # Example
///
/// ```no_run
/// use trace_sessions::{replay, Config, SessionConfig};
/// use std::path::Path;
///
/// # async fn example() -> anyhow::Result<()> {
/// let report = replay(
///     Config::default(),
///     SessionConfig::new("google-dns", "8.8.8.8"),
///     Path::new("hops.jsonl"),
/// )
/// .await?;
/// println!("{} of {} hops located", report.located_hops, report.total_hops);
/// # Ok(())
/// # }
/// ```
pub async fn replay(
    config: Config,
    session_config: SessionConfig,
    path: &Path,
) -> Result<ReplayReport> {
    config.validate().context("Invalid configuration")?;

    let client = init_client(&config).context("Failed to initialize HTTP client")?;
    let http = HttpGeoLookup::new(client, &config).context("Failed to build geo lookup")?;
    let lookup: Arc<dyn GeoLookup> = Arc::new(CachingGeoLookup::new(http));

    let events = open_events(path)
        .await
        .with_context(|| format!("Failed to open hop events at {}", path.display()))?;
    log::info!("Replaying hop events from {}", path.display());

    let store = SessionStore::new(lookup, &config).context("Failed to create session store")?;
    replay_events(&store, session_config, events)
        .await
        .with_context(|| format!("Failed to replay hop events from {}", path.display()))
}

/// Creates a session in `store` and appends each event from `events` as it
/// arrives.
///
/// Hops are enriched and committed while the input is still open; the
/// session is finished once the input ends and every hop has settled.
///
/// # Errors
///
/// Returns an error if the session settings are rejected or the input cannot
/// be read.
pub async fn replay_events<R>(
    store: &SessionStore,
    session_config: SessionConfig,
    mut events: HopEventReader<R>,
) -> Result<ReplayReport>
where
    R: AsyncBufRead + Unpin,
{
    let start = Instant::now();
    let id = store
        .create(session_config)
        .context("Failed to create session")?;

    let mut handles = Vec::new();
    while let Some(observation) = events.next_event().await? {
        handles.push(store.append(id, observation)?);
    }
    log::debug!(
        "Input closed after {} hop event(s), {} malformed line(s)",
        events.events_read(),
        events.malformed()
    );

    let outcomes = join_all(handles).await;
    let lost = outcomes.iter().filter(|o| !o.is_committed()).count();
    if lost > 0 {
        log::warn!("{} hop(s) were not committed", lost);
    }

    store.finish(id)?;
    log_enrichment_statistics(store.stats());

    let session = store
        .session(id)
        .with_context(|| format!("Session {} disappeared during replay", id))?;
    let located_hops = session.located_hops().count();
    Ok(ReplayReport {
        total_hops: session.hop_count(),
        located_hops,
        last_condition: store.last_condition(),
        malformed_lines: events.malformed(),
        elapsed_seconds: start.elapsed().as_secs_f64(),
        session,
    })
}
