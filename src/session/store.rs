//! Session store: the engine core.
//!
//! Owns every session, hands out tickets for hop appends, and keeps the
//! "currently selected session" pointer. The registry (map plus selection) is
//! behind one `RwLock`; each session's hop sequence is behind its own mutex in
//! a [`SessionSlot`], so sessions never wait on each other.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::commit::{AppendHandle, AppendOutcome, SessionSlot};
use super::types::{HopObservation, Session, SessionConfig, SessionId};
use crate::config::Config;
use crate::enrichment::HopEnricher;
use crate::error_handling::{ConfigError, EnrichmentStats, StoreError};
use crate::geo::{ApiCondition, GeoLookup};

#[derive(Default)]
struct Registry {
    sessions: HashMap<SessionId, Arc<SessionSlot>>,
    selected: Option<SessionId>,
}

/// Immutable copy of the store at one point in time.
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    pub sessions: HashMap<SessionId, Session>,
    pub selected: Option<SessionId>,
    pub last_condition: Option<ApiCondition>,
    /// Store revision the snapshot was taken at
    pub revision: u64,
}

impl StoreSnapshot {
    pub fn session(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    /// The selected session, if any.
    pub fn selected_session(&self) -> Option<&Session> {
        super::view::current_session(self)
    }
}

/// Tracks live traceroute sessions.
///
/// Construct once and share as `Arc<SessionStore>`. `append` spawns its
/// enrichment on the current Tokio runtime and fails with
/// [`StoreError::NoRuntime`] outside one.
///
/// Operations on an id the store does not know fail with
/// [`StoreError::SessionNotFound`], uniformly for `append`, `finish`,
/// `select` and `remove`. After [`shutdown`](Self::shutdown), `create` and
/// `append` fail with [`StoreError::ShutDown`].
pub struct SessionStore {
    registry: RwLock<Registry>,
    enricher: HopEnricher,
    commit_timeout: Duration,
    revision: Arc<watch::Sender<u64>>,
    shutdown: CancellationToken,
}

impl SessionStore {
    /// Creates a store enriching hops through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if `config` does not validate.
    pub fn new(lookup: Arc<dyn GeoLookup>, config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let (revision, _) = watch::channel(0);
        Ok(Self {
            registry: RwLock::new(Registry::default()),
            enricher: HopEnricher::new(lookup, config.lookup_timeout),
            commit_timeout: config.commit_timeout,
            revision: Arc::new(revision),
            shutdown: CancellationToken::new(),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot(&self, id: SessionId) -> Result<Arc<SessionSlot>, StoreError> {
        self.read()
            .sessions
            .get(&id)
            .cloned()
            .ok_or(StoreError::SessionNotFound(id))
    }

    fn bump(&self) {
        self.revision.send_modify(|r| *r += 1);
    }

    /// Starts a new session and selects it.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidSessionConfig` if the trace settings are
    /// invalid, or `StoreError::ShutDown` after shutdown; nothing is inserted
    /// in either case.
    pub fn create(&self, config: SessionConfig) -> Result<SessionId, StoreError> {
        if self.shutdown.is_cancelled() {
            return Err(StoreError::ShutDown);
        }
        config.settings.validate()?;

        let mut registry = self.write();
        let mut id = SessionId::new();
        while registry.sessions.contains_key(&id) {
            id = SessionId::new();
        }

        log::info!(
            "Starting session {} '{}' toward {} (max {} hops)",
            id,
            config.name,
            config.dest_ip,
            config.settings.max_hops
        );
        let slot = SessionSlot::new(Session::new(id, config), self.shutdown.child_token());
        registry.sessions.insert(id, Arc::new(slot));
        registry.selected = Some(id);
        drop(registry);

        self.bump();
        Ok(id)
    }

    /// Appends a hop observation to a session.
    ///
    /// The hop's position is reserved before this returns; enrichment and the
    /// ordered commit run in a spawned task. Hops end up in the order of the
    /// `append` calls, not in the order their lookups finish.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::SessionNotFound` for an unknown id,
    /// `StoreError::ShutDown` after shutdown and `StoreError::NoRuntime`
    /// outside a Tokio runtime. No ticket is taken when an error is returned.
    pub fn append(
        &self,
        id: SessionId,
        observation: HopObservation,
    ) -> Result<AppendHandle, StoreError> {
        let slot = self.slot(id)?;
        if self.shutdown.is_cancelled() {
            log::warn!(
                "Rejecting hop seq={} for session {}: store is shut down",
                observation.seq,
                id
            );
            return Err(StoreError::ShutDown);
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| StoreError::NoRuntime)?;
        let ticket = slot.issue_ticket();
        log::trace!(
            "Session {}: ticket {} for hop seq={} ip={}",
            id,
            ticket,
            observation.seq,
            observation.ip_addr
        );

        let enricher = self.enricher.clone();
        let revision = Arc::clone(&self.revision);
        let commit_timeout = self.commit_timeout;
        let task = runtime.spawn(async move {
            let cancel = slot.cancel_token().clone();
            let hop = tokio::select! {
                biased;
                _ = cancel.cancelled() => return AppendOutcome::Cancelled,
                hop = enricher.enrich(observation) => Arc::new(hop),
            };
            slot.commit(ticket, hop, commit_timeout, &revision).await
        });

        Ok(AppendHandle::new(id, ticket, task))
    }

    /// Marks a session finished. Finishing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::SessionNotFound` for an unknown id.
    pub fn finish(&self, id: SessionId) -> Result<(), StoreError> {
        let slot = self.slot(id)?;
        let changed = {
            let mut state = slot.lock();
            let changed = state.session.mark_finished();
            if changed {
                log::info!(
                    "Session {} finished with {} hop(s)",
                    id,
                    state.session.hop_count()
                );
            }
            changed
        };
        if changed {
            self.bump();
        }
        Ok(())
    }

    /// Selects a session.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::SessionNotFound` for an unknown id; the current
    /// selection is kept.
    pub fn select(&self, id: SessionId) -> Result<(), StoreError> {
        {
            let mut registry = self.write();
            if !registry.sessions.contains_key(&id) {
                return Err(StoreError::SessionNotFound(id));
            }
            registry.selected = Some(id);
        }
        self.bump();
        Ok(())
    }

    pub fn selected(&self) -> Option<SessionId> {
        self.read().selected
    }

    /// Copy of the selected session, read under one registry lock.
    pub fn selected_session(&self) -> Option<Session> {
        let registry = self.read();
        let id = registry.selected?;
        let slot = registry.sessions.get(&id)?;
        let session = slot.lock().session.clone();
        Some(session)
    }

    /// Copy of one session.
    pub fn session(&self, id: SessionId) -> Option<Session> {
        let slot = self.slot(id).ok()?;
        let session = slot.lock().session.clone();
        Some(session)
    }

    /// Drops a session and cancels its in-flight enrichment.
    ///
    /// Clears the selection if it pointed to the removed session. Hops still
    /// in flight for it are discarded.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::SessionNotFound` for an unknown id.
    pub fn remove(&self, id: SessionId) -> Result<Session, StoreError> {
        let slot = {
            let mut registry = self.write();
            let slot = registry
                .sessions
                .remove(&id)
                .ok_or(StoreError::SessionNotFound(id))?;
            if registry.selected == Some(id) {
                registry.selected = None;
            }
            slot
        };
        let session = slot.retire();
        log::info!("Removed session {} '{}'", id, session.name);
        self.bump();
        Ok(session)
    }

    /// Copy of every session, the selection and the last API condition.
    ///
    /// Reflects every mutation committed before the call.
    pub fn snapshot(&self) -> StoreSnapshot {
        let registry = self.read();
        let revision = *self.revision.borrow();
        let sessions = registry
            .sessions
            .iter()
            .map(|(id, slot)| (*id, slot.lock().session.clone()))
            .collect();
        StoreSnapshot {
            sessions,
            selected: registry.selected,
            last_condition: self.enricher.last_condition(),
            revision,
        }
    }

    /// Number of sessions currently held.
    pub fn len(&self) -> usize {
        self.read().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().sessions.is_empty()
    }

    /// The most recent enrichment failure, across all sessions.
    pub fn last_condition(&self) -> Option<ApiCondition> {
        self.enricher.last_condition()
    }

    /// Receiver notified whenever the last enrichment failure changes.
    pub fn conditions(&self) -> watch::Receiver<Option<ApiCondition>> {
        self.enricher.conditions()
    }

    /// Receiver carrying the store revision, bumped on every committed change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    pub fn stats(&self) -> &EnrichmentStats {
        self.enricher.stats()
    }

    /// Cancels all in-flight enrichment. Sessions stay readable.
    pub fn shutdown(&self) {
        log::debug!("Session store shutting down");
        self.shutdown.cancel();
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
