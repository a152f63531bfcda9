//! Ticketed, per-session commit of enriched hops.
//!
//! `append` takes a ticket from the session before the lookup starts. When the
//! lookup finishes, the hop goes through the session's reorder buffer, which
//! only releases hops in ticket order. A hop that finishes early waits until
//! every earlier ticket has landed or `commit_timeout` expires; on expiry the
//! missing tickets are skipped and, if they show up later, appended at the end.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::types::{EnrichedHop, Session, SessionId};

/// Reorder buffer releasing hops in ticket order.
#[derive(Debug, Default)]
pub(crate) struct CommitBuffer {
    next_commit: u64,
    pending: BTreeMap<u64, Arc<EnrichedHop>>,
}

impl CommitBuffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Buffers the hop for `ticket` and returns every hop that is now ready,
    /// in ticket order.
    ///
    /// A ticket that was already skipped is returned immediately so the hop
    /// still lands, after the hops committed in the meantime.
    pub(crate) fn insert(&mut self, ticket: u64, hop: Arc<EnrichedHop>) -> Vec<Arc<EnrichedHop>> {
        if ticket < self.next_commit {
            return vec![hop];
        }
        self.pending.insert(ticket, hop);
        self.drain()
    }

    /// Skips every missing ticket up to and including `ticket`, then releases
    /// what is buffered. Returns the released hops and the skipped tickets.
    pub(crate) fn release_through(&mut self, ticket: u64) -> (Vec<Arc<EnrichedHop>>, Vec<u64>) {
        let mut ready = Vec::new();
        let mut skipped = Vec::new();
        while self.next_commit <= ticket {
            match self.pending.remove(&self.next_commit) {
                Some(hop) => ready.push(hop),
                None => skipped.push(self.next_commit),
            }
            self.next_commit += 1;
        }
        ready.extend(self.drain());
        (ready, skipped)
    }

    /// Whether the hop for `ticket` has left the buffer (committed or skipped).
    pub(crate) fn is_released(&self, ticket: u64) -> bool {
        ticket < self.next_commit
    }

    #[cfg(test)]
    pub(crate) fn buffered(&self) -> usize {
        self.pending.len()
    }

    fn drain(&mut self) -> Vec<Arc<EnrichedHop>> {
        let mut ready = Vec::new();
        while let Some(hop) = self.pending.remove(&self.next_commit) {
            ready.push(hop);
            self.next_commit += 1;
        }
        ready
    }
}

/// How an `append` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The hop is part of the session's hop sequence.
    Committed {
        ticket: u64,
        /// Whether a geolocation record was attached
        located: bool,
    },
    /// The session was removed before the hop could be committed.
    Discarded,
    /// Enrichment was cancelled (session removed or store shut down).
    Cancelled,
}

impl AppendOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, AppendOutcome::Committed { .. })
    }
}

/// Handle to an in-flight `append`.
///
/// The hop's position is already fixed when the handle is returned; awaiting
/// it is optional and only reports the outcome.
#[derive(Debug)]
pub struct AppendHandle {
    session: SessionId,
    ticket: u64,
    task: JoinHandle<AppendOutcome>,
}

impl AppendHandle {
    pub(crate) fn new(session: SessionId, ticket: u64, task: JoinHandle<AppendOutcome>) -> Self {
        Self {
            session,
            ticket,
            task,
        }
    }

    /// Position of the hop within its session's `append` calls.
    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    pub fn session(&self) -> SessionId {
        self.session
    }
}

impl Future for AppendHandle {
    type Output = AppendOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let session = self.session;
        let ticket = self.ticket;
        Pin::new(&mut self.task).poll(cx).map(|result| {
            result.unwrap_or_else(|e| {
                log::error!(
                    "Append task for session {} ticket {} did not finish: {}",
                    session,
                    ticket,
                    e
                );
                AppendOutcome::Cancelled
            })
        })
    }
}

pub(crate) struct SlotState {
    pub(crate) session: Session,
    buffer: CommitBuffer,
    removed: bool,
}

/// One session plus the state guarding its hop sequence.
///
/// The mutex is the per-session critical section: only commits, `finish`
/// and readers of this session contend on it, never other sessions.
pub(crate) struct SessionSlot {
    tickets: AtomicU64,
    state: Mutex<SlotState>,
    flushed: Notify,
    cancel: CancellationToken,
}

impl SessionSlot {
    pub(crate) fn new(session: Session, cancel: CancellationToken) -> Self {
        Self {
            tickets: AtomicU64::new(0),
            state: Mutex::new(SlotState {
                session,
                buffer: CommitBuffer::new(),
                removed: false,
            }),
            flushed: Notify::new(),
            cancel,
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserves the next position in the hop sequence.
    pub(crate) fn issue_ticket(&self) -> u64 {
        self.tickets.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Marks the slot dead and stops its in-flight enrichment.
    ///
    /// Returns the session as it was at removal.
    pub(crate) fn retire(&self) -> Session {
        let session = {
            let mut state = self.lock();
            state.removed = true;
            state.session.clone()
        };
        self.cancel.cancel();
        self.flushed.notify_waiters();
        session
    }

    /// Commits `hop` at `ticket`'s position.
    ///
    /// Waits (without holding the lock) until every earlier ticket is in or
    /// `commit_timeout` expires, whichever comes first.
    pub(crate) async fn commit(
        &self,
        ticket: u64,
        hop: Arc<EnrichedHop>,
        commit_timeout: Duration,
        revision: &watch::Sender<u64>,
    ) -> AppendOutcome {
        let located = hop.has_geo();
        let committed = AppendOutcome::Committed { ticket, located };

        {
            let mut state = self.lock();
            if state.removed {
                log::debug!("Discarding hop ticket {}: session was removed", ticket);
                return AppendOutcome::Discarded;
            }
            let late = state.buffer.is_released(ticket);
            let ready = state.buffer.insert(ticket, hop);
            if late {
                log::warn!(
                    "Session {}: ticket {} arrived after it was skipped, appending at the end",
                    state.session.id,
                    ticket
                );
            }
            self.publish(&mut state, ready, revision);
            if state.buffer.is_released(ticket) {
                return committed;
            }
            log::trace!(
                "Session {}: ticket {} buffered behind {} earlier hop(s)",
                state.session.id,
                ticket,
                ticket - state.buffer.next_commit
            );
        }

        let deadline = Instant::now() + commit_timeout;
        loop {
            let notified = self.flushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let state = self.lock();
                if state.removed {
                    return AppendOutcome::Discarded;
                }
                if state.buffer.is_released(ticket) {
                    return committed;
                }
            }

            // Removal both cancels and notifies; the notification wins so the
            // removed check above reports Discarded.
            tokio::select! {
                biased;
                _ = &mut notified => {}
                _ = self.cancel.cancelled() => return AppendOutcome::Cancelled,
                _ = tokio::time::sleep_until(deadline) => break,
            }
        }

        let mut state = self.lock();
        if state.removed {
            return AppendOutcome::Discarded;
        }
        if !state.buffer.is_released(ticket) {
            let (ready, skipped) = state.buffer.release_through(ticket);
            log::warn!(
                "Session {}: gave up waiting {}ms for ticket(s) {:?}, committing ticket {} out of band",
                state.session.id,
                commit_timeout.as_millis(),
                skipped,
                ticket
            );
            self.publish(&mut state, ready, revision);
        }
        committed
    }

    fn publish(
        &self,
        state: &mut SlotState,
        ready: Vec<Arc<EnrichedHop>>,
        revision: &watch::Sender<u64>,
    ) {
        if ready.is_empty() {
            return;
        }
        for hop in &ready {
            log::debug!(
                "Session {}: committed hop seq={} ip={} geo={}",
                state.session.id,
                hop.observation.seq,
                hop.observation.ip_addr,
                hop.has_geo()
            );
        }
        state.session.hops.extend(ready);
        revision.send_modify(|r| *r += 1);
        self.flushed.notify_waiters();
    }
}
