//! Traceroute sessions and their hop sequences.

mod commit;
mod store;
mod types;
mod view;

pub use commit::{AppendHandle, AppendOutcome};
pub use store::{SessionStore, StoreSnapshot};
pub use types::{EnrichedHop, HopObservation, Session, SessionConfig, SessionId, TraceSettings};
pub use view::{current_session, SessionView};
