use std::sync::Arc;

use super::{Session, SessionStatus};
use crate::frames::UnitId;

/// Directory-wide notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryEvent {
    Opened(Session),
    Closed(Session),
}

/// Notifications scoped to one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StatusChanged {
        from: SessionStatus,
        to: SessionStatus,
    },
    /// A view unit of a regular session finished rendering.
    Rerendered { unit_id: UnitId },
    UriChanged { uri: Option<String> },
    /// An observer session was caught acting like a normal one.
    Blocked { reason: String },
}

/// Listeners run on the notifying thread while the registry lock is held.
/// They must return quickly and must not call back into the registry.
pub type RegistryListener = Arc<dyn Fn(&RegistryEvent) + Send + Sync>;
pub type SessionListener = Arc<dyn Fn(&SessionEvent) + Send + Sync>;
