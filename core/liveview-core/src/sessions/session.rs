use chrono::{DateTime, Utc};
use serde::Serialize;

use liveview_protocol::{ConnectionStatus, SessionKindTag, SessionSummary};

use super::SessionStatus;

/// Host-level handle of the renderer that owns a session's view units.
pub type RenderTarget = u64;

/// What an observer session mirrors and how.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObserverLink {
    pub source_session_id: String,
    pub parent_session_id: Option<String>,
    pub diagnostic: bool,
    /// Set once the observer tried to act like a normal session; never cleared.
    pub blocked_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SessionKind {
    Regular,
    Observer(ObserverLink),
}

/// Point-in-time copy of one tracked session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub id: String,
    pub kind: SessionKind,
    pub status: SessionStatus,
    pub opened_at: DateTime<Utc>,
    pub status_changed_at: DateTime<Utc>,
    pub render_target: RenderTarget,
    pub uri: Option<String>,
}

impl Session {
    pub(crate) fn new(id: String, kind: SessionKind, render_target: RenderTarget, uri: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            kind,
            status: SessionStatus::Open,
            opened_at: now,
            status_changed_at: now,
            render_target,
            uri,
        }
    }

    pub fn is_observer(&self) -> bool {
        matches!(self.kind, SessionKind::Observer(_))
    }

    pub fn observer(&self) -> Option<&ObserverLink> {
        match &self.kind {
            SessionKind::Observer(link) => Some(link),
            SessionKind::Regular => None,
        }
    }

    pub fn blocked_reason(&self) -> Option<&str> {
        self.observer()
            .and_then(|link| link.blocked_reason.as_deref())
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        ConnectionStatus::from(self.status)
    }

    pub fn summary(&self) -> SessionSummary {
        let link = self.observer();
        SessionSummary {
            id: self.id.clone(),
            kind: if link.is_some() {
                SessionKindTag::Observer
            } else {
                SessionKindTag::Regular
            },
            status: self.status,
            connection: self.connection_status(),
            opened_at: self.opened_at.to_rfc3339(),
            uri: self.uri.clone(),
            source_session_id: link.map(|link| link.source_session_id.clone()),
            parent_session_id: link.and_then(|link| link.parent_session_id.clone()),
            diagnostic: link.map(|link| link.diagnostic).unwrap_or(false),
            blocked_reason: self.blocked_reason().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionFilter {
    Regular,
    Observer,
}

impl SessionFilter {
    pub fn matches(&self, session: &Session) -> bool {
        match self {
            SessionFilter::Regular => !session.is_observer(),
            SessionFilter::Observer => session.is_observer(),
        }
    }
}
