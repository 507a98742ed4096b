//! Concurrent directory of live sessions.
//!
//! One mutex guards the primary index (id), the render-target index, the
//! pending-observer staging table and all listener lists. Every mutation
//! completes before listeners run, and listeners run before the lock is
//! released, so they observe a consistent registry but must never call back
//! into it. Host lookups (URIs, frames, id resolution) happen outside the lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chrono::Utc;
use tracing::{debug, info, warn};

use liveview_protocol::SessionSummary;

use super::events::{RegistryEvent, RegistryListener, SessionEvent, SessionListener};
use super::session::{ObserverLink, RenderTarget, Session, SessionFilter, SessionKind};
use super::status::{transition, SessionStatus, Transition};
use crate::error::RegistryError;
use crate::frames::UnitId;
use crate::host::{HostRenderer, UnitSnapshot};
use crate::options::{LiveViewOptions, ObserverResolution};

pub const NAVIGATION_BLOCKED_REASON: &str =
    "This mirror tried to navigate away from the source session's location and has been stopped.";

/// Staged link for a session that has not opened yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingObserver {
    pub source_session_id: String,
    pub parent_session_id: Option<String>,
    pub diagnostic: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    Applied {
        from: SessionStatus,
        to: SessionStatus,
    },
    Unchanged,
}

/// Which root view unit the host should install for a render target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootDecision {
    /// Not an observer; install whatever the host normally would.
    Host,
    Mirror {
        observer_session_id: String,
        source_session_id: String,
        diagnostic: bool,
    },
}

struct SessionEntry {
    session: Session,
    listeners: Vec<(u64, SessionListener)>,
}

#[derive(Default)]
struct RegistryState {
    sessions: HashMap<String, SessionEntry>,
    by_target: HashMap<RenderTarget, String>,
    pending: HashMap<String, PendingObserver>,
    listeners: Vec<(u64, RegistryListener)>,
    next_subscription: u64,
}

impl RegistryState {
    fn next_id(&mut self) -> u64 {
        self.next_subscription += 1;
        self.next_subscription
    }

    fn emit(&self, event: &RegistryEvent) {
        for (_, listener) in &self.listeners {
            listener(event);
        }
    }

    fn emit_session(&self, session_id: &str, event: &SessionEvent) {
        if let Some(entry) = self.sessions.get(session_id) {
            for (_, listener) in &entry.listeners {
                listener(event);
            }
        }
    }

    fn session_by_target(&self, target: RenderTarget) -> Option<&Session> {
        self.by_target
            .get(&target)
            .and_then(|id| self.sessions.get(id))
            .map(|entry| &entry.session)
    }
}

pub(crate) struct RegistryInner {
    state: Mutex<RegistryState>,
    host: Arc<dyn HostRenderer>,
    resolution: ObserverResolution,
}

impl RegistryInner {
    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SubscriptionScope {
    Registry,
    Session(String),
}

/// Keeps a listener registered; dropping it unsubscribes.
///
/// Must not be dropped from inside a listener.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    registry: Weak<RegistryInner>,
    scope: SubscriptionScope,
    id: u64,
    active: bool,
}

impl Subscription {
    pub fn cancel(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        let Some(inner) = self.registry.upgrade() else {
            return;
        };
        let mut state = inner.lock();
        // Listeners are dropped after the lock is released.
        match &self.scope {
            SubscriptionScope::Registry => {
                let removed = take_listener(&mut state.listeners, self.id);
                drop(state);
                drop(removed);
            }
            SubscriptionScope::Session(session_id) => {
                let removed = state
                    .sessions
                    .get_mut(session_id)
                    .and_then(|entry| take_listener(&mut entry.listeners, self.id));
                drop(state);
                drop(removed);
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

fn take_listener<T>(listeners: &mut Vec<(u64, T)>, id: u64) -> Option<T> {
    let pos = listeners.iter().position(|(existing, _)| *existing == id)?;
    Some(listeners.remove(pos).1)
}

#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

impl SessionRegistry {
    pub fn new(host: Arc<dyn HostRenderer>, resolution: ObserverResolution) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                state: Mutex::new(RegistryState::default()),
                host,
                resolution,
            }),
        }
    }

    pub fn with_options(host: Arc<dyn HostRenderer>, options: &LiveViewOptions) -> Self {
        Self::new(host, options.observer_resolution)
    }

    pub fn host(&self) -> &Arc<dyn HostRenderer> {
        &self.inner.host
    }

    // ─────────────────────────────────────────────────────────────────────
    // Staging and lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Records that the session about to open as `predicted_id` observes `source_id`.
    pub fn register_pending_observer(
        &self,
        predicted_id: &str,
        source_id: &str,
        parent_id: Option<&str>,
        diagnostic: bool,
    ) -> Result<(), RegistryError> {
        let mut state = self.inner.lock();
        if state.pending.contains_key(predicted_id) {
            warn!(session_id = %predicted_id, "Observer already staged");
            return Err(RegistryError::PendingConflict(predicted_id.to_string()));
        }
        if state.sessions.contains_key(predicted_id) {
            warn!(session_id = %predicted_id, "Cannot stage observer for a live session");
            return Err(RegistryError::AlreadyTracked(predicted_id.to_string()));
        }
        state.pending.insert(
            predicted_id.to_string(),
            PendingObserver {
                source_session_id: source_id.to_string(),
                parent_session_id: parent_id.map(str::to_string),
                diagnostic,
            },
        );
        info!(
            session_id = %predicted_id,
            source_session_id = %source_id,
            diagnostic,
            "Staged pending observer"
        );
        Ok(())
    }

    /// Drops a staged observer whose connection never opened.
    pub fn cancel_pending_observer(&self, predicted_id: &str) -> Option<PendingObserver> {
        let removed = self.inner.lock().pending.remove(predicted_id);
        if removed.is_some() {
            debug!(session_id = %predicted_id, "Cancelled pending observer");
        }
        removed
    }

    pub fn pending_observer(&self, predicted_id: &str) -> Option<PendingObserver> {
        self.inner.lock().pending.get(predicted_id).cloned()
    }

    pub fn session_opened(&self, id: &str, target: RenderTarget) -> Result<Session, RegistryError> {
        let uri = self.inner.host.current_uri(target);

        let mut state = self.inner.lock();
        if state.sessions.contains_key(id) {
            warn!(session_id = %id, "Session opened twice");
            return Err(RegistryError::AlreadyTracked(id.to_string()));
        }
        if let Some(owner) = state.by_target.get(&target) {
            warn!(session_id = %id, render_target = target, owner = %owner, "Render target already owned");
            return Err(RegistryError::RenderTargetInUse {
                target,
                owner: owner.clone(),
            });
        }

        let kind = match state.pending.remove(id) {
            None => SessionKind::Regular,
            Some(pending) => match resolve_source(&state, &pending.source_session_id) {
                Ok(()) => SessionKind::Observer(ObserverLink {
                    source_session_id: pending.source_session_id,
                    parent_session_id: pending.parent_session_id,
                    diagnostic: pending.diagnostic,
                    blocked_reason: None,
                }),
                Err(err) => match self.inner.resolution {
                    ObserverResolution::Reject => {
                        warn!(session_id = %id, error = %err, "Rejecting observer session");
                        return Err(err);
                    }
                    ObserverResolution::Degrade => {
                        warn!(
                            session_id = %id,
                            error = %err,
                            "Observer source unavailable; tracking as regular session"
                        );
                        SessionKind::Regular
                    }
                },
            },
        };

        let session = Session::new(id.to_string(), kind, target, uri);
        state.by_target.insert(target, id.to_string());
        state.sessions.insert(
            id.to_string(),
            SessionEntry {
                session: session.clone(),
                listeners: Vec::new(),
            },
        );
        info!(
            session_id = %id,
            render_target = target,
            observer = session.is_observer(),
            "Session opened"
        );
        state.emit(&RegistryEvent::Opened(session.clone()));
        Ok(session)
    }

    /// Applies a lifecycle transition. Rejected transitions are logged and
    /// reported; the registry is left untouched.
    pub fn session_status_changed(
        &self,
        id: &str,
        status: SessionStatus,
    ) -> Result<StatusChange, RegistryError> {
        let mut state = self.inner.lock();
        let Some(entry) = state.sessions.get_mut(id) else {
            warn!(session_id = %id, status = ?status, "Status change for unknown session");
            return Err(RegistryError::InvalidTransition {
                session_id: id.to_string(),
                from: None,
                to: status,
            });
        };

        let from = entry.session.status;
        match transition(from, status) {
            Transition::Unchanged => return Ok(StatusChange::Unchanged),
            Transition::Rejected => {
                warn!(session_id = %id, from = ?from, to = ?status, "Ignoring invalid status transition");
                return Err(RegistryError::InvalidTransition {
                    session_id: id.to_string(),
                    from: Some(from),
                    to: status,
                });
            }
            Transition::Applied => {}
        }

        entry.session.status = status;
        entry.session.status_changed_at = Utc::now();
        info!(session_id = %id, from = ?from, to = ?status, "Session status changed");
        state.emit_session(id, &SessionEvent::StatusChanged { from, to: status });

        if status == SessionStatus::Closed {
            let staged = state.pending.len();
            state
                .pending
                .retain(|_, pending| pending.source_session_id != id);
            let dropped = staged - state.pending.len();
            if dropped > 0 {
                debug!(session_id = %id, dropped, "Dropped observers staged against closed session");
            }
            if let Some(removed) = state.sessions.remove(id) {
                state.by_target.remove(&removed.session.render_target);
                state.emit(&RegistryEvent::Closed(removed.session.clone()));
                drop(state);
                drop(removed);
            }
        }
        Ok(StatusChange::Applied { from, to: status })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Host notifications
    // ─────────────────────────────────────────────────────────────────────

    pub fn notify_view_unit_rerendered(&self, target: RenderTarget, unit_id: UnitId) {
        let state = self.inner.lock();
        let Some(session) = state.session_by_target(target) else {
            debug!(render_target = target, unit_id, "Rerender for untracked render target");
            return;
        };
        if session.is_observer() {
            return;
        }
        let session_id = session.id.clone();
        debug!(session_id = %session_id, unit_id, "View unit rerendered");
        state.emit_session(&session_id, &SessionEvent::Rerendered { unit_id });
    }

    pub fn notify_uri_changed(&self, target: RenderTarget) {
        let uri = self.inner.host.current_uri(target);

        let mut state = self.inner.lock();
        let Some(session_id) = state.by_target.get(&target).cloned() else {
            debug!(render_target = target, "URI change for untracked render target");
            return;
        };
        let Some(entry) = state.sessions.get_mut(&session_id) else {
            return;
        };

        if entry.session.uri == uri {
            return;
        }

        match &mut entry.session.kind {
            SessionKind::Observer(link) => {
                warn!(session_id = %session_id, uri = ?uri, "Observer session attempted to navigate");
                link.blocked_reason = Some(NAVIGATION_BLOCKED_REASON.to_string());
                state.emit_session(
                    &session_id,
                    &SessionEvent::Blocked {
                        reason: NAVIGATION_BLOCKED_REASON.to_string(),
                    },
                );
            }
            SessionKind::Regular => {
                entry.session.uri = uri.clone();
                debug!(session_id = %session_id, uri = ?uri, "Session location changed");
                state.emit_session(&session_id, &SessionEvent::UriChanged { uri });
            }
        }
    }

    /// Marks an observer as blocked. Calling it again replaces the reason.
    pub fn set_blocked(&self, observer_id: &str, reason: &str) -> Result<(), RegistryError> {
        let mut state = self.inner.lock();
        let entry = state
            .sessions
            .get_mut(observer_id)
            .ok_or_else(|| RegistryError::SessionNotFound(observer_id.to_string()))?;
        let SessionKind::Observer(link) = &mut entry.session.kind else {
            return Err(RegistryError::NotAnObserver(observer_id.to_string()));
        };
        link.blocked_reason = Some(reason.to_string());
        warn!(session_id = %observer_id, reason = %reason, "Observer session blocked");
        state.emit_session(
            observer_id,
            &SessionEvent::Blocked {
                reason: reason.to_string(),
            },
        );
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Host hooks
    // ─────────────────────────────────────────────────────────────────────

    /// Root-type resolution hook: observers get the root proxy view.
    pub fn root_decision(&self, target: RenderTarget) -> RootDecision {
        let state = self.inner.lock();
        match state.session_by_target(target).map(|session| (&session.id, &session.kind)) {
            Some((id, SessionKind::Observer(link))) => RootDecision::Mirror {
                observer_session_id: id.clone(),
                source_session_id: link.source_session_id.clone(),
                diagnostic: link.diagnostic,
            },
            _ => RootDecision::Host,
        }
    }

    /// Interaction intercept: calls originating from an observer are discarded.
    pub fn should_dispatch_interaction(&self, target: RenderTarget) -> bool {
        let state = self.inner.lock();
        match state.session_by_target(target) {
            Some(session) if session.is_observer() => {
                debug!(session_id = %session.id, "Discarding interaction from observer session");
                false
            }
            _ => true,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────

    pub fn lookup(&self, id: &str) -> Option<Session> {
        self.inner
            .lock()
            .sessions
            .get(id)
            .map(|entry| entry.session.clone())
    }

    pub fn lookup_by_render_target(&self, target: RenderTarget) -> Option<Session> {
        self.inner.lock().session_by_target(target).cloned()
    }

    /// Snapshot of tracked sessions, oldest first.
    pub fn list_sessions(&self, filter: Option<SessionFilter>) -> Vec<Session> {
        let mut sessions: Vec<Session> = {
            let state = self.inner.lock();
            state
                .sessions
                .values()
                .map(|entry| &entry.session)
                .filter(|session| filter.map(|f| f.matches(session)).unwrap_or(true))
                .cloned()
                .collect()
        };
        sessions.sort_by(|a, b| a.opened_at.cmp(&b.opened_at).then_with(|| a.id.cmp(&b.id)));
        sessions
    }

    pub fn summaries(&self, filter: Option<SessionFilter>) -> Vec<SessionSummary> {
        self.list_sessions(filter)
            .iter()
            .map(Session::summary)
            .collect()
    }

    pub fn session_count(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    /// Maps the host-facing id an observer was given to the source's live id.
    pub fn resolve_view_unit_id(
        &self,
        observer_id: &str,
        host_facing_id: UnitId,
    ) -> Result<UnitId, RegistryError> {
        let (source_id, source_target) = {
            let state = self.inner.lock();
            let observer = state
                .sessions
                .get(observer_id)
                .ok_or_else(|| RegistryError::SessionNotFound(observer_id.to_string()))?;
            let link = observer
                .session
                .observer()
                .ok_or_else(|| RegistryError::NotAnObserver(observer_id.to_string()))?;
            let source = state
                .sessions
                .get(&link.source_session_id)
                .ok_or_else(|| RegistryError::SourceNotFound(link.source_session_id.clone()))?;
            (source.session.id.clone(), source.session.render_target)
        };
        self.inner
            .host
            .resolve_unit_id(source_target, host_facing_id)
            .ok_or(RegistryError::UnitNotFound {
                session_id: source_id,
                unit_id: host_facing_id,
            })
    }

    /// Current frames of one view unit of a regular session.
    pub fn view_unit_snapshot(
        &self,
        session_id: &str,
        unit_id: UnitId,
    ) -> Result<Option<UnitSnapshot>, RegistryError> {
        let target = {
            let state = self.inner.lock();
            let entry = state
                .sessions
                .get(session_id)
                .ok_or_else(|| RegistryError::SessionNotFound(session_id.to_string()))?;
            if entry.session.is_observer() {
                return Err(RegistryError::ObserverNotObservable {
                    session_id: session_id.to_string(),
                });
            }
            entry.session.render_target
        };
        Ok(self.inner.host.unit_frames(target, unit_id))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Subscriptions
    // ─────────────────────────────────────────────────────────────────────

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&RegistryEvent) + Send + Sync + 'static,
    {
        let mut state = self.inner.lock();
        let id = state.next_id();
        state.listeners.push((id, Arc::new(listener)));
        Subscription {
            registry: Arc::downgrade(&self.inner),
            scope: SubscriptionScope::Registry,
            id,
            active: true,
        }
    }

    /// Listens to one session's events until the subscription is dropped or
    /// the session closes.
    pub fn subscribe_session<F>(&self, session_id: &str, listener: F) -> Result<Subscription, RegistryError>
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        let mut state = self.inner.lock();
        let id = state.next_id();
        let entry = state
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| RegistryError::SessionNotFound(session_id.to_string()))?;
        entry.listeners.push((id, Arc::new(listener)));
        Ok(Subscription {
            registry: Arc::downgrade(&self.inner),
            scope: SubscriptionScope::Session(session_id.to_string()),
            id,
            active: true,
        })
    }
}

fn resolve_source(state: &RegistryState, source_id: &str) -> Result<(), RegistryError> {
    match state.sessions.get(source_id) {
        None => Err(RegistryError::SourceNotFound(source_id.to_string())),
        Some(entry) if entry.session.is_observer() => {
            Err(RegistryError::SourceIsObserver(source_id.to_string()))
        }
        Some(_) => Ok(()),
    }
}
