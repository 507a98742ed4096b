//! Root proxy view: the top-level view unit of an observer session.
//!
//! State is derived from the registry each time the view renders:
//!
//! - `Blocked` whenever the observer carries a block reason, regardless of
//!   the source.
//! - Otherwise follows the source session: `Open` is starting, `Up` is ready,
//!   `Down` is reconnecting, and `Closed` (or gone) is closed.
//!
//! The hosted proxy is discarded whenever the view leaves `SourceReady`; unit
//! ids are not stable across a reconnect, so it is rebuilt from a fresh
//! resolution when the source comes back.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tracing::{debug, info, warn};

use super::{
    message_frames, ProxyParams, ProxyViewUnit, SOURCE_CLOSED_MESSAGE,
    SOURCE_RECONNECTING_MESSAGE, SOURCE_STARTING_MESSAGE, UNAVAILABLE_MESSAGE,
};
use crate::error::RegistryError;
use crate::frames::{Frame, FrameBuffer, UnitId};
use crate::host::{Dispatcher, RenderSink};
use crate::sessions::{SessionEvent, SessionRegistry, SessionStatus, Subscription};
use crate::translate::{push_proxy_block, TreeTranslator};

const OVERLAY_STYLE: &str =
    "position: fixed; left: 0; right: 0; top: 0; bottom: 0; z-index: 1000000; ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootViewState {
    SourceStarting,
    SourceReady { unit_id: UnitId },
    SourceReconnecting,
    SourceClosed,
    Blocked { reason: String },
    /// Ready, but the host-facing root id did not resolve.
    Unavailable,
}

pub struct RootConfig {
    pub registry: SessionRegistry,
    pub translator: Arc<dyn TreeTranslator>,
    pub observer_session_id: String,
    /// Id the host assigned to the source's root view unit.
    pub host_facing_unit_id: UnitId,
    pub use_screen_overlay: bool,
    /// Receives the root view's own frames.
    pub sink: Arc<dyn RenderSink>,
    /// Receives the frames of the proxy view unit the root hosts.
    pub child_sink: Arc<dyn RenderSink>,
    pub dispatcher: Arc<dyn Dispatcher>,
}

struct RootShared {
    config: RootConfig,
    source_session_id: Option<String>,
    diagnostic: bool,
    child: Mutex<Option<ProxyViewUnit>>,
    active: AtomicBool,
}

impl RootShared {
    fn current_state(&self) -> RootViewState {
        let registry = &self.config.registry;
        let observer = registry.lookup(&self.config.observer_session_id);
        if let Some(reason) = observer.as_ref().and_then(|session| session.blocked_reason()) {
            return RootViewState::Blocked {
                reason: reason.to_string(),
            };
        }

        let source = self
            .source_session_id
            .as_deref()
            .and_then(|id| registry.lookup(id));
        match source.map(|session| session.status) {
            Some(SessionStatus::Open) => RootViewState::SourceStarting,
            Some(SessionStatus::Down) => RootViewState::SourceReconnecting,
            Some(SessionStatus::Up) => match registry
                .resolve_view_unit_id(&self.config.observer_session_id, self.config.host_facing_unit_id)
            {
                Ok(unit_id) => RootViewState::SourceReady { unit_id },
                Err(err) => {
                    warn!(
                        session_id = %self.config.observer_session_id,
                        host_facing_unit_id = self.config.host_facing_unit_id,
                        error = %err,
                        "Cannot resolve mirrored root view unit"
                    );
                    RootViewState::Unavailable
                }
            },
            Some(SessionStatus::Closed) | None => RootViewState::SourceClosed,
        }
    }

    /// Re-derives state and renders. `reattach` forces a fresh hosted proxy.
    fn refresh(&self, reattach: bool) {
        if !self.active.load(Ordering::SeqCst) {
            return;
        }
        let state = self.current_state();
        debug!(session_id = %self.config.observer_session_id, state = ?state, "Rendering root proxy view");

        let mut child = self
            .child
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let frames = match &state {
            RootViewState::SourceReady { unit_id } => {
                let keep = !reattach
                    && child
                        .as_ref()
                        .map(|hosted| hosted.params().unit_id == *unit_id)
                        .unwrap_or(false);
                if !keep {
                    drop(child.take());
                    *child = self.attach_child(*unit_id);
                }
                self.ready_frames(*unit_id)
            }
            other => {
                if child.take().is_some() {
                    self.config.child_sink.render(Vec::new());
                }
                match other {
                    RootViewState::Blocked { reason } => message_frames(reason),
                    RootViewState::SourceStarting => message_frames(SOURCE_STARTING_MESSAGE),
                    RootViewState::SourceReconnecting => message_frames(SOURCE_RECONNECTING_MESSAGE),
                    RootViewState::Unavailable => message_frames(UNAVAILABLE_MESSAGE),
                    _ => message_frames(SOURCE_CLOSED_MESSAGE),
                }
            }
        };
        drop(child);
        self.config.sink.render(frames);
    }

    fn attach_child(&self, unit_id: UnitId) -> Option<ProxyViewUnit> {
        let source_session_id = self.source_session_id.clone()?;
        Some(ProxyViewUnit::attach(
            self.config.registry.clone(),
            Arc::clone(&self.config.translator),
            ProxyParams::new(source_session_id, unit_id, self.diagnostic),
            Arc::clone(&self.config.child_sink),
            Arc::clone(&self.config.dispatcher),
        ))
    }

    fn ready_frames(&self, unit_id: UnitId) -> Vec<Frame> {
        let mut buffer = FrameBuffer::new();
        if let Some(source_session_id) = &self.source_session_id {
            push_proxy_block(&mut buffer, 0, None, source_session_id, unit_id, self.diagnostic);
        }
        if self.config.use_screen_overlay && !self.diagnostic {
            buffer.push(Frame::element(4, "div", 2));
            buffer.push(Frame::attribute(5, "style", OVERLAY_STYLE));
        }
        buffer.into_frames()
    }
}

/// Root view unit installed in place of the host's own root in an observer session.
pub struct RootProxyView {
    shared: Arc<RootShared>,
    subscriptions: Vec<Subscription>,
}

impl RootProxyView {
    /// Subscribes to the observer and its source, then renders. Must be called
    /// on the observer's own dispatcher.
    pub fn install(config: RootConfig) -> Result<Self, RegistryError> {
        let observer = config
            .registry
            .lookup(&config.observer_session_id)
            .ok_or_else(|| RegistryError::SessionNotFound(config.observer_session_id.clone()))?;
        let link = observer
            .observer()
            .ok_or_else(|| RegistryError::NotAnObserver(config.observer_session_id.clone()))?;
        let source_session_id = Some(link.source_session_id.clone());
        let diagnostic = link.diagnostic;

        let shared = Arc::new(RootShared {
            config,
            source_session_id,
            diagnostic,
            child: Mutex::new(None),
            active: AtomicBool::new(true),
        });

        let mut subscriptions = Vec::new();
        let registry = &shared.config.registry;
        let dispatcher = &shared.config.dispatcher;

        let weak = Arc::downgrade(&shared);
        let observer_dispatcher = Arc::clone(dispatcher);
        subscriptions.push(registry.subscribe_session(
            &shared.config.observer_session_id,
            move |event| {
                if matches!(event, SessionEvent::Blocked { .. }) {
                    schedule(&observer_dispatcher, &weak, false);
                }
            },
        )?);

        if let Some(source_id) = &shared.source_session_id {
            let weak = Arc::downgrade(&shared);
            let source_dispatcher = Arc::clone(dispatcher);
            match registry.subscribe_session(source_id, move |event| match event {
                SessionEvent::StatusChanged { .. } => schedule(&source_dispatcher, &weak, false),
                SessionEvent::UriChanged { .. } => schedule(&source_dispatcher, &weak, true),
                _ => {}
            }) {
                Ok(subscription) => subscriptions.push(subscription),
                Err(err) => {
                    debug!(source_session_id = %source_id, error = %err, "Source gone before root view installed");
                }
            }
        }

        info!(
            session_id = %shared.config.observer_session_id,
            source_session_id = ?shared.source_session_id,
            diagnostic = shared.diagnostic,
            "Installed root proxy view"
        );
        shared.refresh(false);
        Ok(Self {
            shared,
            subscriptions,
        })
    }

    pub fn state(&self) -> RootViewState {
        self.shared.current_state()
    }

    pub fn hosted_unit_id(&self) -> Option<UnitId> {
        self.shared
            .child
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .map(|hosted| hosted.params().unit_id)
    }

    pub fn teardown(mut self) {
        self.release();
    }

    fn release(&mut self) {
        self.shared.active.store(false, Ordering::SeqCst);
        self.subscriptions.clear();
        let hosted = self
            .shared
            .child
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        drop(hosted);
    }
}

impl Drop for RootProxyView {
    fn drop(&mut self) {
        self.release();
    }
}

fn schedule(dispatcher: &Arc<dyn Dispatcher>, weak: &Weak<RootShared>, reattach: bool) {
    let weak = weak.clone();
    dispatcher.dispatch(Box::new(move || {
        if let Some(shared) = weak.upgrade() {
            shared.refresh(reattach);
        }
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::{FrameKind, UnitType};
    use crate::host::{MemoryHost, QueueDispatcher, RecordingSink, UnitSnapshot};
    use crate::options::ObserverResolution;
    use crate::translate::DefaultTranslator;
    use crate::views::placeholder_text;

    struct Fixture {
        registry: SessionRegistry,
        host: Arc<MemoryHost>,
        dispatcher: Arc<QueueDispatcher>,
        sink: Arc<RecordingSink>,
        child_sink: Arc<RecordingSink>,
    }

    fn fixture(diagnostic: bool) -> Fixture {
        let host = Arc::new(MemoryHost::new());
        let registry = SessionRegistry::new(host.clone(), ObserverResolution::Reject);
        registry.session_opened("src", 1).unwrap();
        host.set_unit(
            1,
            3,
            UnitSnapshot {
                unit_type: Some(UnitType::new("App")),
                frames: vec![Frame::text(0, "hello")],
            },
        );
        host.map_unit_id(1, 100, 3);
        registry
            .register_pending_observer("obs", "src", None, diagnostic)
            .unwrap();
        registry.session_opened("obs", 2).unwrap();
        Fixture {
            registry,
            host,
            dispatcher: Arc::new(QueueDispatcher::new()),
            sink: Arc::new(RecordingSink::new()),
            child_sink: Arc::new(RecordingSink::new()),
        }
    }

    fn install(fx: &Fixture, use_screen_overlay: bool) -> RootProxyView {
        RootProxyView::install(RootConfig {
            registry: fx.registry.clone(),
            translator: Arc::new(DefaultTranslator),
            observer_session_id: "obs".to_string(),
            host_facing_unit_id: 100,
            use_screen_overlay,
            sink: fx.sink.clone(),
            child_sink: fx.child_sink.clone(),
            dispatcher: fx.dispatcher.clone(),
        })
        .unwrap()
    }

    fn last_text(sink: &RecordingSink) -> Option<String> {
        sink.last()
            .and_then(|frames| placeholder_text(&frames).map(str::to_string))
    }

    #[test]
    fn starting_until_source_is_up() {
        let fx = fixture(false);
        let root = install(&fx, true);
        assert_eq!(root.state(), RootViewState::SourceStarting);
        assert_eq!(last_text(&fx.sink).as_deref(), Some(SOURCE_STARTING_MESSAGE));
        assert_eq!(root.hosted_unit_id(), None);
    }

    #[test]
    fn ready_hosts_resolved_proxy_with_overlay() {
        let fx = fixture(false);
        let root = install(&fx, true);
        fx.registry
            .session_status_changed("src", SessionStatus::Up)
            .unwrap();
        fx.dispatcher.run_pending();

        assert_eq!(root.state(), RootViewState::SourceReady { unit_id: 3 });
        assert_eq!(root.hosted_unit_id(), Some(3));
        let frames = fx.sink.last().unwrap();
        assert_eq!(frames.len(), 6);
        assert!(matches!(frames[0].kind, FrameKind::ViewUnit { unit_id: 3, .. }));
        assert_eq!(frames[5], Frame::attribute(5, "style", OVERLAY_STYLE));
        assert_eq!(fx.child_sink.last(), Some(vec![Frame::text(0, "hello")]));
    }

    #[test]
    fn diagnostic_root_has_no_overlay() {
        let fx = fixture(true);
        let _root = install(&fx, true);
        fx.registry
            .session_status_changed("src", SessionStatus::Up)
            .unwrap();
        fx.dispatcher.run_pending();
        assert_eq!(fx.sink.last().unwrap().len(), 4);
    }

    #[test]
    fn reconnect_discards_hosted_proxy() {
        let fx = fixture(false);
        let root = install(&fx, false);
        fx.registry
            .session_status_changed("src", SessionStatus::Up)
            .unwrap();
        fx.dispatcher.run_pending();
        fx.registry
            .session_status_changed("src", SessionStatus::Down)
            .unwrap();
        fx.dispatcher.run_pending();

        assert_eq!(root.state(), RootViewState::SourceReconnecting);
        assert_eq!(root.hosted_unit_id(), None);
        assert_eq!(last_text(&fx.sink).as_deref(), Some(SOURCE_RECONNECTING_MESSAGE));
        assert_eq!(fx.child_sink.last(), Some(vec![]));

        fx.host.map_unit_id(1, 100, 4);
        fx.host.set_unit(
            1,
            4,
            UnitSnapshot {
                unit_type: Some(UnitType::new("App")),
                frames: vec![Frame::text(0, "back")],
            },
        );
        fx.registry
            .session_status_changed("src", SessionStatus::Up)
            .unwrap();
        fx.dispatcher.run_pending();
        assert_eq!(root.hosted_unit_id(), Some(4));
        assert_eq!(fx.child_sink.last(), Some(vec![Frame::text(0, "back")]));
    }

    #[test]
    fn source_close_is_terminal() {
        let fx = fixture(false);
        let root = install(&fx, false);
        fx.registry
            .session_status_changed("src", SessionStatus::Closed)
            .unwrap();
        fx.dispatcher.run_pending();
        assert_eq!(root.state(), RootViewState::SourceClosed);
        assert_eq!(last_text(&fx.sink).as_deref(), Some(SOURCE_CLOSED_MESSAGE));
    }

    #[test]
    fn blocked_overrides_ready() {
        let fx = fixture(false);
        let root = install(&fx, false);
        fx.registry
            .session_status_changed("src", SessionStatus::Up)
            .unwrap();
        fx.dispatcher.run_pending();

        fx.host.set_uri(2, "https://app.example/elsewhere");
        fx.registry.notify_uri_changed(2);
        fx.dispatcher.run_pending();
        assert!(matches!(root.state(), RootViewState::Blocked { .. }));
        assert_eq!(root.hosted_unit_id(), None);
        assert!(last_text(&fx.sink)
            .unwrap()
            .contains("tried to navigate"));
    }

    #[test]
    fn source_navigation_rebuilds_hosted_proxy() {
        let fx = fixture(false);
        let root = install(&fx, false);
        fx.registry
            .session_status_changed("src", SessionStatus::Up)
            .unwrap();
        fx.dispatcher.run_pending();
        let renders_before = fx.child_sink.count();

        fx.host.set_uri(1, "https://app.example/other");
        fx.registry.notify_uri_changed(1);
        fx.dispatcher.run_pending();
        assert_eq!(root.hosted_unit_id(), Some(3));
        assert_eq!(fx.child_sink.count(), renders_before + 1);
    }

    #[test]
    fn unresolvable_root_is_unavailable() {
        let fx = fixture(false);
        let root = RootProxyView::install(RootConfig {
            registry: fx.registry.clone(),
            translator: Arc::new(DefaultTranslator),
            observer_session_id: "obs".to_string(),
            host_facing_unit_id: 555,
            use_screen_overlay: false,
            sink: fx.sink.clone(),
            child_sink: fx.child_sink.clone(),
            dispatcher: fx.dispatcher.clone(),
        })
        .unwrap();
        fx.registry
            .session_status_changed("src", SessionStatus::Up)
            .unwrap();
        fx.dispatcher.run_pending();
        assert_eq!(root.state(), RootViewState::Unavailable);
        assert_eq!(last_text(&fx.sink).as_deref(), Some(UNAVAILABLE_MESSAGE));
    }

    #[test]
    fn install_requires_observer() {
        let fx = fixture(false);
        let result = RootProxyView::install(RootConfig {
            registry: fx.registry.clone(),
            translator: Arc::new(DefaultTranslator),
            observer_session_id: "src".to_string(),
            host_facing_unit_id: 100,
            use_screen_overlay: false,
            sink: fx.sink.clone(),
            child_sink: fx.child_sink.clone(),
            dispatcher: fx.dispatcher.clone(),
        });
        assert!(matches!(result, Err(RegistryError::NotAnObserver(_))));
    }
}
