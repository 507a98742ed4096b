//! Proxy view unit: mirrors one view unit of a regular session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tracing::{debug, error, warn};

use super::{error_frames, message_frames, UNAVAILABLE_MESSAGE};
use crate::error::{RegistryError, ViewError};
use crate::frames::{AttributeValue, Frame, UnitId};
use crate::host::{Dispatcher, RenderSink};
use crate::sessions::{SessionEvent, SessionRegistry, SessionStatus, Subscription};
use crate::translate::{
    RenderMode, TranslationContext, TreeTranslator, PARAM_DIAGNOSTIC, PARAM_SESSION_ID,
    PARAM_UNIT_ID,
};

/// Parameters carried by a proxy block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyParams {
    pub session_id: String,
    pub unit_id: UnitId,
    pub diagnostic: bool,
}

impl ProxyParams {
    pub fn new(session_id: impl Into<String>, unit_id: UnitId, diagnostic: bool) -> Self {
        Self {
            session_id: session_id.into(),
            unit_id,
            diagnostic,
        }
    }

    /// Reads the parameters from a proxy block's attribute frames. Session id
    /// and unit id are mandatory; the diagnostic flag defaults to off.
    pub fn from_attributes(attributes: &[Frame]) -> Result<Self, ViewError> {
        let find = |name: &str| {
            attributes
                .iter()
                .find(|frame| frame.attribute_name() == Some(name))
                .and_then(Frame::attribute_value)
        };

        let session_id = match find(PARAM_SESSION_ID) {
            None | Some(AttributeValue::Null) => {
                return Err(ViewError::MissingParameter(PARAM_SESSION_ID))
            }
            Some(value) => value
                .as_str()
                .filter(|value| !value.is_empty())
                .map(str::to_string)
                .ok_or(ViewError::InvalidParameter {
                    name: PARAM_SESSION_ID,
                })?,
        };

        let unit_id = match find(PARAM_UNIT_ID) {
            None | Some(AttributeValue::Null) => return Err(ViewError::MissingParameter(PARAM_UNIT_ID)),
            Some(value) => value
                .as_int()
                .and_then(|value| UnitId::try_from(value).ok())
                .ok_or(ViewError::InvalidParameter {
                    name: PARAM_UNIT_ID,
                })?,
        };

        let diagnostic = match find(PARAM_DIAGNOSTIC) {
            None | Some(AttributeValue::Null) => false,
            Some(value) => value.as_bool().ok_or(ViewError::InvalidParameter {
                name: PARAM_DIAGNOSTIC,
            })?,
        };

        Ok(Self {
            session_id,
            unit_id,
            diagnostic,
        })
    }

    pub fn mode(&self) -> RenderMode {
        RenderMode::from_diagnostic(self.diagnostic)
    }
}

struct ProxyShared {
    registry: SessionRegistry,
    translator: Arc<dyn TreeTranslator>,
    params: ProxyParams,
    sink: Arc<dyn RenderSink>,
    active: AtomicBool,
}

impl ProxyShared {
    fn render(&self) {
        if !self.active.load(Ordering::SeqCst) {
            return;
        }
        let frames = self.build_frames();
        self.sink.render(frames);
    }

    fn build_frames(&self) -> Vec<Frame> {
        let ProxyParams {
            session_id,
            unit_id,
            ..
        } = &self.params;

        let snapshot = match self.registry.view_unit_snapshot(session_id, *unit_id) {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) | Err(RegistryError::SessionNotFound(_)) => {
                debug!(session_id = %session_id, unit_id = *unit_id, "Mirrored view unit is gone");
                return message_frames(UNAVAILABLE_MESSAGE);
            }
            Err(err) => {
                error!(session_id = %session_id, unit_id = *unit_id, error = %err, "Cannot mirror view unit");
                return error_frames(&err.to_string());
            }
        };

        let ctx = TranslationContext::new(session_id.clone(), *unit_id, snapshot.unit_type);
        match self
            .translator
            .translate(&snapshot.frames, &ctx, self.params.mode())
        {
            Ok(frames) => frames,
            Err(err) => {
                error!(
                    session_id = %session_id,
                    unit_id = *unit_id,
                    error = %err,
                    frames = ?snapshot.frames,
                    "Failed to translate view unit"
                );
                error_frames(&err.to_string())
            }
        }
    }

    fn blank(&self) {
        if self.active.load(Ordering::SeqCst) {
            self.sink.render(Vec::new());
        }
    }
}

/// Mirrors one view unit of a regular session into an observer session.
///
/// Rerender notifications arrive on the source session's thread; each one is
/// handed to the observer's dispatcher, which re-fetches and re-translates the
/// unit. Dropping the proxy (or calling `teardown`) releases its subscription
/// and discards any render still queued.
pub struct ProxyViewUnit {
    shared: Arc<ProxyShared>,
    subscription: Option<Subscription>,
}

impl ProxyViewUnit {
    /// Subscribes to the source session and renders immediately. Must be
    /// called on the observer's own dispatcher.
    pub fn attach(
        registry: SessionRegistry,
        translator: Arc<dyn TreeTranslator>,
        params: ProxyParams,
        sink: Arc<dyn RenderSink>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        let shared = Arc::new(ProxyShared {
            registry,
            translator,
            params,
            sink,
            active: AtomicBool::new(true),
        });

        let weak = Arc::downgrade(&shared);
        let observed = shared.params.unit_id;
        let subscription = shared.registry.subscribe_session(
            &shared.params.session_id,
            move |event| match event {
                SessionEvent::Rerendered { unit_id } if *unit_id == observed => {
                    schedule(&dispatcher, &weak, ProxyShared::render);
                }
                SessionEvent::StatusChanged {
                    to: SessionStatus::Closed,
                    ..
                } => {
                    schedule(&dispatcher, &weak, ProxyShared::blank);
                }
                _ => {}
            },
        );

        let subscription = match subscription {
            Ok(subscription) => Some(subscription),
            Err(err) => {
                warn!(
                    session_id = %shared.params.session_id,
                    unit_id = shared.params.unit_id,
                    error = %err,
                    "Proxy attached to an untracked session"
                );
                None
            }
        };

        shared.render();
        Self {
            shared,
            subscription,
        }
    }

    /// Builds a proxy from a proxy block's attributes. Missing parameters are fatal.
    pub fn from_block(
        registry: SessionRegistry,
        translator: Arc<dyn TreeTranslator>,
        attributes: &[Frame],
        sink: Arc<dyn RenderSink>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Result<Self, ViewError> {
        let params = ProxyParams::from_attributes(attributes)?;
        Ok(Self::attach(registry, translator, params, sink, dispatcher))
    }

    pub fn params(&self) -> &ProxyParams {
        &self.shared.params
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    /// Re-renders on the calling thread.
    pub fn refresh(&self) {
        self.shared.render();
    }

    pub fn teardown(mut self) {
        self.release();
    }

    fn release(&mut self) {
        self.shared.active.store(false, Ordering::SeqCst);
        self.subscription.take();
    }
}

impl Drop for ProxyViewUnit {
    fn drop(&mut self) {
        self.release();
    }
}

fn schedule(dispatcher: &Arc<dyn Dispatcher>, weak: &Weak<ProxyShared>, action: fn(&ProxyShared)) {
    let weak = weak.clone();
    dispatcher.dispatch(Box::new(move || {
        if let Some(shared) = weak.upgrade() {
            action(&shared);
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
    }

    fn fixture() -> Fixture {
        let host = Arc::new(MemoryHost::new());
        let registry = SessionRegistry::new(host.clone(), ObserverResolution::Reject);
        registry.session_opened("src", 1).unwrap();
        host.set_unit(
            1,
            7,
            UnitSnapshot {
                unit_type: Some(UnitType::new("Counter")),
                frames: vec![Frame::text(0, "count: 0")],
            },
        );
        Fixture {
            registry,
            host,
            dispatcher: Arc::new(QueueDispatcher::new()),
            sink: Arc::new(RecordingSink::new()),
        }
    }

    fn attach(fx: &Fixture, unit_id: UnitId) -> ProxyViewUnit {
        ProxyViewUnit::attach(
            fx.registry.clone(),
            Arc::new(DefaultTranslator),
            ProxyParams::new("src", unit_id, false),
            fx.sink.clone(),
            fx.dispatcher.clone(),
        )
    }

    #[test]
    fn params_require_session_and_unit() {
        assert_eq!(
            ProxyParams::from_attributes(&[Frame::attribute(0, PARAM_UNIT_ID, 3i64)]),
            Err(ViewError::MissingParameter(PARAM_SESSION_ID))
        );
        assert_eq!(
            ProxyParams::from_attributes(&[Frame::attribute(0, PARAM_SESSION_ID, "s")]),
            Err(ViewError::MissingParameter(PARAM_UNIT_ID))
        );
        assert_eq!(
            ProxyParams::from_attributes(&[
                Frame::attribute(0, PARAM_SESSION_ID, "s"),
                Frame::attribute(1, PARAM_UNIT_ID, -1i64),
            ]),
            Err(ViewError::InvalidParameter {
                name: PARAM_UNIT_ID
            })
        );
        assert_eq!(
            ProxyParams::from_attributes(&[
                Frame::attribute(0, PARAM_SESSION_ID, "s"),
                Frame::attribute(1, PARAM_UNIT_ID, 3i64),
                Frame::attribute(2, PARAM_DIAGNOSTIC, true),
            ]),
            Ok(ProxyParams::new("s", 3, true))
        );
    }

    #[test]
    fn params_reject_wrong_value_types() {
        let invalid =
            |name: &'static str| -> Result<ProxyParams, ViewError> { Err(ViewError::InvalidParameter { name }) };
        assert_eq!(
            ProxyParams::from_attributes(&[
                Frame::attribute(0, PARAM_SESSION_ID, 5i64),
                Frame::attribute(1, PARAM_UNIT_ID, 3i64),
            ]),
            invalid(PARAM_SESSION_ID)
        );
        assert_eq!(
            ProxyParams::from_attributes(&[
                Frame::attribute(0, PARAM_SESSION_ID, ""),
                Frame::attribute(1, PARAM_UNIT_ID, 3i64),
            ]),
            invalid(PARAM_SESSION_ID)
        );
        assert_eq!(
            ProxyParams::from_attributes(&[
                Frame::attribute(0, PARAM_SESSION_ID, "s"),
                Frame::attribute(1, PARAM_UNIT_ID, "3"),
            ]),
            invalid(PARAM_UNIT_ID)
        );
        assert_eq!(
            ProxyParams::from_attributes(&[
                Frame::attribute(0, PARAM_SESSION_ID, "s"),
                Frame::attribute(1, PARAM_UNIT_ID, 3i64),
                Frame::attribute(2, PARAM_DIAGNOSTIC, "yes"),
            ]),
            invalid(PARAM_DIAGNOSTIC)
        );
    }

    #[test]
    fn renders_translated_frames_on_attach() {
        let fx = fixture();
        let _proxy = attach(&fx, 7);
        assert_eq!(fx.sink.last(), Some(vec![Frame::text(0, "count: 0")]));
    }

    #[test]
    fn rerender_is_dispatched_not_inline() {
        let fx = fixture();
        let _proxy = attach(&fx, 7);
        fx.host.set_unit(
            1,
            7,
            UnitSnapshot {
                unit_type: Some(UnitType::new("Counter")),
                frames: vec![Frame::text(0, "count: 1")],
            },
        );
        fx.registry.notify_view_unit_rerendered(1, 7);
        fx.registry.notify_view_unit_rerendered(1, 8);
        assert_eq!(fx.sink.count(), 1);
        assert_eq!(fx.dispatcher.pending(), 1);

        fx.dispatcher.run_pending();
        assert_eq!(fx.sink.count(), 2);
        assert_eq!(fx.sink.last(), Some(vec![Frame::text(0, "count: 1")]));
    }

    #[test]
    fn every_rerender_is_delivered_in_order() {
        let fx = fixture();
        let _proxy = attach(&fx, 7);
        for _ in 0..3 {
            fx.registry.notify_view_unit_rerendered(1, 7);
        }
        assert_eq!(fx.dispatcher.run_pending(), 3);
        assert_eq!(fx.sink.count(), 4);
    }

    #[test]
    fn missing_unit_renders_unavailable() {
        let fx = fixture();
        let _proxy = attach(&fx, 99);
        let last = fx.sink.last().unwrap();
        assert_eq!(placeholder_text(&last), Some(UNAVAILABLE_MESSAGE));
    }

    #[test]
    fn corrupt_frames_render_error_placeholder() {
        let fx = fixture();
        fx.host.set_unit(
            1,
            7,
            UnitSnapshot {
                unit_type: None,
                frames: vec![Frame::attribute(0, "id", "orphan")],
            },
        );
        let _proxy = attach(&fx, 7);
        let last = fx.sink.last().unwrap();
        assert!(placeholder_text(&last).unwrap().starts_with("Live view error:"));
    }

    #[test]
    fn source_close_blanks_output() {
        let fx = fixture();
        let _proxy = attach(&fx, 7);
        fx.registry
            .session_status_changed("src", SessionStatus::Closed)
            .unwrap();
        fx.dispatcher.run_pending();
        assert_eq!(fx.sink.last(), Some(vec![]));
    }

    #[test]
    fn teardown_discards_queued_renders() {
        let fx = fixture();
        let proxy = attach(&fx, 7);
        fx.registry.notify_view_unit_rerendered(1, 7);
        proxy.teardown();
        fx.dispatcher.run_pending();
        assert_eq!(fx.sink.count(), 1);

        fx.registry.notify_view_unit_rerendered(1, 7);
        assert_eq!(fx.dispatcher.pending(), 0);
    }

    #[test]
    fn nested_units_become_attachable_proxies() {
        let fx = fixture();
        fx.host.set_unit(
            1,
            7,
            UnitSnapshot {
                unit_type: Some(UnitType::new("Page")),
                frames: vec![Frame::view_unit(0, Some(UnitType::new("Counter")), 8, 1)],
            },
        );
        fx.host.set_unit(
            1,
            8,
            UnitSnapshot {
                unit_type: Some(UnitType::new("Counter")),
                frames: vec![Frame::text(0, "nested")],
            },
        );
        let _proxy = attach(&fx, 7);
        let rendered = fx.sink.last().unwrap();
        assert!(matches!(rendered[0].kind, FrameKind::ViewUnit { .. }));

        let child_sink = Arc::new(RecordingSink::new());
        let child = ProxyViewUnit::from_block(
            fx.registry.clone(),
            Arc::new(DefaultTranslator),
            &rendered[1..4],
            child_sink.clone(),
            fx.dispatcher.clone(),
        )
        .unwrap();
        assert_eq!(child.params(), &ProxyParams::new("src", 8, false));
        assert_eq!(child_sink.last(), Some(vec![Frame::text(0, "nested")]));
    }

    #[test]
    fn untracked_session_renders_unavailable() {
        let fx = fixture();
        let proxy = ProxyViewUnit::attach(
            fx.registry.clone(),
            Arc::new(DefaultTranslator),
            ProxyParams::new("ghost", 1, false),
            fx.sink.clone(),
            fx.dispatcher.clone(),
        );
        assert!(!proxy.is_subscribed());
        assert_eq!(
            placeholder_text(&fx.sink.last().unwrap()),
            Some(UNAVAILABLE_MESSAGE)
        );
    }
}
