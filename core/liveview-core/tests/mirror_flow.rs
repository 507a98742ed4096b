//! End-to-end observer lifecycle against the in-memory host.

use std::sync::Arc;

use liveview_core::translate::PROXY_UNIT_TYPE;
use liveview_core::views::{placeholder_text, SOURCE_CLOSED_MESSAGE, SOURCE_RECONNECTING_MESSAGE};
use liveview_core::{
    plan_mirror, DefaultTranslator, Frame, FrameKind, LiveViewOptions, MemoryHost, ProxyViewUnit,
    QueueDispatcher, RecordingSink, RootConfig, RootDecision, RootProxyView, RootViewState,
    SessionFilter, SessionRegistry, SessionStatus, UnitSnapshot, UnitType,
};

const SOURCE_TARGET: u64 = 1;
const OBSERVER_TARGET: u64 = 2;
const HOST_FACING_ROOT: u32 = 100;

struct Harness {
    host: Arc<MemoryHost>,
    registry: SessionRegistry,
    options: LiveViewOptions,
}

impl Harness {
    fn new() -> Self {
        let host = Arc::new(MemoryHost::new());
        let options = LiveViewOptions::default();
        let registry = SessionRegistry::with_options(host.clone(), &options);

        host.set_uri(SOURCE_TARGET, "https://app.example/counter");
        host.map_unit_id(SOURCE_TARGET, HOST_FACING_ROOT, 3);
        host.set_unit(
            SOURCE_TARGET,
            3,
            UnitSnapshot {
                unit_type: Some(UnitType::new("App")),
                frames: vec![
                    Frame::element(0, "main", 4),
                    Frame::attribute(1, "class", "app"),
                    Frame::view_unit(2, Some(UnitType::new("Counter")), 7, 2),
                    Frame::attribute(3, "Start", 5i64),
                ],
            },
        );
        counter(&host, 0);

        Self {
            host,
            registry,
            options,
        }
    }
}

fn counter(host: &MemoryHost, value: i64) {
    host.set_unit(
        SOURCE_TARGET,
        7,
        UnitSnapshot {
            unit_type: Some(UnitType::new("Counter")),
            frames: vec![
                Frame::element(0, "button", 3),
                Frame::attribute(1, "onclick", "increment"),
                Frame::text(2, format!("Count: {}", value)),
            ],
        },
    );
}

#[test]
fn observer_follows_source_through_its_lifecycle() {
    let harness = Harness::new();
    let registry = &harness.registry;
    registry.session_opened("source", SOURCE_TARGET).unwrap();
    registry
        .session_status_changed("source", SessionStatus::Up)
        .unwrap();

    // Mirror entry
    let plan = plan_mirror(
        registry,
        &harness.options,
        "/_liveview/mirror?sourceCircuitId=source",
    )
    .unwrap();
    assert_eq!(plan.source_uri.as_deref(), Some("https://app.example/counter"));
    plan.stage(registry, "observer").unwrap();

    let observer = registry.session_opened("observer", OBSERVER_TARGET).unwrap();
    assert!(observer.is_observer());
    assert_eq!(
        registry.root_decision(OBSERVER_TARGET),
        RootDecision::Mirror {
            observer_session_id: "observer".to_string(),
            source_session_id: "source".to_string(),
            diagnostic: false,
        }
    );
    assert_eq!(registry.root_decision(SOURCE_TARGET), RootDecision::Host);
    assert!(!registry.should_dispatch_interaction(OBSERVER_TARGET));
    assert!(registry.should_dispatch_interaction(SOURCE_TARGET));

    // Root proxy view, rendered on the observer's dispatcher
    let dispatcher = Arc::new(QueueDispatcher::new());
    let root_sink = Arc::new(RecordingSink::new());
    let app_sink = Arc::new(RecordingSink::new());
    let root = RootProxyView::install(RootConfig {
        registry: registry.clone(),
        translator: Arc::new(DefaultTranslator),
        observer_session_id: "observer".to_string(),
        host_facing_unit_id: HOST_FACING_ROOT,
        use_screen_overlay: true,
        sink: root_sink.clone(),
        child_sink: app_sink.clone(),
        dispatcher: dispatcher.clone(),
    })
    .unwrap();
    assert_eq!(root.state(), RootViewState::SourceReady { unit_id: 3 });
    assert_eq!(root.hosted_unit_id(), Some(3));

    // The mirrored app contains a proxy block standing in for the counter.
    let app_frames = app_sink.last().unwrap();
    assert_eq!(app_frames[0].subtree_length(), Some(app_frames.len()));
    let block_index = app_frames
        .iter()
        .position(|frame| {
            matches!(
                &frame.kind,
                FrameKind::ViewUnit { unit_type: Some(unit_type), .. } if unit_type.name == PROXY_UNIT_TYPE
            )
        })
        .unwrap();
    let block_attributes = &app_frames[block_index + 1..block_index + 4];

    let counter_sink = Arc::new(RecordingSink::new());
    let counter_view = ProxyViewUnit::from_block(
        registry.clone(),
        Arc::new(DefaultTranslator),
        block_attributes,
        counter_sink.clone(),
        dispatcher.clone(),
    )
    .unwrap();
    assert_eq!(counter_view.params().unit_id, 7);
    let first = counter_sink.last().unwrap();
    assert_eq!(first.len(), 3);
    assert_eq!(first[2], Frame::text(8, "Count: 0"));

    // Source rerenders propagate to the matching proxy only.
    counter(&harness.host, 1);
    registry.notify_view_unit_rerendered(SOURCE_TARGET, 7);
    let app_renders = app_sink.count();
    assert_eq!(dispatcher.run_pending(), 1);
    assert_eq!(counter_sink.last().unwrap()[2], Frame::text(8, "Count: 1"));
    assert_eq!(app_sink.count(), app_renders);

    // Reconnect drops the hosted proxy and rebuilds it once the source is back.
    registry
        .session_status_changed("source", SessionStatus::Down)
        .unwrap();
    dispatcher.run_pending();
    assert_eq!(root.state(), RootViewState::SourceReconnecting);
    assert_eq!(
        root_sink.last().as_deref().and_then(placeholder_text),
        Some(SOURCE_RECONNECTING_MESSAGE)
    );
    assert_eq!(root.hosted_unit_id(), None);

    registry
        .session_status_changed("source", SessionStatus::Up)
        .unwrap();
    dispatcher.run_pending();
    assert_eq!(root.hosted_unit_id(), Some(3));

    // Source closes: proxies blank, root shows the terminal message.
    registry
        .session_status_changed("source", SessionStatus::Closed)
        .unwrap();
    dispatcher.run_pending();
    assert_eq!(root.state(), RootViewState::SourceClosed);
    assert_eq!(
        root_sink.last().as_deref().and_then(placeholder_text),
        Some(SOURCE_CLOSED_MESSAGE)
    );
    assert_eq!(counter_sink.last(), Some(Vec::new()));

    counter_view.teardown();
    root.teardown();
    registry
        .session_status_changed("observer", SessionStatus::Closed)
        .unwrap();
    assert_eq!(registry.session_count(), 0);
}

#[test]
fn observer_navigation_is_blocked() {
    let harness = Harness::new();
    let registry = &harness.registry;
    registry.session_opened("source", SOURCE_TARGET).unwrap();
    registry
        .session_status_changed("source", SessionStatus::Up)
        .unwrap();
    registry
        .register_pending_observer("observer", "source", None, false)
        .unwrap();
    registry.session_opened("observer", OBSERVER_TARGET).unwrap();

    let dispatcher = Arc::new(QueueDispatcher::new());
    let root_sink = Arc::new(RecordingSink::new());
    let root = RootProxyView::install(RootConfig {
        registry: registry.clone(),
        translator: Arc::new(DefaultTranslator),
        observer_session_id: "observer".to_string(),
        host_facing_unit_id: HOST_FACING_ROOT,
        use_screen_overlay: false,
        sink: root_sink.clone(),
        child_sink: Arc::new(RecordingSink::new()),
        dispatcher: dispatcher.clone(),
    })
    .unwrap();

    harness
        .host
        .set_uri(OBSERVER_TARGET, "https://app.example/elsewhere");
    registry.notify_uri_changed(OBSERVER_TARGET);
    dispatcher.run_pending();

    assert!(matches!(root.state(), RootViewState::Blocked { .. }));
    assert_eq!(root.hosted_unit_id(), None);
    let observers = registry.list_sessions(Some(SessionFilter::Observer));
    assert_eq!(observers.len(), 1);
    assert!(observers[0].blocked_reason().is_some());
}

#[test]
fn observers_cannot_be_mirrored_and_pending_links_are_single_use() {
    let harness = Harness::new();
    let registry = &harness.registry;
    registry.session_opened("source", SOURCE_TARGET).unwrap();
    registry
        .register_pending_observer("observer", "source", Some("source"), true)
        .unwrap();
    registry.session_opened("observer", OBSERVER_TARGET).unwrap();

    let err = plan_mirror(
        registry,
        &harness.options,
        "/_liveview/mirror?sourceCircuitId=observer",
    )
    .unwrap_err();
    assert_eq!(err.http_status(), 400);

    assert!(registry.pending_observer("observer").is_none());
    let summary = &registry.summaries(Some(SessionFilter::Observer))[0];
    assert_eq!(summary.source_session_id.as_deref(), Some("source"));
    assert_eq!(summary.parent_session_id.as_deref(), Some("source"));
    assert!(summary.diagnostic);
}
