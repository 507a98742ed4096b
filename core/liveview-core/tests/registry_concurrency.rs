//! Registry driven from many threads at once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use liveview_core::{
    MemoryHost, ObserverResolution, RegistryEvent, SessionEvent, SessionRegistry, SessionStatus,
};

const WORKERS: u64 = 8;
const ROUNDS: u32 = 50;

fn expected_events() -> Vec<SessionEvent> {
    let mut events = Vec::new();
    let mut from = SessionStatus::Open;
    for round in 0..ROUNDS {
        events.push(SessionEvent::Rerendered { unit_id: round });
        events.push(SessionEvent::StatusChanged {
            from,
            to: SessionStatus::Up,
        });
        events.push(SessionEvent::StatusChanged {
            from: SessionStatus::Up,
            to: SessionStatus::Down,
        });
        from = SessionStatus::Down;
    }
    events.push(SessionEvent::StatusChanged {
        from: SessionStatus::Down,
        to: SessionStatus::Closed,
    });
    events
}

fn drive_session(registry: &SessionRegistry, worker: u64) -> Vec<SessionEvent> {
    let id = format!("session-{}", worker);
    let target = worker + 1;
    registry.session_opened(&id, target).expect("open");

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _sub = registry
        .subscribe_session(&id, move |event| sink.lock().unwrap().push(event.clone()))
        .expect("subscribe");
    registry
        .register_pending_observer(&format!("observer-{}", worker), &id, None, false)
        .expect("stage");

    for round in 0..ROUNDS {
        registry.notify_view_unit_rerendered(target, round);
        registry
            .session_status_changed(&id, SessionStatus::Up)
            .expect("up");
        registry
            .session_status_changed(&id, SessionStatus::Down)
            .expect("down");
    }
    registry
        .session_status_changed(&id, SessionStatus::Closed)
        .expect("close");

    let events = seen.lock().unwrap().clone();
    events
}

#[test]
fn concurrent_sessions_keep_event_order_and_clean_indices() {
    let host = Arc::new(MemoryHost::new());
    let registry = SessionRegistry::new(host, ObserverResolution::Reject);

    // id -> ordered Opened/Closed markers seen by a long-lived subscriber
    let lifecycle: Arc<Mutex<HashMap<String, Vec<&'static str>>>> = Arc::default();
    let sink = Arc::clone(&lifecycle);
    let _lifecycle_sub = registry.subscribe(move |event| {
        let (id, marker) = match event {
            RegistryEvent::Opened(session) => (session.id.clone(), "opened"),
            RegistryEvent::Closed(session) => (session.id.clone(), "closed"),
        };
        sink.lock().unwrap().entry(id).or_default().push(marker);
    });

    let done = AtomicBool::new(false);
    let churned = AtomicUsize::new(0);
    let results: Vec<Vec<SessionEvent>> = thread::scope(|scope| {
        scope.spawn(|| {
            loop {
                let sub = registry.subscribe(|_| {});
                let _ = registry.list_sessions(None);
                let _ = registry.summaries(None);
                drop(sub);
                churned.fetch_add(1, Ordering::Relaxed);
                if done.load(Ordering::Acquire) {
                    break;
                }
            }
        });

        let workers: Vec<_> = (0..WORKERS)
            .map(|worker| {
                let registry = registry.clone();
                scope.spawn(move || drive_session(&registry, worker))
            })
            .collect();
        let results: Vec<_> = workers
            .into_iter()
            .map(|handle| handle.join().expect("worker"))
            .collect();
        done.store(true, Ordering::Release);
        results
    });

    let expected = expected_events();
    for events in &results {
        assert_eq!(events, &expected);
    }

    let lifecycle = lifecycle.lock().unwrap();
    assert_eq!(lifecycle.len(), WORKERS as usize);
    assert!(lifecycle.values().all(|markers| markers == &["opened", "closed"]));

    assert!(churned.load(Ordering::Relaxed) > 0);
    assert_eq!(registry.session_count(), 0);
    for worker in 0..WORKERS {
        assert!(registry.lookup_by_render_target(worker + 1).is_none());
        assert!(registry
            .pending_observer(&format!("observer-{}", worker))
            .is_none());
    }
}
