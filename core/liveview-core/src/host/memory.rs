//! In-memory host used by tests and by `liveview replay`.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, RwLock};

use super::{Dispatcher, HostRenderer, Job, RenderSink, UnitSnapshot};
use crate::frames::{Frame, UnitId};
use crate::sessions::RenderTarget;

#[derive(Default)]
pub struct MemoryHost {
    units: RwLock<HashMap<(RenderTarget, UnitId), UnitSnapshot>>,
    id_map: RwLock<HashMap<(RenderTarget, UnitId), UnitId>>,
    uris: RwLock<HashMap<RenderTarget, String>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unit(&self, target: RenderTarget, unit_id: UnitId, snapshot: UnitSnapshot) {
        self.units
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert((target, unit_id), snapshot);
    }

    pub fn map_unit_id(&self, target: RenderTarget, host_facing_id: UnitId, live_id: UnitId) {
        self.id_map
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert((target, host_facing_id), live_id);
    }

    pub fn set_uri(&self, target: RenderTarget, uri: impl Into<String>) {
        self.uris
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(target, uri.into());
    }
}

impl HostRenderer for MemoryHost {
    fn unit_frames(&self, target: RenderTarget, unit_id: UnitId) -> Option<UnitSnapshot> {
        self.units
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&(target, unit_id))
            .cloned()
    }

    /// Explicit mappings win; otherwise an id that names an existing unit maps to itself.
    fn resolve_unit_id(&self, target: RenderTarget, host_facing_id: UnitId) -> Option<UnitId> {
        let mapped = self
            .id_map
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&(target, host_facing_id))
            .copied();
        mapped.or_else(|| {
            self.units
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .contains_key(&(target, host_facing_id))
                .then_some(host_facing_id)
        })
    }

    fn current_uri(&self, target: RenderTarget) -> Option<String> {
        self.uris
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&target)
            .cloned()
    }
}

/// Dispatcher that queues jobs until `run_pending` is called.
#[derive(Default)]
pub struct QueueDispatcher {
    queue: Mutex<VecDeque<Job>>,
}

impl QueueDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Runs queued jobs in order, including jobs they enqueue; returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            let job = self
                .queue
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .pop_front();
            match job {
                Some(job) => {
                    job();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }
}

impl Dispatcher for QueueDispatcher {
    fn dispatch(&self, job: Job) {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(job);
    }
}

#[derive(Default)]
pub struct RecordingSink {
    renders: Mutex<Vec<Vec<Frame>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn renders(&self) -> Vec<Vec<Frame>> {
        self.renders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn last(&self) -> Option<Vec<Frame>> {
        self.renders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .last()
            .cloned()
    }

    pub fn count(&self) -> usize {
        self.renders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

impl RenderSink for RecordingSink {
    fn render(&self, frames: Vec<Frame>) {
        self.renders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(frames);
    }
}
