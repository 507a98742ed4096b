//! Collaborator interfaces the host environment implements.
//!
//! The core never reaches into the host's internals; it only needs the
//! current frames of a view unit, a host-facing to live id mapping, the
//! current location of a session, a way to run work on a session's own
//! dispatcher, and somewhere to deliver rendered frames.

mod memory;

use serde::{Deserialize, Serialize};

use crate::frames::{Frame, UnitId, UnitType};
use crate::sessions::RenderTarget;

pub use memory::{MemoryHost, QueueDispatcher, RecordingSink};

/// Current frames of one view unit plus its declared type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitSnapshot {
    #[serde(default)]
    pub unit_type: Option<UnitType>,
    pub frames: Vec<Frame>,
}

pub trait HostRenderer: Send + Sync {
    /// Frames of `unit_id` as last rendered by `target`, if the unit exists.
    fn unit_frames(&self, target: RenderTarget, unit_id: UnitId) -> Option<UnitSnapshot>;

    /// Maps an id assigned by the host's transport layer to the id the
    /// session's live tree uses.
    fn resolve_unit_id(&self, target: RenderTarget, host_facing_id: UnitId) -> Option<UnitId>;

    fn current_uri(&self, target: RenderTarget) -> Option<String>;
}

pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs jobs on one session's single-threaded loop, in submission order.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, job: Job);
}

/// Receives each new rendering of one view.
pub trait RenderSink: Send + Sync {
    fn render(&self, frames: Vec<Frame>);
}
