//! Error types for liveview-core operations.
//!
//! Each subsystem has its own enum; `LiveViewError` unifies them for callers
//! that drive several subsystems at once (the CLI, host integrations).

use std::path::PathBuf;

use liveview_protocol::SessionStatus;

use crate::frames::Sequence;

/// Structural problems found while walking or building a frame sequence.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranslateError {
    // ─────────────────────────────────────────────────────────────────────
    // Input corruption
    // ─────────────────────────────────────────────────────────────────────
    #[error("Attribute frame at index {index} has no owning element or view unit")]
    OrphanAttribute { index: usize },

    #[error("Frame at index {index} declares an empty subtree")]
    EmptySubtree { index: usize },

    #[error("Frame at index {index} declares subtree length {length}, but only {available} frames remain in scope")]
    SubtreeOutOfBounds {
        index: usize,
        length: usize,
        available: usize,
    },

    #[error("View unit frame at index {index} contains a non-attribute frame at index {child}")]
    ViewUnitChildren { index: usize, child: usize },

    #[error("Sequence number {sequence} overflows when remapped")]
    SequenceOverflow { sequence: Sequence },

    // ─────────────────────────────────────────────────────────────────────
    // Output buffer misuse
    // ─────────────────────────────────────────────────────────────────────
    #[error("No placeholder reserved at output index {index}")]
    NotAPlaceholder { index: usize },

    #[error("Output index {index} is beyond the end of the buffer")]
    MarkOutOfBounds { index: usize },

    #[error("Left a subtree at sequence {sequence} that was never opened")]
    UnopenedSubtree { sequence: Sequence },
}

/// Failures reported by the session registry at the call site.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    // ─────────────────────────────────────────────────────────────────────
    // Staging and opening
    // ─────────────────────────────────────────────────────────────────────
    #[error("Session id already staged as a pending observer: {0}")]
    PendingConflict(String),

    #[error("Session already tracked: {0}")]
    AlreadyTracked(String),

    #[error("Render target {target} already belongs to session {owner}")]
    RenderTargetInUse { target: u64, owner: String },

    #[error("Observed source session not found: {0}")]
    SourceNotFound(String),

    #[error("Source session {0} is itself an observer")]
    SourceIsObserver(String),

    // ─────────────────────────────────────────────────────────────────────
    // Lookups
    // ─────────────────────────────────────────────────────────────────────
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session is not an observer: {0}")]
    NotAnObserver(String),

    #[error("Session {session_id} is an observer and cannot be mirrored")]
    ObserverNotObservable { session_id: String },

    #[error("View unit {unit_id} not found in session {session_id}")]
    UnitNotFound { session_id: String, unit_id: u32 },

    // ─────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────
    #[error("Invalid status transition for session {session_id}: {from:?} -> {to:?}")]
    InvalidTransition {
        session_id: String,
        from: Option<SessionStatus>,
        to: SessionStatus,
    },
}

/// Configuration problems.
#[derive(Debug, thiserror::Error)]
pub enum OptionsError {
    #[error("Path prefix must not be empty")]
    EmptyPrefix,

    #[error("Path prefix must start with '/': {0}")]
    PrefixMissingLeadingSlash(String),

    #[error("Path prefix must not end with '/': {0}")]
    PrefixTrailingSlash(String),

    #[error("Derived path {path} collides with host-reserved path {reserved}")]
    ReservedPathCollision { path: String, reserved: String },

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("Configuration read failed: {path}: {source}")]
    ConfigReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Fatal problems with how a proxy view was configured.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ViewError {
    #[error("Proxy view is missing required parameter {0}")]
    MissingParameter(&'static str),

    #[error("Proxy view parameter {name} has the wrong type")]
    InvalidParameter { name: &'static str },
}

/// Any error raised by liveview-core.
#[derive(Debug, thiserror::Error)]
pub enum LiveViewError {
    #[error(transparent)]
    Translate(#[from] TranslateError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Options(#[from] OptionsError),

    #[error(transparent)]
    View(#[from] ViewError),

    #[error("JSON parsing error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Convenience type alias for Results using LiveViewError.
pub type Result<T> = std::result::Result<T, LiveViewError>;

impl From<LiveViewError> for String {
    fn from(err: LiveViewError) -> String {
        err.to_string()
    }
}
