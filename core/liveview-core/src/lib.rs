//! # liveview-core
//!
//! Mirrors a live server-rendered UI session into a read-only observer
//! session.
//!
//! ## Pieces
//!
//! - **Frames**: the flat, length-prefixed encoding of a view unit's tree.
//! - **Translator**: pure rewrite of one view unit's frames for an observer,
//!   in live or diagnostic mode.
//! - **Registry**: thread-safe directory of sessions, observer links and
//!   lifecycle, with per-session event fan-out.
//! - **Views**: the root proxy view and proxy view units that observer
//!   sessions render.
//! - **Host**: the collaborator traits a host integration implements, plus
//!   an in-memory host for tests and tooling.
//!
//! ## Threading
//!
//! Each session runs on its own single-threaded dispatcher. The registry is
//! the only shared structure. Its listeners run under its lock, so anything
//! that needs to render hands off to the observer's dispatcher.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use liveview_core::{MemoryHost, SessionRegistry, LiveViewOptions};
//!
//! let host = Arc::new(MemoryHost::new());
//! let registry = SessionRegistry::with_options(host, &LiveViewOptions::default());
//! registry.session_opened("circuit-1", 1)?;
//! ```

pub mod error;
pub mod frames;
pub mod host;
pub mod mirror;
pub mod options;
pub mod sessions;
pub mod translate;
pub mod views;

pub use error::{LiveViewError, OptionsError, RegistryError, Result, TranslateError, ViewError};
pub use frames::{validate, AttributeValue, Frame, FrameBuffer, FrameKind, Sequence, UnitId, UnitType};
pub use host::{Dispatcher, HostRenderer, MemoryHost, QueueDispatcher, RecordingSink, RenderSink, UnitSnapshot};
pub use mirror::{plan_mirror, rewrite_bootstrap, MirrorPlan};
pub use options::{load_options, DerivedPaths, LiveViewOptions, ObserverResolution};
pub use sessions::{
    RegistryEvent, RenderTarget, RootDecision, Session, SessionEvent, SessionFilter, SessionKind,
    SessionRegistry, SessionStatus, StatusChange, Subscription,
};
pub use translate::{
    translate, DefaultTranslator, RenderMode, TranslationContext, TreeTranslator, PROXY_BLOCK_LEN,
    SEQUENCE_MULTIPLIER,
};
pub use views::{ProxyParams, ProxyViewUnit, RootConfig, RootProxyView, RootViewState};
