//! Session tracking: lifecycle, observer links, and the shared registry.

mod events;
mod registry;
mod session;
mod status;

pub use events::{RegistryEvent, RegistryListener, SessionEvent, SessionListener};
pub use registry::{
    PendingObserver, RootDecision, SessionRegistry, StatusChange, Subscription,
    NAVIGATION_BLOCKED_REASON,
};
pub use session::{ObserverLink, RenderTarget, Session, SessionFilter, SessionKind};
pub use status::{transition, SessionStatus, Transition};
