//! View units installed inside observer sessions.
//!
//! These are the boundary where registry and translation failures turn into
//! visible placeholders instead of tearing down the observer's dispatcher.

mod proxy;
mod root;

use crate::frames::{Frame, FrameKind};

pub use proxy::{ProxyParams, ProxyViewUnit};
pub use root::{RootConfig, RootProxyView, RootViewState};

pub const SOURCE_STARTING_MESSAGE: &str = "Source session is starting...";
pub const SOURCE_RECONNECTING_MESSAGE: &str = "Source session is reconnecting...";
pub const SOURCE_CLOSED_MESSAGE: &str = "Source session is closed.";
pub const UNAVAILABLE_MESSAGE: &str = "This view is no longer available.";

const PLACEHOLDER_CLASS: &str = "liveview-placeholder";
const ERROR_CLASS: &str = "liveview-error";

pub fn message_frames(message: &str) -> Vec<Frame> {
    vec![
        Frame::element(0, "div", 3),
        Frame::attribute(1, "class", PLACEHOLDER_CLASS),
        Frame::text(2, message),
    ]
}

pub fn error_frames(message: &str) -> Vec<Frame> {
    vec![
        Frame::element(0, "div", 3),
        Frame::attribute(1, "class", ERROR_CLASS),
        Frame::text(2, format!("Live view error: {}", message)),
    ]
}

/// Returns the text of a placeholder produced by `message_frames` or `error_frames`.
pub fn placeholder_text(frames: &[Frame]) -> Option<&str> {
    match frames {
        [_, _, text] => match &text.kind {
            FrameKind::Text { content } => Some(content.as_str()),
            _ => None,
        },
        _ => None,
    }
}
