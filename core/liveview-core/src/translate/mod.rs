//! View-tree translation for observer sessions.
//!
//! Live mode keeps the source tree's shape but swaps every nested view unit
//! for a fixed four-frame proxy block, recomputes container lengths, and
//! neutralizes same-window navigation. Diagnostic mode replaces the tree with
//! a nested textual listing of its frames and appends one drill-down proxy
//! per nested view unit.
//!
//! Original sequence numbers are multiplied by [`SEQUENCE_MULTIPLIER`], so a
//! proxy block spawned by frame `s` occupies `s*K .. s*K+3` and cannot collide
//! with any other remapped number.

mod diagnostic;
mod live;

use serde::{Deserialize, Serialize};

use crate::error::TranslateError;
use crate::frames::{walk, Frame, FrameBuffer, Sequence, UnitId, UnitType};

pub use diagnostic::DiagnosticTranslator;
pub use live::LiveTranslator;

/// Frames in one proxy block: the view unit frame plus its three parameters.
pub const PROXY_BLOCK_LEN: usize = 4;

/// Remap factor for original sequence numbers; at least `PROXY_BLOCK_LEN`.
pub const SEQUENCE_MULTIPLIER: Sequence = PROXY_BLOCK_LEN as Sequence;

/// Declared type name of the proxy view unit.
pub const PROXY_UNIT_TYPE: &str = "LiveViewProxy";

pub const PARAM_SESSION_ID: &str = "SessionId";
pub const PARAM_UNIT_ID: &str = "UnitId";
pub const PARAM_DIAGNOSTIC: &str = "Diagnostic";

pub fn proxy_unit_type() -> UnitType {
    UnitType::new(PROXY_UNIT_TYPE)
}

pub fn is_proxy_unit_type(unit_type: &UnitType) -> bool {
    unit_type.name == PROXY_UNIT_TYPE
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    #[default]
    Live,
    Diagnostic,
}

impl RenderMode {
    pub fn from_diagnostic(diagnostic: bool) -> Self {
        if diagnostic {
            RenderMode::Diagnostic
        } else {
            RenderMode::Live
        }
    }

    pub fn is_diagnostic(&self) -> bool {
        matches!(self, RenderMode::Diagnostic)
    }
}

/// What the translated frames belong to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationContext {
    /// Source session whose tree is being translated; written into proxies.
    pub session_id: String,
    /// The view unit whose frames are being translated.
    pub unit_id: UnitId,
    pub unit_type: Option<UnitType>,
}

impl TranslationContext {
    pub fn new(session_id: impl Into<String>, unit_id: UnitId, unit_type: Option<UnitType>) -> Self {
        Self {
            session_id: session_id.into(),
            unit_id,
            unit_type,
        }
    }

    pub fn unit_type_name(&self) -> &str {
        self.unit_type
            .as_ref()
            .map(|unit_type| unit_type.name.as_str())
            .unwrap_or("<unknown>")
    }
}

/// Injectable translation step used by proxy views.
pub trait TreeTranslator: Send + Sync {
    fn translate(
        &self,
        frames: &[Frame],
        ctx: &TranslationContext,
        mode: RenderMode,
    ) -> Result<Vec<Frame>, TranslateError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultTranslator;

impl TreeTranslator for DefaultTranslator {
    fn translate(
        &self,
        frames: &[Frame],
        ctx: &TranslationContext,
        mode: RenderMode,
    ) -> Result<Vec<Frame>, TranslateError> {
        translate(frames, ctx, mode)
    }
}

/// Translates one view unit's frames for display inside an observer session.
pub fn translate(
    frames: &[Frame],
    ctx: &TranslationContext,
    mode: RenderMode,
) -> Result<Vec<Frame>, TranslateError> {
    let mut buffer = FrameBuffer::new();
    match mode {
        RenderMode::Live => {
            let mut translator = LiveTranslator::new(&mut buffer, ctx);
            walk(&mut translator, frames)?;
        }
        RenderMode::Diagnostic => {
            DiagnosticTranslator::new(&mut buffer, ctx).translate_root(frames)?;
        }
    }
    let output = buffer.into_frames();
    tracing::trace!(
        session_id = %ctx.session_id,
        unit_id = ctx.unit_id,
        mode = ?mode,
        frames = ?output,
        "Translated view unit"
    );
    Ok(output)
}

/// Remaps an original sequence number into the translator's output space.
pub fn remap_sequence(sequence: Sequence) -> Result<Sequence, TranslateError> {
    sequence
        .checked_mul(SEQUENCE_MULTIPLIER)
        .filter(|base| base.checked_add(SEQUENCE_MULTIPLIER - 1).is_some())
        .ok_or(TranslateError::SequenceOverflow { sequence })
}

/// Appends a proxy block starting at `base`.
pub(crate) fn push_proxy_block(
    buffer: &mut FrameBuffer,
    base: Sequence,
    key: Option<String>,
    session_id: &str,
    unit_id: UnitId,
    diagnostic: bool,
) {
    buffer.push(
        Frame::view_unit(base, Some(proxy_unit_type()), unit_id, PROXY_BLOCK_LEN).with_key(key),
    );
    buffer.push(Frame::attribute(base + 1, PARAM_SESSION_ID, session_id));
    buffer.push(Frame::attribute(base + 2, PARAM_UNIT_ID, unit_id));
    buffer.push(Frame::attribute(base + 3, PARAM_DIAGNOSTIC, diagnostic));
}
