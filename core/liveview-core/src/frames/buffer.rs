//! Output buffer with declare-and-backfill subtree lengths.

use super::{Frame, FrameKind};
use crate::error::TranslateError;

/// Position of a reserved placeholder; consumed by `FrameBuffer::end_subtree`.
#[derive(Debug)]
#[must_use = "an open subtree must be closed with end_subtree"]
pub struct SubtreeMark {
    index: usize,
}

impl SubtreeMark {
    pub fn index(&self) -> usize {
        self.index
    }
}

#[derive(Debug, Default, Clone)]
pub struct FrameBuffer {
    frames: Vec<Frame>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    /// Reserves the header slot of a subtree whose length is not yet known.
    pub fn begin_subtree(&mut self) -> SubtreeMark {
        let index = self.frames.len();
        self.frames.push(Frame::none());
        SubtreeMark { index }
    }

    /// Overwrites the reserved slot with `build(length)`, where length counts
    /// the header plus everything appended since `begin_subtree`.
    pub fn end_subtree<F>(&mut self, mark: SubtreeMark, build: F) -> Result<(), TranslateError>
    where
        F: FnOnce(usize) -> Frame,
    {
        let slot = self
            .frames
            .get_mut(mark.index)
            .ok_or(TranslateError::MarkOutOfBounds { index: mark.index })?;
        if !matches!(slot.kind, FrameKind::None) {
            return Err(TranslateError::NotAPlaceholder { index: mark.index });
        }
        let length = self.frames.len() - mark.index;
        self.frames[mark.index] = build(length);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn as_slice(&self) -> &[Frame] {
        &self.frames
    }

    pub fn into_frames(self) -> Vec<Frame> {
        self.frames
    }
}
