//! Structural walk over a frame sequence.
//!
//! `walk` reports each container to a `FrameVisitor` on entry (with its
//! attributes) and again on leave, once its subtree is exhausted. Open scopes
//! live on an explicit stack, so nesting depth never grows the call stack.
//! Corrupt input (orphan attributes, subtree lengths that overrun their scope,
//! view units with inline children) aborts the walk.

use super::{Frame, FrameKind};
use crate::error::TranslateError;

pub trait FrameVisitor {
    fn none(&mut self, _frame: &Frame) -> Result<(), TranslateError> {
        Ok(())
    }

    fn enter_element(&mut self, element: &Frame, attributes: &[Frame]) -> Result<(), TranslateError>;

    /// `attributes` holds the unit's declared parameters; view units never
    /// carry other inline descendants.
    fn view_unit(&mut self, unit: &Frame, attributes: &[Frame]) -> Result<(), TranslateError>;

    fn enter_region(&mut self, region: &Frame) -> Result<(), TranslateError>;

    /// Called for an element or region after its last descendant.
    fn leave(&mut self, container: &Frame) -> Result<(), TranslateError>;

    fn text(&mut self, frame: &Frame) -> Result<(), TranslateError>;

    fn markup(&mut self, frame: &Frame) -> Result<(), TranslateError>;
}

pub fn walk<V>(visitor: &mut V, frames: &[Frame]) -> Result<(), TranslateError>
where
    V: FrameVisitor + ?Sized,
{
    // (exclusive end index, container frame)
    let mut open: Vec<(usize, &Frame)> = Vec::new();
    let mut i = 0;
    loop {
        while let Some(&(end, container)) = open.last() {
            if i < end {
                break;
            }
            open.pop();
            visitor.leave(container)?;
        }
        if i >= frames.len() {
            return Ok(());
        }

        let scope_end = open.last().map_or(frames.len(), |(end, _)| *end);
        let frame = &frames[i];
        match &frame.kind {
            FrameKind::None => {
                visitor.none(frame)?;
                i += 1;
            }
            FrameKind::Attribute { .. } => {
                return Err(TranslateError::OrphanAttribute { index: i });
            }
            FrameKind::Text { .. } => {
                visitor.text(frame)?;
                i += 1;
            }
            FrameKind::Markup { .. } => {
                visitor.markup(frame)?;
                i += 1;
            }
            FrameKind::Element { subtree_length, .. } => {
                let end = subtree_end(i, *subtree_length, scope_end)?;
                let attribute_count = frames[i + 1..end]
                    .iter()
                    .take_while(|frame| frame.is_attribute())
                    .count();
                visitor.enter_element(frame, &frames[i + 1..i + 1 + attribute_count])?;
                open.push((end, frame));
                i += 1 + attribute_count;
            }
            FrameKind::ViewUnit { subtree_length, .. } => {
                let end = subtree_end(i, *subtree_length, scope_end)?;
                let attributes = &frames[i + 1..end];
                if let Some(pos) = attributes.iter().position(|frame| !frame.is_attribute()) {
                    return Err(TranslateError::ViewUnitChildren {
                        index: i,
                        child: i + 1 + pos,
                    });
                }
                visitor.view_unit(frame, attributes)?;
                i = end;
            }
            FrameKind::Region { subtree_length } => {
                let end = subtree_end(i, *subtree_length, scope_end)?;
                visitor.enter_region(frame)?;
                open.push((end, frame));
                i += 1;
            }
        }
    }
}

fn subtree_end(index: usize, subtree_length: usize, scope_end: usize) -> Result<usize, TranslateError> {
    if subtree_length == 0 {
        return Err(TranslateError::EmptySubtree { index });
    }
    let available = scope_end - index;
    if subtree_length > available {
        return Err(TranslateError::SubtreeOutOfBounds {
            index,
            length: subtree_length,
            available,
        });
    }
    Ok(index + subtree_length)
}
