//! Diagnostic listing of a view unit's frames.
//!
//! Output is one bordered box per view unit: a bold header naming the unit,
//! then one line per frame in document order, indented by nesting depth.
//! Nested view units are not expanded inline; each one gets a diagnostic
//! proxy block after the listing so an operator can drill down one level.

use tracing::warn;

use super::{push_proxy_block, TranslationContext, PROXY_BLOCK_LEN};
use crate::error::TranslateError;
use crate::frames::{walk, Frame, FrameBuffer, FrameKind, FrameVisitor, Sequence, UnitId};

const BOX_STYLE: &str = "border: 1px solid black; padding: 4px; margin: 4px; ";
const HEADER_STYLE: &str = "font-weight: bold; padding-left: 8px; ";

pub struct DiagnosticTranslator<'a> {
    buffer: &'a mut FrameBuffer,
    ctx: &'a TranslationContext,
    next_sequence: Sequence,
    line: usize,
    indent: usize,
    child_units: Vec<UnitId>,
}

impl<'a> DiagnosticTranslator<'a> {
    pub fn new(buffer: &'a mut FrameBuffer, ctx: &'a TranslationContext) -> Self {
        Self {
            buffer,
            ctx,
            next_sequence: 0,
            line: 0,
            indent: 0,
            child_units: Vec::new(),
        }
    }

    pub fn translate_root(mut self, frames: &[Frame]) -> Result<(), TranslateError> {
        let box_sequence = self.sequence()?;
        let outer = self.buffer.begin_subtree();
        let style_sequence = self.sequence()?;
        self.buffer
            .push(Frame::attribute(style_sequence, "style", BOX_STYLE));

        let header_sequence = self.sequence()?;
        let header = self.buffer.begin_subtree();
        let style_sequence = self.sequence()?;
        self.buffer
            .push(Frame::attribute(style_sequence, "style", HEADER_STYLE));
        let text_sequence = self.sequence()?;
        self.buffer.push(Frame::text(
            text_sequence,
            format!(
                "View unit {} (unit_id={})",
                self.ctx.unit_type_name(),
                self.ctx.unit_id
            ),
        ));
        self.buffer
            .end_subtree(header, |length| Frame::element(header_sequence, "div", length))?;

        walk(&mut self, frames)?;

        let child_units = std::mem::take(&mut self.child_units);
        for unit_id in child_units {
            let base = self.block_sequence()?;
            push_proxy_block(self.buffer, base, None, &self.ctx.session_id, unit_id, true);
        }

        self.buffer
            .end_subtree(outer, |length| Frame::element(box_sequence, "div", length))
    }

    fn sequence(&mut self) -> Result<Sequence, TranslateError> {
        let sequence = self.next_sequence;
        self.next_sequence = sequence
            .checked_add(1)
            .ok_or(TranslateError::SequenceOverflow { sequence })?;
        Ok(sequence)
    }

    fn block_sequence(&mut self) -> Result<Sequence, TranslateError> {
        let base = self.next_sequence;
        self.next_sequence = base
            .checked_add(PROXY_BLOCK_LEN as Sequence)
            .ok_or(TranslateError::SequenceOverflow { sequence: base })?;
        Ok(base)
    }

    fn push_line(&mut self, text: String) -> Result<(), TranslateError> {
        let div_sequence = self.sequence()?;
        let mark = self.buffer.begin_subtree();
        let style_sequence = self.sequence()?;
        self.buffer.push(Frame::attribute(
            style_sequence,
            "style",
            format!("padding-left: {}em; ", self.indent),
        ));
        let text_sequence = self.sequence()?;
        self.buffer
            .push(Frame::text(text_sequence, format!("{}: {}", self.line, text)));
        self.line += 1;
        self.buffer
            .end_subtree(mark, |length| Frame::element(div_sequence, "div", length))
    }

    fn push_frame_line(&mut self, frame: &Frame) -> Result<(), TranslateError> {
        self.push_line(frame.to_string())
    }

    fn push_attribute_lines(&mut self, attributes: &[Frame]) -> Result<(), TranslateError> {
        for attribute in attributes {
            self.push_frame_line(attribute)?;
        }
        Ok(())
    }
}

impl FrameVisitor for DiagnosticTranslator<'_> {
    fn enter_element(&mut self, element: &Frame, attributes: &[Frame]) -> Result<(), TranslateError> {
        self.push_frame_line(element)?;
        self.indent += 1;
        self.push_attribute_lines(attributes)
    }

    fn view_unit(&mut self, unit: &Frame, attributes: &[Frame]) -> Result<(), TranslateError> {
        let FrameKind::ViewUnit {
            unit_type, unit_id, ..
        } = &unit.kind
        else {
            return Ok(());
        };
        let Some(unit_type) = unit_type else {
            warn!(
                session_id = %self.ctx.session_id,
                unit_id = *unit_id,
                "Dropping view unit with no declared type"
            );
            return Ok(());
        };

        if unit_type.hidden_in_mirror {
            return self.push_line(format!("{}, unit_id={}, hidden from mirrors", unit, unit_id));
        }

        if *unit_id != self.ctx.unit_id {
            self.child_units.push(*unit_id);
        }
        self.push_line(format!("{}, unit_id={}", unit, unit_id))?;
        self.indent += 1;
        self.push_attribute_lines(attributes)?;
        self.indent -= 1;
        Ok(())
    }

    fn enter_region(&mut self, region: &Frame) -> Result<(), TranslateError> {
        self.push_frame_line(region)?;
        self.indent += 1;
        Ok(())
    }

    fn leave(&mut self, _container: &Frame) -> Result<(), TranslateError> {
        self.indent = self.indent.saturating_sub(1);
        Ok(())
    }

    fn text(&mut self, frame: &Frame) -> Result<(), TranslateError> {
        self.push_frame_line(frame)
    }

    fn markup(&mut self, frame: &Frame) -> Result<(), TranslateError> {
        self.push_frame_line(frame)
    }
}
