use tracing::{debug, warn};

use super::{push_proxy_block, remap_sequence, TranslationContext};
use crate::error::TranslateError;
use crate::frames::{AttributeValue, Frame, FrameBuffer, FrameKind, FrameVisitor, SubtreeMark};

const NEUTRAL_HREF: &str = "javascript:void(0)";
const HYPERLINK_ELEMENTS: [&str; 2] = ["a", "area"];

/// Structure-preserving translation into proxy-substituted frames.
pub struct LiveTranslator<'a> {
    buffer: &'a mut FrameBuffer,
    ctx: &'a TranslationContext,
    open: Vec<SubtreeMark>,
}

impl<'a> LiveTranslator<'a> {
    pub fn new(buffer: &'a mut FrameBuffer, ctx: &'a TranslationContext) -> Self {
        Self {
            buffer,
            ctx,
            open: Vec::new(),
        }
    }

    fn copy(&mut self, frame: &Frame) -> Result<(), TranslateError> {
        let sequence = remap_sequence(frame.sequence)?;
        self.buffer.push(frame.clone().with_sequence(sequence));
        Ok(())
    }

    fn copy_attributes(&mut self, element_name: &str, attributes: &[Frame]) -> Result<(), TranslateError> {
        let neutralize = is_hyperlink(element_name) && !opens_new_context(attributes);
        for attribute in attributes {
            let sequence = remap_sequence(attribute.sequence)?;
            let mut copied = attribute.clone().with_sequence(sequence);
            if neutralize {
                if let FrameKind::Attribute { name, value, .. } = &mut copied.kind {
                    if name.eq_ignore_ascii_case("href") {
                        *value = AttributeValue::from(NEUTRAL_HREF);
                    }
                }
            }
            self.buffer.push(copied);
        }
        Ok(())
    }
}

impl FrameVisitor for LiveTranslator<'_> {
    fn enter_element(&mut self, element: &Frame, attributes: &[Frame]) -> Result<(), TranslateError> {
        let mark = self.buffer.begin_subtree();
        self.open.push(mark);
        match &element.kind {
            FrameKind::Element { name, .. } => self.copy_attributes(name, attributes),
            _ => Ok(()),
        }
    }

    fn view_unit(&mut self, unit: &Frame, _attributes: &[Frame]) -> Result<(), TranslateError> {
        let FrameKind::ViewUnit {
            unit_type,
            unit_id,
            key,
            ..
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
            debug!(
                unit_id = *unit_id,
                unit_type = %unit_type.name,
                "Hiding non-observable view unit"
            );
            return Ok(());
        }
        let base = remap_sequence(unit.sequence)?;
        push_proxy_block(
            self.buffer,
            base,
            key.clone(),
            &self.ctx.session_id,
            *unit_id,
            false,
        );
        Ok(())
    }

    fn enter_region(&mut self, _region: &Frame) -> Result<(), TranslateError> {
        let mark = self.buffer.begin_subtree();
        self.open.push(mark);
        Ok(())
    }

    fn leave(&mut self, container: &Frame) -> Result<(), TranslateError> {
        let sequence = remap_sequence(container.sequence)?;
        let mark = self.open.pop().ok_or(TranslateError::UnopenedSubtree {
            sequence: container.sequence,
        })?;
        match &container.kind {
            FrameKind::Element { name, key, .. } => self.buffer.end_subtree(mark, |length| {
                Frame::element(sequence, name.clone(), length).with_key(key.clone())
            }),
            _ => self
                .buffer
                .end_subtree(mark, |length| Frame::region(sequence, length)),
        }
    }

    fn text(&mut self, frame: &Frame) -> Result<(), TranslateError> {
        self.copy(frame)
    }

    fn markup(&mut self, frame: &Frame) -> Result<(), TranslateError> {
        self.copy(frame)
    }
}

fn is_hyperlink(element_name: &str) -> bool {
    HYPERLINK_ELEMENTS
        .iter()
        .any(|name| element_name.eq_ignore_ascii_case(name))
}

fn opens_new_context(attributes: &[Frame]) -> bool {
    attributes.iter().any(|attribute| {
        matches!(
            &attribute.kind,
            FrameKind::Attribute { name, value: AttributeValue::Text(value), .. }
                if name.eq_ignore_ascii_case("target") && value.eq_ignore_ascii_case("_blank")
        )
    })
}
