use super::{walk, Frame, FrameVisitor};
use crate::error::TranslateError;

struct Validator;

impl FrameVisitor for Validator {
    fn enter_element(&mut self, _element: &Frame, _attributes: &[Frame]) -> Result<(), TranslateError> {
        Ok(())
    }

    fn view_unit(&mut self, _unit: &Frame, _attributes: &[Frame]) -> Result<(), TranslateError> {
        Ok(())
    }

    fn enter_region(&mut self, _region: &Frame) -> Result<(), TranslateError> {
        Ok(())
    }

    fn leave(&mut self, _container: &Frame) -> Result<(), TranslateError> {
        Ok(())
    }

    fn text(&mut self, _frame: &Frame) -> Result<(), TranslateError> {
        Ok(())
    }

    fn markup(&mut self, _frame: &Frame) -> Result<(), TranslateError> {
        Ok(())
    }
}

/// Checks that every subtree length in `frames` nests exactly and that
/// attributes only follow their owning element or view unit.
pub fn validate(frames: &[Frame]) -> Result<(), TranslateError> {
    walk(&mut Validator, frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::UnitType;

    #[test]
    fn accepts_well_formed_sequence() {
        let frames = vec![
            Frame::element(0, "div", 4),
            Frame::attribute(1, "id", "x"),
            Frame::view_unit(2, Some(UnitType::new("Counter")), 7, 1),
            Frame::markup(3, "<b>hi</b>"),
        ];
        assert!(validate(&frames).is_ok());
    }

    #[test]
    fn accepts_empty_sequence() {
        assert!(validate(&[]).is_ok());
    }

    #[test]
    fn rejects_leading_attribute() {
        let frames = vec![Frame::attribute(0, "id", "x")];
        assert_eq!(
            validate(&frames).unwrap_err(),
            TranslateError::OrphanAttribute { index: 0 }
        );
    }
}
