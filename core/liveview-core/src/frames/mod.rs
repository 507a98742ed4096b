//! Flat, length-prefixed encoding of a view unit's UI tree.
//!
//! A frame that carries a `subtree_length` owns the `subtree_length - 1`
//! frames that follow it. Attribute frames come first, directly after their
//! owning element or view unit, and never have children of their own.
//!
//! Sequence numbers are opaque to everything except the host's diffing; the
//! translator only guarantees they stay distinguishable per logical slot.

mod buffer;
mod validate;
mod walk;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use buffer::{FrameBuffer, SubtreeMark};
pub use validate::validate;
pub use walk::{walk, FrameVisitor};

pub type Sequence = u32;
pub type UnitId = u32;

/// Declared type of a nested view unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitType {
    pub name: String,
    /// Marks a view unit as non-observable: hidden from live mirrors and
    /// listed by name only in diagnostic listings.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub hidden_in_mirror: bool,
}

impl UnitType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hidden_in_mirror: false,
        }
    }

    pub fn hidden(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hidden_in_mirror: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttributeValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(value) => Some(*value),
            _ => None,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<UnitId> for AttributeValue {
    fn from(value: UnitId) -> Self {
        AttributeValue::Int(i64::from(value))
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Null => write!(f, "null"),
            AttributeValue::Bool(value) => write!(f, "{}", value),
            AttributeValue::Int(value) => write!(f, "{}", value),
            AttributeValue::Text(value) => write!(f, "{:?}", value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FrameKind {
    /// Backfill slot; carries nothing.
    None,
    Element {
        name: String,
        subtree_length: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
    },
    Attribute {
        name: String,
        value: AttributeValue,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        event_handler_id: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        updates_attribute_name: Option<String>,
    },
    ViewUnit {
        /// `None` for host-synthesized units with no stable type identity.
        #[serde(default)]
        unit_type: Option<UnitType>,
        unit_id: UnitId,
        subtree_length: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
    },
    Region {
        subtree_length: usize,
    },
    Text {
        content: String,
    },
    Markup {
        content: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub sequence: Sequence,
    #[serde(flatten)]
    pub kind: FrameKind,
}

impl Frame {
    pub fn none() -> Self {
        Self {
            sequence: 0,
            kind: FrameKind::None,
        }
    }

    pub fn element(sequence: Sequence, name: impl Into<String>, subtree_length: usize) -> Self {
        Self {
            sequence,
            kind: FrameKind::Element {
                name: name.into(),
                subtree_length,
                key: None,
            },
        }
    }

    pub fn attribute(
        sequence: Sequence,
        name: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        Self {
            sequence,
            kind: FrameKind::Attribute {
                name: name.into(),
                value: value.into(),
                event_handler_id: None,
                updates_attribute_name: None,
            },
        }
    }

    pub fn view_unit(
        sequence: Sequence,
        unit_type: Option<UnitType>,
        unit_id: UnitId,
        subtree_length: usize,
    ) -> Self {
        Self {
            sequence,
            kind: FrameKind::ViewUnit {
                unit_type,
                unit_id,
                subtree_length,
                key: None,
            },
        }
    }

    pub fn region(sequence: Sequence, subtree_length: usize) -> Self {
        Self {
            sequence,
            kind: FrameKind::Region { subtree_length },
        }
    }

    pub fn text(sequence: Sequence, content: impl Into<String>) -> Self {
        Self {
            sequence,
            kind: FrameKind::Text {
                content: content.into(),
            },
        }
    }

    pub fn markup(sequence: Sequence, content: impl Into<String>) -> Self {
        Self {
            sequence,
            kind: FrameKind::Markup {
                content: content.into(),
            },
        }
    }

    /// Sets the key on an element or view unit frame; other kinds are returned unchanged.
    pub fn with_key(mut self, new_key: Option<String>) -> Self {
        match &mut self.kind {
            FrameKind::Element { key, .. } | FrameKind::ViewUnit { key, .. } => *key = new_key,
            _ => {}
        }
        self
    }

    /// Same frame at a different sequence number.
    pub fn with_sequence(mut self, sequence: Sequence) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn subtree_length(&self) -> Option<usize> {
        match &self.kind {
            FrameKind::Element { subtree_length, .. }
            | FrameKind::ViewUnit { subtree_length, .. }
            | FrameKind::Region { subtree_length } => Some(*subtree_length),
            _ => None,
        }
    }

    pub fn is_attribute(&self) -> bool {
        matches!(self.kind, FrameKind::Attribute { .. })
    }

    pub fn is_none(&self) -> bool {
        matches!(self.kind, FrameKind::None)
    }

    pub fn attribute_name(&self) -> Option<&str> {
        match &self.kind {
            FrameKind::Attribute { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn attribute_value(&self) -> Option<&AttributeValue> {
        match &self.kind {
            FrameKind::Attribute { value, .. } => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            FrameKind::None => write!(f, "None"),
            FrameKind::Element {
                name,
                subtree_length,
                key,
            } => {
                write!(
                    f,
                    "Element: {} (seq={}, subtree_length={}",
                    name, self.sequence, subtree_length
                )?;
                if let Some(key) = key {
                    write!(f, ", key={}", key)?;
                }
                write!(f, ")")
            }
            FrameKind::Attribute { name, value, .. } => {
                write!(f, "Attribute: {}={} (seq={})", name, value, self.sequence)
            }
            FrameKind::ViewUnit {
                unit_type,
                subtree_length,
                key,
                ..
            } => {
                let name = unit_type
                    .as_ref()
                    .map(|unit_type| unit_type.name.as_str())
                    .unwrap_or("<unknown>");
                write!(
                    f,
                    "ViewUnit: {} (seq={}, subtree_length={}",
                    name, self.sequence, subtree_length
                )?;
                if let Some(key) = key {
                    write!(f, ", key={}", key)?;
                }
                write!(f, ")")
            }
            FrameKind::Region { subtree_length } => write!(
                f,
                "Region (seq={}, subtree_length={})",
                self.sequence, subtree_length
            ),
            FrameKind::Text { content } => {
                write!(f, "Text: {:?} (seq={})", content, self.sequence)
            }
            FrameKind::Markup { content } => {
                write!(f, "Markup: {:?} (seq={})", content, self.sequence)
            }
        }
    }
}
