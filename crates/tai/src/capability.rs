use serde::Serialize;

use crate::metadata::{AttrId, AttrMetadata};
use crate::value::{AttributeValue, ValueKind};

/// The legal value space of an attribute on one object.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AttributeCapability {
    /// Attribute identifier.
    pub id: AttrId,
    /// Default value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<AttributeValue>,
    /// Minimum value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<AttributeValue>,
    /// Maximum value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<AttributeValue>,
    /// Enumerated values.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub supported: Vec<AttributeValue>,
}

// Converts a numeric bound into a value of the given kind.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn bound(kind: ValueKind, value: f64) -> Option<AttributeValue> {
    Some(match kind {
        ValueKind::U8 => AttributeValue::U8(value as u8),
        ValueKind::S8 => AttributeValue::S8(value as i8),
        ValueKind::U16 => AttributeValue::U16(value as u16),
        ValueKind::S16 => AttributeValue::S16(value as i16),
        ValueKind::U32 => AttributeValue::U32(value as u32),
        ValueKind::S32 => AttributeValue::S32(value as i32),
        ValueKind::U64 => AttributeValue::U64(value as u64),
        ValueKind::S64 => AttributeValue::S64(value as i64),
        ValueKind::Float => AttributeValue::Float(value as f32),
        _ => return None,
    })
}

impl AttributeCapability {
    /// Creates an empty [`AttributeCapability`].
    #[must_use]
    pub fn new(id: AttrId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// Creates an [`AttributeCapability`] from the metadata declarations.
    #[must_use]
    pub fn from_metadata(meta: &AttrMetadata) -> Self {
        Self {
            id: meta.id,
            default: meta.default.clone(),
            min: meta.min.and_then(|min| bound(meta.kind, min)),
            max: meta.max.and_then(|max| bound(meta.kind, max)),
            supported: meta
                .enum_metadata
                .map(|e| e.raw_values().map(AttributeValue::S32).collect())
                .unwrap_or_default(),
        }
    }

    /// Sets the bounds from numeric values, using the kind of the metadata.
    #[must_use]
    pub fn with_bounds(mut self, kind: ValueKind, min: f64, max: f64) -> Self {
        self.min = bound(kind, min);
        self.max = bound(kind, max);
        self
    }

    /// Restricts the enumerated values.
    #[must_use]
    pub fn with_supported(mut self, supported: impl IntoIterator<Item = i32>) -> Self {
        self.supported = supported.into_iter().map(AttributeValue::S32).collect();
        self
    }
}
