use serde::Serialize;

use crate::object::ObjectType;
use crate::value::{AttributeValue, ValueKind};

/// An attribute identifier, unique within an object type.
pub type AttrId = u32;

/// Attribute usage flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct AttrFlags {
    /// The attribute must be provided when creating the object.
    pub mandatory_on_create: bool,
    /// The attribute can only be provided when creating the object.
    pub create_only: bool,
    /// The attribute cannot be written by a client.
    pub read_only: bool,
    /// The attribute can be cleared back to its default.
    pub clearable: bool,
}

impl AttrFlags {
    /// Flags of a plain writable attribute.
    pub const NONE: Self = Self {
        mandatory_on_create: false,
        create_only: false,
        read_only: false,
        clearable: false,
    };

    /// Flags of a read-only attribute.
    pub const READ_ONLY: Self = Self {
        read_only: true,
        ..Self::NONE
    };

    /// Flags of an attribute required and fixed at creation.
    pub const MANDATORY_CREATE_ONLY: Self = Self {
        mandatory_on_create: true,
        create_only: true,
        ..Self::NONE
    };

    /// Flags of a clearable attribute.
    pub const CLEARABLE: Self = Self {
        clearable: true,
        ..Self::NONE
    };
}

/// Names of the values of an enumeration attribute.
#[derive(Debug, PartialEq, Serialize)]
pub struct EnumMetadata {
    /// Enumeration name.
    pub name: &'static str,
    /// Pairs of raw value and short name.
    pub values: &'static [(i32, &'static str)],
}

impl EnumMetadata {
    /// Returns the short name of a raw value.
    #[must_use]
    pub fn name_of(&self, value: i32) -> Option<&'static str> {
        self.values
            .iter()
            .find_map(|(v, name)| (*v == value).then_some(*name))
    }

    /// Returns the raw value of a short name.
    #[must_use]
    pub fn value_of(&self, name: &str) -> Option<i32> {
        self.values
            .iter()
            .find_map(|(v, n)| (*n == name).then_some(*v))
    }

    /// Returns all raw values.
    pub fn raw_values(&self) -> impl Iterator<Item = i32> + '_ {
        self.values.iter().map(|(v, _)| *v)
    }
}

/// Attribute metadata.
///
/// Metadata are immutable and live for the whole process lifetime.
#[derive(Debug, PartialEq, Serialize)]
pub struct AttrMetadata {
    /// Type of the owning object.
    pub object_type: ObjectType,
    /// Attribute identifier.
    pub id: AttrId,
    /// Full attribute name.
    pub name: &'static str,
    /// Short attribute name.
    pub short_name: &'static str,
    /// Kind of the attribute value.
    pub kind: ValueKind,
    /// Usage flags.
    pub flags: AttrFlags,
    /// Default value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<AttributeValue>,
    /// Enumeration names.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_metadata: Option<&'static EnumMetadata>,
    /// Minimum numeric value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Maximum numeric value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl AttrMetadata {
    /// Creates an [`AttrMetadata`] without default, enumeration or bounds.
    #[must_use]
    pub const fn new(
        object_type: ObjectType,
        id: AttrId,
        name: &'static str,
        short_name: &'static str,
        kind: ValueKind,
        flags: AttrFlags,
    ) -> Self {
        Self {
            object_type,
            id,
            name,
            short_name,
            kind,
            flags,
            default: None,
            enum_metadata: None,
            min: None,
            max: None,
        }
    }

    /// Sets the default value.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<AttributeValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Sets the enumeration names.
    #[must_use]
    pub const fn enumeration(mut self, enum_metadata: &'static EnumMetadata) -> Self {
        self.enum_metadata = Some(enum_metadata);
        self
    }

    /// Sets the numeric bounds.
    #[must_use]
    pub const fn bounds(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    /// Whether the attribute is read-only.
    #[must_use]
    pub const fn is_read_only(&self) -> bool {
        self.flags.read_only
    }

    /// Whether the attribute can be cleared.
    #[must_use]
    pub const fn is_clearable(&self) -> bool {
        self.flags.clearable
    }

    /// Whether the attribute must be provided at creation.
    #[must_use]
    pub const fn is_mandatory_on_create(&self) -> bool {
        self.flags.mandatory_on_create
    }

    /// Whether the attribute can only be provided at creation.
    #[must_use]
    pub const fn is_create_only(&self) -> bool {
        self.flags.create_only
    }
}

/// Summary of an object type.
#[derive(Debug, PartialEq, Serialize)]
pub struct ObjectInfo {
    /// Object type.
    pub object_type: ObjectType,
    /// Object type name.
    pub name: String,
    /// Number of attributes of the object type.
    pub attributes: usize,
    /// Identifiers of the mandatory creation attributes.
    pub mandatory: Vec<AttrId>,
}

#[cfg(test)]
mod tests {
    use crate::object::ObjectType;
    use crate::value::ValueKind;

    use super::{AttrFlags, AttrMetadata, EnumMetadata};

    const STATUS: EnumMetadata = EnumMetadata {
        name: "status",
        values: &[(0, "down"), (1, "up")],
    };

    #[test]
    fn enum_names() {
        assert_eq!(STATUS.name_of(1), Some("up"));
        assert_eq!(STATUS.value_of("down"), Some(0));
        assert_eq!(STATUS.value_of("unknown"), None);
        assert_eq!(STATUS.raw_values().collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn metadata_builder() {
        static ENUM: EnumMetadata = STATUS;

        let meta = AttrMetadata::new(
            ObjectType::Module,
            7,
            "TAI_MODULE_ATTR_TEST",
            "test",
            ValueKind::S32,
            AttrFlags::CLEARABLE,
        )
        .default_value(1)
        .enumeration(&ENUM);

        assert!(meta.is_clearable());
        assert!(!meta.is_read_only());
        assert_eq!(meta.default, Some(1.into()));
        assert_eq!(meta.enum_metadata.and_then(|e| e.name_of(1)), Some("up"));

        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["short_name"], "test");
        assert!(json.get("min").is_none());
    }
}
