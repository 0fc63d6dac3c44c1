use serde::{Deserialize, Serialize};

// Bit position of the object type inside an identifier.
const OBJECT_TYPE_SHIFT: u32 = 48;
// Bit position of the device slot inside an identifier.
const SLOT_SHIFT: u32 = 16;
// Mask of the device slot once shifted down.
const SLOT_MASK: u64 = 0xFFFF_FFFF;
// Mask of the local index.
const INDEX_MASK: u64 = 0xFFFF;

/// An object type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u16)]
pub enum ObjectType {
    /// Unknown or absent object.
    Null = 0,
    /// An optical module, the root of an object tree.
    Module = 1,
    /// A host-side interface of a module.
    HostInterface = 2,
    /// A line-side interface of a module.
    NetworkInterface = 3,
}

impl ObjectType {
    /// All object types which can be instantiated.
    pub const ALL: [Self; 3] = [Self::Module, Self::HostInterface, Self::NetworkInterface];

    const fn description(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Module => "module",
            Self::HostInterface => "host-interface",
            Self::NetworkInterface => "network-interface",
        }
    }

    /// Converts a raw numeric value into an [`ObjectType`].
    ///
    /// Unknown values map to [`ObjectType::Null`].
    #[must_use]
    pub const fn from_raw(raw: u16) -> Self {
        match raw {
            1 => Self::Module,
            2 => Self::HostInterface,
            3 => Self::NetworkInterface,
            _ => Self::Null,
        }
    }

    /// Whether objects of this type own a state machine.
    #[must_use]
    pub const fn is_root(self) -> bool {
        matches!(self, Self::Module)
    }
}

impl core::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// An object identifier.
///
/// The identifier packs the object type in its 16 most significant bits,
/// followed by a 32-bit device slot and a 16-bit local index. Identifiers are
/// therefore derived deterministically from `(type, slot, index)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(u64);

impl ObjectId {
    /// The null identifier.
    pub const NULL: Self = Self(0);

    /// Creates an [`ObjectId`] from its raw value.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Creates an [`ObjectId`] from its components.
    #[must_use]
    pub const fn new(object_type: ObjectType, slot: u32, index: u16) -> Self {
        Self(
            ((object_type as u64) << OBJECT_TYPE_SHIFT)
                | ((slot as u64) << SLOT_SHIFT)
                | index as u64,
        )
    }

    /// Creates the identifier of the module plugged in `slot`.
    #[must_use]
    pub const fn module(slot: u32) -> Self {
        Self::new(ObjectType::Module, slot, 0)
    }

    /// Creates the identifier of a child object of `module`.
    #[must_use]
    pub const fn child(object_type: ObjectType, module: Self, index: u16) -> Self {
        Self::new(object_type, module.slot(), index)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Whether this is the null identifier.
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Returns the encoded [`ObjectType`].
    #[must_use]
    pub const fn object_type(self) -> ObjectType {
        ObjectType::from_raw((self.0 >> OBJECT_TYPE_SHIFT) as u16)
    }

    /// Returns the encoded device slot.
    #[must_use]
    pub const fn slot(self) -> u32 {
        ((self.0 >> SLOT_SHIFT) & SLOT_MASK) as u32
    }

    /// Returns the encoded local index.
    #[must_use]
    pub const fn index(self) -> u16 {
        (self.0 & INDEX_MASK) as u16
    }

    /// Returns the identifier of the module owning this object.
    ///
    /// A module returns itself, a null identifier returns
    /// [`ObjectId::NULL`].
    #[must_use]
    pub const fn module_id(self) -> Self {
        match self.object_type() {
            ObjectType::Null => Self::NULL,
            _ => Self::module(self.slot()),
        }
    }
}

impl core::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::{ObjectId, ObjectType};

    #[test]
    fn identifier_layout() {
        let module = ObjectId::module(3);
        assert_eq!(module.raw(), 0x0001_0000_0003_0000);
        assert_eq!(module.object_type(), ObjectType::Module);
        assert_eq!(module.module_id(), module);

        let netif = ObjectId::child(ObjectType::NetworkInterface, module, 0);
        assert_eq!(netif.object_type(), ObjectType::NetworkInterface);
        assert_eq!(netif.slot(), 3);
        assert_eq!(netif.module_id(), module);

        let hostif = ObjectId::child(ObjectType::HostInterface, module, 1);
        assert_eq!(hostif.index(), 1);
        assert_ne!(hostif, netif);
        assert_eq!(hostif.to_string(), "0x2000000030001");
    }

    #[test]
    fn null_identifier() {
        assert!(ObjectId::NULL.is_null());
        assert_eq!(ObjectId::NULL.object_type(), ObjectType::Null);
        assert_eq!(ObjectId::NULL.module_id(), ObjectId::NULL);
        assert_eq!(ObjectId::from_raw(0x00FF_0000_0000_0000).object_type(), ObjectType::Null);
    }
}
