use log::debug;

use crate::error::{Error, ErrorKind, Result};
use crate::metadata::{AttrId, AttrMetadata};
use crate::value::AttributeValue;

/// Default number of elements reserved for list payloads.
pub const DEFAULT_LIST_SIZE: usize = 16;

/// Sizing strategy of a newly allocated attribute.
#[derive(Debug, Clone, Copy)]
pub enum AllocInfo<'a> {
    /// Reserve [`DEFAULT_LIST_SIZE`] elements.
    Default,
    /// Reserve the given number of elements.
    Size(usize),
    /// Reserve as many elements as held by a reference attribute.
    Reference(&'a Attribute),
}

impl AllocInfo<'_> {
    fn size(self) -> usize {
        match self {
            Self::Default => DEFAULT_LIST_SIZE,
            Self::Size(size) => size,
            Self::Reference(attribute) => attribute.value.len().unwrap_or(0),
        }
    }
}

/// An attribute.
///
/// A list attribute may carry a capacity, the maximum number of elements the
/// owner is willing to receive. Copying a larger value into it fails with
/// [`ErrorKind::BufferOverflow`] and updates the capacity to the required one,
/// so the owner can retry.
#[derive(Debug, Clone)]
pub struct Attribute {
    /// Attribute identifier.
    pub id: AttrId,
    /// Attribute value.
    pub value: AttributeValue,
    // Maximum number of list elements, unbounded when absent.
    capacity: Option<usize>,
}

impl PartialEq for Attribute {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.value == other.value
    }
}

impl Attribute {
    /// Creates an unbounded [`Attribute`].
    pub fn new(id: AttrId, value: impl Into<AttributeValue>) -> Self {
        Self {
            id,
            value: value.into(),
            capacity: None,
        }
    }

    /// Creates an [`Attribute`] whose list payload accepts at most
    /// `capacity` elements.
    pub fn with_capacity(id: AttrId, value: impl Into<AttributeValue>, capacity: usize) -> Self {
        Self {
            id,
            value: value.into(),
            capacity: Some(capacity),
        }
    }

    /// Allocates an empty [`Attribute`] described by its metadata.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::NoMemory`] if the payload cannot be reserved.
    pub fn alloc(meta: &AttrMetadata, info: AllocInfo<'_>) -> Result<Self> {
        let size = info.size();
        let value = AttributeValue::empty(meta.kind, size)?;
        let capacity = meta.kind.is_list().then_some(size);

        Ok(Self {
            id: meta.id,
            value,
            capacity,
        })
    }

    /// Allocates an empty bounded [`Attribute`] for every metadata entry.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::NoMemory`] if a payload cannot be reserved.
    pub fn alloc_all<'a>(
        metas: impl IntoIterator<Item = &'a AttrMetadata>,
        info: AllocInfo<'_>,
    ) -> Result<Vec<Self>> {
        metas
            .into_iter()
            .map(|meta| Self::alloc(meta, info))
            .collect()
    }

    /// Returns the list capacity.
    #[must_use]
    pub const fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Deep copies the value of `src` into this attribute.
    ///
    /// The identifier is preserved.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::BufferOverflow`] when the source list is longer
    /// than this attribute's capacity, and [`ErrorKind::NoMemory`] when the
    /// payload cannot be reserved.
    pub fn copy_from(&mut self, src: &Attribute) -> Result<()> {
        self.copy_value(&src.value)
    }

    /// Deep copies `value` into this attribute.
    ///
    /// # Errors
    ///
    /// Same as [`Attribute::copy_from`].
    pub fn copy_value(&mut self, value: &AttributeValue) -> Result<()> {
        if let (Some(capacity), Some(required)) = (self.capacity, value.len())
            && required > capacity
        {
            debug!(
                "attribute {} needs {} elements, capacity is {}",
                self.id, required, capacity
            );
            self.capacity = Some(required);
            return Err(Error::new(
                ErrorKind::BufferOverflow,
                format!("Attribute {} requires a capacity of {required}", self.id),
            ));
        }
        self.value = value.try_clone()?;
        Ok(())
    }
}
