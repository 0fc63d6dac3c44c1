use std::sync::Arc;

use serde::Serialize;

use crate::attribute::Attribute;
use crate::error::{Error, ErrorKind, Result};
use crate::object::ObjectId;

/// All supported kinds of attribute values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ValueKind {
    /// A [`bool`] value.
    Bool,
    /// An [`u8`] value.
    U8,
    /// An [`i8`] value.
    S8,
    /// An [`u16`] value.
    U16,
    /// An [`i16`] value.
    S16,
    /// An [`u32`] value.
    U32,
    /// An [`i32`] value, also used for enumerations.
    S32,
    /// An [`u64`] value.
    U64,
    /// An [`i64`] value.
    S64,
    /// A [`f32`] value.
    Float,
    /// An [`ObjectId`].
    Oid,
    /// A bounded string.
    CharList,
    /// A list of [`u8`].
    U8List,
    /// A list of [`i8`].
    S8List,
    /// A list of [`u16`].
    U16List,
    /// A list of [`i16`].
    S16List,
    /// A list of [`u32`].
    U32List,
    /// A list of [`i32`].
    S32List,
    /// A list of [`f32`].
    FloatList,
    /// A list of [`ObjectId`].
    ObjList,
    /// A range of [`u32`].
    U32Range,
    /// A range of [`i32`].
    S32Range,
    /// A list of identifier mappings.
    ObjMapList,
    /// A list of nested values.
    AttrList,
    /// A notification handler.
    Notification,
}

impl ValueKind {
    /// Whether values of this kind carry a variable-length payload.
    #[must_use]
    pub const fn is_list(self) -> bool {
        matches!(
            self,
            Self::CharList
                | Self::U8List
                | Self::S8List
                | Self::U16List
                | Self::S16List
                | Self::U32List
                | Self::S32List
                | Self::FloatList
                | Self::ObjList
                | Self::ObjMapList
                | Self::AttrList
        )
    }
}

/// A mapping from an object to a list of objects.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectMap {
    /// Mapping key.
    pub key: ObjectId,
    /// Mapped objects.
    pub value: Vec<ObjectId>,
}

type NotificationFn = dyn Fn(ObjectId, &[Attribute]) + Send + Sync;

/// A callback receiving batches of changed attributes.
///
/// Two handlers are equal when they share the same callback.
#[derive(Clone, Default)]
pub struct NotificationHandler {
    callback: Option<Arc<NotificationFn>>,
}

impl NotificationHandler {
    /// Creates a [`NotificationHandler`] around a callback.
    pub fn new(callback: impl Fn(ObjectId, &[Attribute]) + Send + Sync + 'static) -> Self {
        Self {
            callback: Some(Arc::new(callback)),
        }
    }

    /// Creates an empty [`NotificationHandler`].
    #[must_use]
    pub const fn none() -> Self {
        Self { callback: None }
    }

    /// Whether a callback is registered.
    #[must_use]
    pub const fn is_set(&self) -> bool {
        self.callback.is_some()
    }

    /// Invokes the callback, if any.
    ///
    /// Returns `false` when no callback is registered.
    pub fn notify(&self, id: ObjectId, attributes: &[Attribute]) -> bool {
        match &self.callback {
            Some(callback) => {
                callback(id, attributes);
                true
            }
            None => false,
        }
    }
}

impl PartialEq for NotificationHandler {
    fn eq(&self, other: &Self) -> bool {
        match (&self.callback, &other.callback) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl core::fmt::Debug for NotificationHandler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NotificationHandler")
            .field("set", &self.is_set())
            .finish()
    }
}

/// An attribute value.
///
/// Variable-length payloads are exclusively owned by the value, so cloning
/// performs a deep copy and equality compares element by element.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// A [`bool`] value.
    Bool(bool),
    /// An [`u8`] value.
    U8(u8),
    /// An [`i8`] value.
    S8(i8),
    /// An [`u16`] value.
    U16(u16),
    /// An [`i16`] value.
    S16(i16),
    /// An [`u32`] value.
    U32(u32),
    /// An [`i32`] value.
    S32(i32),
    /// An [`u64`] value.
    U64(u64),
    /// An [`i64`] value.
    S64(i64),
    /// A [`f32`] value.
    Float(f32),
    /// An [`ObjectId`].
    Oid(ObjectId),
    /// A bounded string.
    CharList(String),
    /// A list of [`u8`].
    U8List(Vec<u8>),
    /// A list of [`i8`].
    S8List(Vec<i8>),
    /// A list of [`u16`].
    U16List(Vec<u16>),
    /// A list of [`i16`].
    S16List(Vec<i16>),
    /// A list of [`u32`].
    U32List(Vec<u32>),
    /// A list of [`i32`].
    S32List(Vec<i32>),
    /// A list of [`f32`].
    FloatList(Vec<f32>),
    /// A list of [`ObjectId`].
    ObjList(Vec<ObjectId>),
    /// A range of [`u32`].
    U32Range {
        /// Lower bound.
        min: u32,
        /// Upper bound.
        max: u32,
    },
    /// A range of [`i32`].
    S32Range {
        /// Lower bound.
        min: i32,
        /// Upper bound.
        max: i32,
    },
    /// A list of identifier mappings.
    ObjMapList(Vec<ObjectMap>),
    /// A list of nested values.
    AttrList(Vec<AttributeValue>),
    /// A notification handler.
    Notification(NotificationHandler),
}

fn try_clone_slice<T: Clone>(src: &[T]) -> Result<Vec<T>> {
    let mut dst = Vec::new();
    dst.try_reserve_exact(src.len())?;
    dst.extend_from_slice(src);
    Ok(dst)
}

fn try_alloc<T>(capacity: usize) -> Result<Vec<T>> {
    let mut dst = Vec::new();
    dst.try_reserve_exact(capacity)?;
    Ok(dst)
}

impl AttributeValue {
    /// Returns the [`ValueKind`] of this value.
    #[must_use]
    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::Bool(_) => ValueKind::Bool,
            Self::U8(_) => ValueKind::U8,
            Self::S8(_) => ValueKind::S8,
            Self::U16(_) => ValueKind::U16,
            Self::S16(_) => ValueKind::S16,
            Self::U32(_) => ValueKind::U32,
            Self::S32(_) => ValueKind::S32,
            Self::U64(_) => ValueKind::U64,
            Self::S64(_) => ValueKind::S64,
            Self::Float(_) => ValueKind::Float,
            Self::Oid(_) => ValueKind::Oid,
            Self::CharList(_) => ValueKind::CharList,
            Self::U8List(_) => ValueKind::U8List,
            Self::S8List(_) => ValueKind::S8List,
            Self::U16List(_) => ValueKind::U16List,
            Self::S16List(_) => ValueKind::S16List,
            Self::U32List(_) => ValueKind::U32List,
            Self::S32List(_) => ValueKind::S32List,
            Self::FloatList(_) => ValueKind::FloatList,
            Self::ObjList(_) => ValueKind::ObjList,
            Self::U32Range { .. } => ValueKind::U32Range,
            Self::S32Range { .. } => ValueKind::S32Range,
            Self::ObjMapList(_) => ValueKind::ObjMapList,
            Self::AttrList(_) => ValueKind::AttrList,
            Self::Notification(_) => ValueKind::Notification,
        }
    }

    /// Creates the zero value of a [`ValueKind`].
    ///
    /// List payloads reserve room for `capacity` elements.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::NoMemory`] if the payload cannot be reserved.
    pub fn empty(kind: ValueKind, capacity: usize) -> Result<Self> {
        Ok(match kind {
            ValueKind::Bool => Self::Bool(false),
            ValueKind::U8 => Self::U8(0),
            ValueKind::S8 => Self::S8(0),
            ValueKind::U16 => Self::U16(0),
            ValueKind::S16 => Self::S16(0),
            ValueKind::U32 => Self::U32(0),
            ValueKind::S32 => Self::S32(0),
            ValueKind::U64 => Self::U64(0),
            ValueKind::S64 => Self::S64(0),
            ValueKind::Float => Self::Float(0.0),
            ValueKind::Oid => Self::Oid(ObjectId::NULL),
            ValueKind::CharList => {
                let mut s = String::new();
                s.try_reserve_exact(capacity)?;
                Self::CharList(s)
            }
            ValueKind::U8List => Self::U8List(try_alloc(capacity)?),
            ValueKind::S8List => Self::S8List(try_alloc(capacity)?),
            ValueKind::U16List => Self::U16List(try_alloc(capacity)?),
            ValueKind::S16List => Self::S16List(try_alloc(capacity)?),
            ValueKind::U32List => Self::U32List(try_alloc(capacity)?),
            ValueKind::S32List => Self::S32List(try_alloc(capacity)?),
            ValueKind::FloatList => Self::FloatList(try_alloc(capacity)?),
            ValueKind::ObjList => Self::ObjList(try_alloc(capacity)?),
            ValueKind::U32Range => Self::U32Range { min: 0, max: 0 },
            ValueKind::S32Range => Self::S32Range { min: 0, max: 0 },
            ValueKind::ObjMapList => Self::ObjMapList(try_alloc(capacity)?),
            ValueKind::AttrList => Self::AttrList(try_alloc(capacity)?),
            ValueKind::Notification => Self::Notification(NotificationHandler::none()),
        })
    }

    /// Returns the number of elements of a list payload.
    ///
    /// Scalars return [`None`].
    #[must_use]
    pub fn len(&self) -> Option<usize> {
        match self {
            Self::CharList(v) => Some(v.len()),
            Self::U8List(v) => Some(v.len()),
            Self::S8List(v) => Some(v.len()),
            Self::U16List(v) => Some(v.len()),
            Self::S16List(v) => Some(v.len()),
            Self::U32List(v) => Some(v.len()),
            Self::S32List(v) => Some(v.len()),
            Self::FloatList(v) => Some(v.len()),
            Self::ObjList(v) => Some(v.len()),
            Self::ObjMapList(v) => Some(v.len()),
            Self::AttrList(v) => Some(v.len()),
            _ => None,
        }
    }

    /// Whether a list payload holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// Deep copies the value, reporting allocation failures.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::NoMemory`] if a payload cannot be reserved.
    pub fn try_clone(&self) -> Result<Self> {
        Ok(match self {
            Self::CharList(v) => {
                let mut s = String::new();
                s.try_reserve_exact(v.len())?;
                s.push_str(v);
                Self::CharList(s)
            }
            Self::U8List(v) => Self::U8List(try_clone_slice(v)?),
            Self::S8List(v) => Self::S8List(try_clone_slice(v)?),
            Self::U16List(v) => Self::U16List(try_clone_slice(v)?),
            Self::S16List(v) => Self::S16List(try_clone_slice(v)?),
            Self::U32List(v) => Self::U32List(try_clone_slice(v)?),
            Self::S32List(v) => Self::S32List(try_clone_slice(v)?),
            Self::FloatList(v) => Self::FloatList(try_clone_slice(v)?),
            Self::ObjList(v) => Self::ObjList(try_clone_slice(v)?),
            Self::ObjMapList(v) => {
                let mut maps = try_alloc(v.len())?;
                for map in v {
                    maps.push(ObjectMap {
                        key: map.key,
                        value: try_clone_slice(&map.value)?,
                    });
                }
                Self::ObjMapList(maps)
            }
            Self::AttrList(v) => {
                let mut values = try_alloc(v.len())?;
                for value in v {
                    values.push(value.try_clone()?);
                }
                Self::AttrList(values)
            }
            scalar => scalar.clone(),
        })
    }

    /// Checks that the value has the expected kind.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidValue`] on mismatch.
    pub fn expect_kind(&self, kind: ValueKind) -> Result<()> {
        if self.kind() == kind {
            Ok(())
        } else {
            Err(Error::new(
                ErrorKind::InvalidValue,
                format!("Expected a {kind:?} value, found {:?}", self.kind()),
            ))
        }
    }

    /// Returns the value as [`bool`], if it is one.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value as [`u32`], if it is one.
    #[must_use]
    pub const fn as_u32(&self) -> Option<u32> {
        match self {
            Self::U32(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value as [`i32`], if it is one.
    #[must_use]
    pub const fn as_i32(&self) -> Option<i32> {
        match self {
            Self::S32(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value as a string slice, if it is a bounded string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::CharList(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the notification handler, if the value holds one.
    #[must_use]
    pub const fn as_notification(&self) -> Option<&NotificationHandler> {
        match self {
            Self::Notification(v) => Some(v),
            _ => None,
        }
    }

    /// Returns a numeric scalar as [`f64`].
    ///
    /// Used to check values against numeric bounds.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        Some(match self {
            Self::U8(v) => f64::from(*v),
            Self::S8(v) => f64::from(*v),
            Self::U16(v) => f64::from(*v),
            Self::S16(v) => f64::from(*v),
            Self::U32(v) => f64::from(*v),
            Self::S32(v) => f64::from(*v),
            #[allow(clippy::cast_precision_loss)]
            Self::U64(v) => *v as f64,
            #[allow(clippy::cast_precision_loss)]
            Self::S64(v) => *v as f64,
            Self::Float(v) => f64::from(*v),
            _ => return None,
        })
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<u8> for AttributeValue {
    fn from(value: u8) -> Self {
        Self::U8(value)
    }
}

impl From<i8> for AttributeValue {
    fn from(value: i8) -> Self {
        Self::S8(value)
    }
}

impl From<u16> for AttributeValue {
    fn from(value: u16) -> Self {
        Self::U16(value)
    }
}

impl From<i16> for AttributeValue {
    fn from(value: i16) -> Self {
        Self::S16(value)
    }
}

impl From<u32> for AttributeValue {
    fn from(value: u32) -> Self {
        Self::U32(value)
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        Self::S32(value)
    }
}

impl From<u64> for AttributeValue {
    fn from(value: u64) -> Self {
        Self::U64(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::S64(value)
    }
}

impl From<f32> for AttributeValue {
    fn from(value: f32) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::CharList(value.into())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::CharList(value)
    }
}

impl From<ObjectId> for AttributeValue {
    fn from(value: ObjectId) -> Self {
        Self::Oid(value)
    }
}

impl From<NotificationHandler> for AttributeValue {
    fn from(value: NotificationHandler) -> Self {
        Self::Notification(value)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::object::{ObjectId, ObjectType};

    use super::{AttributeValue, NotificationHandler, ObjectMap, ValueKind};

    #[test]
    fn nested_deep_copy() {
        let module = ObjectId::module(0);
        let original = AttributeValue::AttrList(vec![
            AttributeValue::U32List(vec![1, 2, 3]),
            AttributeValue::ObjMapList(vec![ObjectMap {
                key: module,
                value: vec![ObjectId::child(ObjectType::HostInterface, module, 0)],
            }]),
            AttributeValue::CharList("line".into()),
        ]);

        let mut copy = original.try_clone().unwrap();
        assert_eq!(copy, original);

        if let AttributeValue::AttrList(values) = &mut copy {
            values.clear();
        }
        assert_ne!(copy, original);
        assert_eq!(original.len(), Some(3));
    }

    #[test]
    fn empty_values() {
        let value = AttributeValue::empty(ValueKind::FloatList, 16).unwrap();
        assert!(value.is_empty());
        assert_eq!(value.kind(), ValueKind::FloatList);

        let value = AttributeValue::empty(ValueKind::S32, 16).unwrap();
        assert_eq!(value.len(), None);
        assert_eq!(value.as_i32(), Some(0));
    }

    #[test]
    fn handler_identity() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let handler = NotificationHandler::new(move |_, attrs| {
            counter.fetch_add(attrs.len(), Ordering::SeqCst);
        });

        assert_eq!(handler, handler.clone());
        assert_ne!(handler, NotificationHandler::new(|_, _| {}));
        assert_eq!(NotificationHandler::none(), NotificationHandler::default());

        assert!(handler.notify(ObjectId::NULL, &[]));
        assert!(!NotificationHandler::none().notify(ObjectId::NULL, &[]));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn kind_mismatch() {
        let value = AttributeValue::from(true);
        assert!(value.expect_kind(ValueKind::Bool).is_ok());
        assert!(value.expect_kind(ValueKind::U32).is_err());
        assert_eq!(AttributeValue::from(7u32).as_f64(), Some(7.0));
    }

    #[test]
    fn narrow_scalars() {
        assert_eq!(AttributeValue::from(3u16).kind(), ValueKind::U16);
        assert_eq!(AttributeValue::from(-3i16).kind(), ValueKind::S16);
        assert_eq!(AttributeValue::from(1u8).kind(), ValueKind::U8);
        assert_eq!(AttributeValue::from(-1i8).kind(), ValueKind::S8);
        assert_eq!(AttributeValue::from(-5i64), AttributeValue::S64(-5));
        assert_eq!(AttributeValue::from(9u16).as_f64(), Some(9.0));
    }
}
