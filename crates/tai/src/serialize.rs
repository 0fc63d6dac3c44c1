use log::warn;

use serde::{Serialize, Serializer};
use serde_json::{Map as JsonMap, Value, json};

use crate::attribute::Attribute;
use crate::catalog;
use crate::error::{Error, ErrorKind, Result};
use crate::metadata::{AttrMetadata, EnumMetadata};
use crate::object::{ObjectId, ObjectType};
use crate::value::{AttributeValue, ObjectMap, ValueKind};

// Separator between an attribute name and its value.
const NAME_SEPARATOR: &str = " | ";

/// Text serialization options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SerializeOptions {
    // Use short names for attributes and enumeration values.
    human: bool,
    // Omit the attribute name.
    value_only: bool,
    // Produce JSON text.
    json: bool,
}

impl SerializeOptions {
    /// Creates [`SerializeOptions`] with every option disabled.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            human: false,
            value_only: false,
            json: false,
        }
    }

    /// Uses short names for attributes and enumeration values.
    #[must_use]
    pub const fn human(mut self, human: bool) -> Self {
        self.human = human;
        self
    }

    /// Omits the attribute name.
    #[must_use]
    pub const fn value_only(mut self, value_only: bool) -> Self {
        self.value_only = value_only;
        self
    }

    /// Produces JSON text.
    #[must_use]
    pub const fn json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }
}

impl Serialize for AttributeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        to_json(self, None, false).serialize(serializer)
    }
}

fn enum_to_json(value: i32, enum_metadata: Option<&EnumMetadata>, human: bool) -> Value {
    match enum_metadata {
        Some(meta) if human => match meta.name_of(value) {
            Some(name) => Value::String(name.into()),
            None => {
                warn!("enum value {} not found in enum {}", value, meta.name);
                Value::from(value)
            }
        },
        _ => Value::from(value),
    }
}

fn ids_to_json(ids: &[ObjectId]) -> Value {
    Value::Array(ids.iter().map(|id| Value::from(id.raw())).collect())
}

/// Converts a value into a JSON value.
///
/// With `human` set, enumeration values described by `enum_metadata` are
/// rendered with their short names.
#[must_use]
pub fn to_json(value: &AttributeValue, enum_metadata: Option<&EnumMetadata>, human: bool) -> Value {
    match value {
        AttributeValue::Bool(v) => Value::from(*v),
        AttributeValue::U8(v) => Value::from(*v),
        AttributeValue::S8(v) => Value::from(*v),
        AttributeValue::U16(v) => Value::from(*v),
        AttributeValue::S16(v) => Value::from(*v),
        AttributeValue::U32(v) => Value::from(*v),
        AttributeValue::S32(v) => enum_to_json(*v, enum_metadata, human),
        AttributeValue::U64(v) => Value::from(*v),
        AttributeValue::S64(v) => Value::from(*v),
        AttributeValue::Float(v) => Value::from(*v),
        AttributeValue::Oid(v) => Value::from(v.raw()),
        AttributeValue::CharList(v) => Value::String(v.clone()),
        AttributeValue::U8List(v) => json!(v),
        AttributeValue::S8List(v) => json!(v),
        AttributeValue::U16List(v) => json!(v),
        AttributeValue::S16List(v) => json!(v),
        AttributeValue::U32List(v) => json!(v),
        AttributeValue::S32List(v) => Value::Array(
            v.iter()
                .map(|v| enum_to_json(*v, enum_metadata, human))
                .collect(),
        ),
        AttributeValue::FloatList(v) => json!(v),
        AttributeValue::ObjList(v) => ids_to_json(v),
        AttributeValue::U32Range { min, max } => json!({ "min": min, "max": max }),
        AttributeValue::S32Range { min, max } => json!({ "min": min, "max": max }),
        AttributeValue::ObjMapList(v) => Value::Array(
            v.iter()
                .map(|map| json!({ "key": map.key.raw(), "value": ids_to_json(&map.value) }))
                .collect(),
        ),
        AttributeValue::AttrList(v) => Value::Array(
            v.iter()
                .map(|v| to_json(v, enum_metadata, human))
                .collect(),
        ),
        AttributeValue::Notification(v) => {
            if v.is_set() {
                Value::String("callback".into())
            } else {
                Value::Null
            }
        }
    }
}

fn plain_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(values) => values
            .iter()
            .map(plain_text)
            .collect::<Vec<_>>()
            .join(","),
        other => other.to_string(),
    }
}

/// Serializes a value described by `meta`.
///
/// # Errors
///
/// Returns [`ErrorKind::InvalidValue`] if the value kind does not match the
/// metadata, and [`ErrorKind::Serialization`] if JSON output fails.
pub fn serialize_value(
    meta: &AttrMetadata,
    value: &AttributeValue,
    options: SerializeOptions,
) -> Result<String> {
    value.expect_kind(meta.kind)?;
    let json = to_json(value, meta.enum_metadata, options.human);
    if options.json {
        Ok(serde_json::to_string(&json)?)
    } else {
        Ok(plain_text(&json))
    }
}

/// Serializes an attribute described by `meta`.
///
/// Unless [`SerializeOptions::value_only`] is set, the value is prefixed by
/// the attribute name and a `" | "` separator.
///
/// # Errors
///
/// Same as [`serialize_value`].
pub fn serialize_attribute(
    meta: &AttrMetadata,
    attribute: &Attribute,
    options: SerializeOptions,
) -> Result<String> {
    let value = serialize_value(meta, &attribute.value, options)?;
    if options.value_only {
        return Ok(value);
    }
    let name = if options.human {
        meta.short_name
    } else {
        meta.name
    };
    Ok(format!("{name}{NAME_SEPARATOR}{value}"))
}

fn invalid(meta: &AttrMetadata, value: &Value) -> Error {
    Error::new(
        ErrorKind::InvalidValue,
        format!("Invalid {:?} value for {}: {value}", meta.kind, meta.short_name),
    )
}

fn integer<T: TryFrom<i64> + TryFrom<u64>>(meta: &AttrMetadata, value: &Value) -> Result<T> {
    let converted = match value {
        Value::Number(n) => n
            .as_u64()
            .and_then(|v| <T as TryFrom<u64>>::try_from(v).ok())
            .or_else(|| {
                n.as_i64()
                    .and_then(|v| <T as TryFrom<i64>>::try_from(v).ok())
            }),
        _ => None,
    };
    converted.ok_or_else(|| invalid(meta, value))
}

fn enum_value(meta: &AttrMetadata, value: &Value) -> Result<i32> {
    if let (Value::String(name), Some(enum_metadata)) = (value, meta.enum_metadata)
        && let Some(raw) = enum_metadata.value_of(name)
    {
        return Ok(raw);
    }
    integer(meta, value)
}

#[allow(clippy::cast_possible_truncation)]
fn float(meta: &AttrMetadata, value: &Value) -> Result<f32> {
    value
        .as_f64()
        .map(|v| v as f32)
        .ok_or_else(|| invalid(meta, value))
}

fn array<'a>(meta: &AttrMetadata, value: &'a Value) -> Result<&'a Vec<Value>> {
    value.as_array().ok_or_else(|| invalid(meta, value))
}

fn list<T>(
    meta: &AttrMetadata,
    value: &Value,
    element: impl Fn(&AttrMetadata, &Value) -> Result<T>,
) -> Result<Vec<T>> {
    let values = array(meta, value)?;
    let mut out = Vec::new();
    out.try_reserve_exact(values.len())?;
    for v in values {
        out.push(element(meta, v)?);
    }
    Ok(out)
}

fn object_id(meta: &AttrMetadata, value: &Value) -> Result<ObjectId> {
    integer(meta, value).map(ObjectId::from_raw)
}

fn range<T: TryFrom<i64> + TryFrom<u64>>(meta: &AttrMetadata, value: &Value) -> Result<(T, T)> {
    match value {
        Value::Object(map) => match (map.get("min"), map.get("max")) {
            (Some(min), Some(max)) => Ok((integer(meta, min)?, integer(meta, max)?)),
            _ => Err(invalid(meta, value)),
        },
        Value::Array(values) if values.len() == 2 => {
            Ok((integer(meta, &values[0])?, integer(meta, &values[1])?))
        }
        _ => Err(invalid(meta, value)),
    }
}

fn object_map(meta: &AttrMetadata, value: &Value) -> Result<ObjectMap> {
    let map: &JsonMap<String, Value> = value.as_object().ok_or_else(|| invalid(meta, value))?;
    match (map.get("key"), map.get("value")) {
        (Some(key), Some(ids)) => Ok(ObjectMap {
            key: object_id(meta, key)?,
            value: list(meta, ids, object_id)?,
        }),
        _ => Err(invalid(meta, value)),
    }
}

/// Converts a JSON value into an attribute value described by `meta`.
///
/// Enumeration values are accepted both as short names and as integers.
///
/// # Errors
///
/// Returns [`ErrorKind::InvalidValue`] when the JSON value does not fit the
/// attribute kind, and [`ErrorKind::NotSupported`] for kinds which cannot be
/// built from text.
pub fn from_json(meta: &AttrMetadata, value: &Value) -> Result<AttributeValue> {
    Ok(match meta.kind {
        ValueKind::Bool => AttributeValue::Bool(value.as_bool().ok_or_else(|| invalid(meta, value))?),
        ValueKind::U8 => AttributeValue::U8(integer(meta, value)?),
        ValueKind::S8 => AttributeValue::S8(integer(meta, value)?),
        ValueKind::U16 => AttributeValue::U16(integer(meta, value)?),
        ValueKind::S16 => AttributeValue::S16(integer(meta, value)?),
        ValueKind::U32 => AttributeValue::U32(integer(meta, value)?),
        ValueKind::S32 => AttributeValue::S32(enum_value(meta, value)?),
        ValueKind::U64 => AttributeValue::U64(integer(meta, value)?),
        ValueKind::S64 => AttributeValue::S64(integer(meta, value)?),
        ValueKind::Float => AttributeValue::Float(float(meta, value)?),
        ValueKind::Oid => AttributeValue::Oid(object_id(meta, value)?),
        ValueKind::CharList => AttributeValue::CharList(
            value
                .as_str()
                .map(String::from)
                .ok_or_else(|| invalid(meta, value))?,
        ),
        ValueKind::U8List => AttributeValue::U8List(list(meta, value, integer)?),
        ValueKind::S8List => AttributeValue::S8List(list(meta, value, integer)?),
        ValueKind::U16List => AttributeValue::U16List(list(meta, value, integer)?),
        ValueKind::S16List => AttributeValue::S16List(list(meta, value, integer)?),
        ValueKind::U32List => AttributeValue::U32List(list(meta, value, integer)?),
        ValueKind::S32List => AttributeValue::S32List(list(meta, value, enum_value)?),
        ValueKind::FloatList => AttributeValue::FloatList(list(meta, value, float)?),
        ValueKind::ObjList => AttributeValue::ObjList(list(meta, value, object_id)?),
        ValueKind::U32Range => {
            let (min, max) = range(meta, value)?;
            AttributeValue::U32Range { min, max }
        }
        ValueKind::S32Range => {
            let (min, max) = range(meta, value)?;
            AttributeValue::S32Range { min, max }
        }
        ValueKind::ObjMapList => AttributeValue::ObjMapList(list(meta, value, object_map)?),
        ValueKind::AttrList | ValueKind::Notification => {
            return Err(Error::new(
                ErrorKind::NotSupported,
                format!("{:?} values cannot be deserialized", meta.kind),
            ));
        }
    })
}

// Interprets a single plain-text token.
fn plain_token(token: &str) -> Value {
    let token = token.trim();
    serde_json::from_str(token).unwrap_or_else(|_| Value::String(token.into()))
}

/// Deserializes a value described by `meta`.
///
/// # Errors
///
/// Returns [`ErrorKind::Serialization`] for malformed JSON text, otherwise
/// the errors of [`from_json`].
pub fn deserialize_value(
    meta: &AttrMetadata,
    text: &str,
    options: SerializeOptions,
) -> Result<AttributeValue> {
    let value = if options.json {
        serde_json::from_str(text)?
    } else if meta.kind == ValueKind::CharList {
        Value::String(text.into())
    } else if meta.kind.is_list() || matches!(meta.kind, ValueKind::U32Range | ValueKind::S32Range)
    {
        if text.trim().is_empty() {
            Value::Array(Vec::new())
        } else {
            Value::Array(text.split(',').map(plain_token).collect())
        }
    } else {
        plain_token(text)
    };
    from_json(meta, &value)
}

/// Deserializes an attribute of `object_type` from `"name | value"` text.
///
/// The name may be either the full or the short attribute name.
///
/// # Errors
///
/// Returns [`ErrorKind::Serialization`] when the separator is missing,
/// [`ErrorKind::NotSupported`] for unknown names, otherwise the errors of
/// [`deserialize_value`].
pub fn deserialize_attribute(
    object_type: ObjectType,
    text: &str,
    options: SerializeOptions,
) -> Result<Attribute> {
    let (name, value) = text.split_once(NAME_SEPARATOR).ok_or_else(|| {
        Error::new(
            ErrorKind::Serialization,
            format!("Missing attribute name in `{text}`"),
        )
    })?;
    let name = name.trim();
    let meta = catalog::attr_metadata_by_name(object_type, name)
        .or_else(|| catalog::list_metadata(object_type).find(|meta| meta.name == name))
        .ok_or_else(|| {
            Error::new(
                ErrorKind::NotSupported,
                format!("Unknown {object_type} attribute `{name}`"),
            )
        })?;
    let value = deserialize_value(meta, value, options.value_only(true))?;
    Ok(Attribute::new(meta.id, value))
}
