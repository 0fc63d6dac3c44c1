//! `tai` defines the data model shared by transponder adapters and the
//! software which drives them.
//!
//! A transponder is described as a tree of objects: a root
//! [`ObjectType::Module`](object::ObjectType::Module) owning its host-side
//! and line-side interfaces. Every object exposes a set of typed attributes
//! whose shape is fixed by a process-wide metadata catalog.
//!
//! This crate provides:
//!
//! - object types and their deterministic identifiers
//! - a closed set of attribute value kinds, with deep copy and deep
//!   comparison
//! - the attribute metadata catalog for modules, network interfaces and host
//!   interfaces
//! - attribute capabilities and text serialization

#![deny(unsafe_code)]
#![deny(missing_docs)]

/// Attribute definition, allocation and deep copy.
pub mod attribute;
/// Legal value space of an attribute.
pub mod capability;
/// Attribute metadata catalog for all supported object types.
pub mod catalog;
/// Error management.
pub mod error;
/// Attribute metadata definitions.
pub mod metadata;
/// Object types and identifiers.
pub mod object;
/// Conversion of attribute values to and from text.
pub mod serialize;
/// All supported attribute values.
pub mod value;

pub(crate) type Map<K, V> = indexmap::IndexMap<K, V, hashbrown::DefaultHashBuilder>;
