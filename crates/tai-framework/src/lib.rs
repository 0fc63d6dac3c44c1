//! `tai-framework` is a library for writing transponder adapters.
//!
//! An adapter exposes each transponder as a tree of objects: a root module
//! owning its network and host interfaces. The framework takes care of the
//! parts every adapter shares, so an adapter only declares what is specific
//! to its hardware.
//!
//! The main building blocks are:
//!
//! - [`schema::SchemaTable`]: the attributes an adapter handles for an object
//!   type, with their validators, defaults, hooks and state hints
//! - [`config::ConfigStore`]: the validated attribute store of one object,
//!   which skips unchanged values and applies batches atomically
//! - [`object::Object`]: an object, its store, its alarm cache and its
//!   notification logic
//! - [`fsm::Fsm`]: the state machine of a device, running on its own thread
//! - [`platform::Platform`]: the registry of live objects, driven by an
//!   [`platform::Adapter`]
//!
//! The [`adapters::basic`] module provides a reference adapter driving
//! simulated transponders.
//!
//! Attribute changes may move a device back to an earlier state: the store
//! folds the state hints of the changed attributes, and the object caps the
//! result to what the device configuration allows before requesting the
//! transition. Requests never block on the state machine.

#![deny(unsafe_code)]
#![deny(missing_docs)]

/// Reference adapters.
pub mod adapters;
/// Validated attribute store.
pub mod config;
/// Error management.
pub mod error;
/// Per-device state machine runtime.
pub mod fsm;
/// Managed objects.
pub mod object;
/// Object registry and adapter interface.
pub mod platform;
/// Attribute schemas.
pub mod schema;

#[cfg(test)]
mod testing;

pub(crate) type Map<K, V> = indexmap::IndexMap<K, V, hashbrown::DefaultHashBuilder>;
