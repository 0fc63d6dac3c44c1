use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::{Map as JsonMap, Value};

use tracing::{debug, warn};

use tai::attribute::Attribute;
use tai::catalog;
use tai::metadata::{AttrId, AttrMetadata};
use tai::serialize::{SerializeOptions, serialize_attribute, to_json};
use tai::value::AttributeValue;

use crate::Map;
use crate::error::{Error, ErrorKind, Result};
use crate::fsm::FsmState;
use crate::schema::{AttributeInfo, SchemaTable};

/// A fallback receiving the attributes a store could not apply, together
/// with the error each one raised.
pub type DefaultSetter<C> =
    Arc<dyn Fn(&[Attribute], &[Error], &mut FsmState, &C) -> Result<()> + Send + Sync>;

/// A fallback receiving the attributes a store could not read, together
/// with the error each one raised.
pub type DefaultGetter<C> =
    Arc<dyn Fn(&mut [Attribute], &[Error], &C) -> Result<()> + Send + Sync>;

/// Fallback hooks for attributes a schema does not handle.
///
/// An error returned by a fallback refers to a position in the batch it
/// received; the store maps it back to the caller's list.
pub struct Fallbacks<C> {
    setter: Option<DefaultSetter<C>>,
    getter: Option<DefaultGetter<C>>,
}

impl<C> Fallbacks<C> {
    /// Creates [`Fallbacks`] without any hook.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            setter: None,
            getter: None,
        }
    }

    /// Sets the fallback setter.
    #[must_use]
    pub fn setter(
        mut self,
        setter: impl Fn(&[Attribute], &[Error], &mut FsmState, &C) -> Result<()>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.setter = Some(Arc::new(setter));
        self
    }

    /// Sets the fallback getter.
    #[must_use]
    pub fn getter(
        mut self,
        getter: impl Fn(&mut [Attribute], &[Error], &C) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.getter = Some(Arc::new(getter));
        self
    }
}

impl<C> Default for Fallbacks<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Clone for Fallbacks<C> {
    fn clone(&self) -> Self {
        Self {
            setter: self.setter.clone(),
            getter: self.getter.clone(),
        }
    }
}

// Lowers the folded next state with the outcome of one attribute.
fn fold(next: FsmState, current: FsmState, requested: FsmState, hint: FsmState) -> FsmState {
    let mut next = next;
    if requested != current && requested < next {
        next = requested;
    }
    if hint != FsmState::INIT && hint < next {
        next = hint;
    }
    next
}

// Maps an error raised by a fallback back to the caller's list.
fn remap(error: Error, indices: &[usize]) -> Error {
    let index = error
        .index()
        .and_then(|position| indices.get(position).copied())
        .or_else(|| indices.first().copied());
    match index {
        Some(index) => error.at(index),
        None => error,
    }
}

fn check_writable(meta: &AttrMetadata, attr: &Attribute, privileged: bool) -> Result<()> {
    if !privileged && (meta.is_read_only() || meta.is_create_only()) {
        return Err(Error::new(
            ErrorKind::InvalidValue,
            format!("Attribute {} is read-only", meta.short_name),
        ));
    }
    if attr.value.kind() != meta.kind {
        return Err(Error::new(
            ErrorKind::InvalidValue,
            format!(
                "Attribute {} expects {:?}, got {:?}",
                meta.short_name,
                meta.kind,
                attr.value.kind()
            ),
        ));
    }
    Ok(())
}

// Runs a setter hook. A declined hook is a success.
fn run_setter<C>(
    info: &AttributeInfo<C>,
    attr: &Attribute,
    state: &mut FsmState,
    context: &C,
) -> Result<()> {
    match info.setter_hook() {
        Some(setter) => match setter(attr, state, context) {
            Err(e) if e.kind() == ErrorKind::NotExecuted => Ok(()),
            result => result,
        },
        None => Ok(()),
    }
}

/// The attribute store of one object.
///
/// Values are validated against a static [`SchemaTable`] and applied to the
/// device through the schema hooks. The store lock is never held while a
/// hook runs, so hooks may read the store back.
pub struct ConfigStore<C: 'static> {
    schema: &'static SchemaTable<C>,
    context: C,
    fallbacks: Fallbacks<C>,
    values: Mutex<Map<AttrId, AttributeValue>>,
}

impl<C: 'static> ConfigStore<C> {
    /// Creates an empty [`ConfigStore`].
    pub fn new(schema: &'static SchemaTable<C>, context: C, fallbacks: Fallbacks<C>) -> Self {
        Self {
            schema,
            context,
            fallbacks,
            values: Mutex::new(Map::default()),
        }
    }

    /// Applies the creation attributes of an object.
    ///
    /// Read-only and create-only attributes are accepted. Hooks run as for
    /// any other write.
    ///
    /// # Errors
    ///
    /// Reports the first invalid or failing attribute with its position.
    pub fn initialize(&self, attrs: &[Attribute]) -> Result<()> {
        self.apply(attrs, FsmState::INIT, true).map(|_| ())
    }

    /// Returns the object schema.
    #[must_use]
    pub const fn schema(&self) -> &'static SchemaTable<C> {
        self.schema
    }

    /// Returns the hook context.
    #[must_use]
    pub const fn context(&self) -> &C {
        &self.context
    }

    fn values(&self) -> Result<MutexGuard<'_, Map<AttrId, AttributeValue>>> {
        self.values
            .lock()
            .map_err(|_| Error::new(ErrorKind::Failure, "Attribute store lock poisoned"))
    }

    fn info(&self, id: AttrId) -> Result<&'static AttributeInfo<C>> {
        self.schema.get(id).ok_or_else(|| {
            Error::new(
                ErrorKind::NotSupported,
                format!("{} attribute {id} is not supported", self.schema.object_type()),
            )
        })
    }

    /// Writes a batch of attributes.
    ///
    /// Values equal to the effective ones are skipped, and the setter hook
    /// of every changed attribute runs without the store lock. Values are
    /// committed only once every hook succeeded.
    ///
    /// Returns the lowest state requested by the hooks and the schema
    /// hints, or [`FsmState::END`] when nobody asked for a state. An
    /// already applied batch changes nothing and returns `None`.
    ///
    /// # Errors
    ///
    /// Fails at the first unrecoverable attribute, reporting its position.
    /// Attributes the schema does not handle, or whose hook reports
    /// [`ErrorKind::NotSupported`], go through the fallback setter when one
    /// is configured.
    pub fn set_attributes(
        &self,
        attrs: &[Attribute],
        current: FsmState,
    ) -> Result<Option<FsmState>> {
        self.apply(attrs, current, false)
    }

    fn apply(
        &self,
        attrs: &[Attribute],
        current: FsmState,
        privileged: bool,
    ) -> Result<Option<FsmState>> {
        let fallback = self.fallbacks.setter.as_ref();
        let mut diff = Vec::new();
        let mut unresolved = Vec::new();

        {
            let values = self.values()?;
            for (i, attr) in attrs.iter().enumerate() {
                let Some(info) = self.schema.get(attr.id) else {
                    if let Some(meta) = catalog::attr_metadata(self.schema.object_type(), attr.id)
                    {
                        check_writable(meta, attr, privileged).map_err(|e| e.at(i))?;
                    }
                    if fallback.is_none() {
                        return Err(Error::new(
                            ErrorKind::NotSupported,
                            format!(
                                "{} attribute {} is not supported",
                                self.schema.object_type(),
                                attr.id
                            ),
                        )
                        .at(i));
                    }
                    unresolved.push((
                        i,
                        Error::unlogged(
                            ErrorKind::NotSupported,
                            format!("Attribute {} is not in the schema", attr.id),
                        ),
                    ));
                    continue;
                };

                check_writable(info.meta(), attr, privileged).map_err(|e| e.at(i))?;
                if !info.validate(&attr.value) {
                    return Err(Error::new(
                        ErrorKind::InvalidValue,
                        format!("Invalid value for {}", info.meta().short_name),
                    )
                    .at(i));
                }

                let effective = values.get(&attr.id).or_else(|| info.default());
                if info.is_stored() && effective == Some(&attr.value) {
                    continue;
                }
                diff.push((i, attr, info));
            }
        }

        if diff.is_empty() && unresolved.is_empty() {
            debug!("{} attributes already configured", self.schema.object_type());
            return Ok(None);
        }

        let mut next = FsmState::END;
        let mut commit = Vec::with_capacity(diff.len());

        for (i, attr, info) in diff {
            let mut requested = current;
            match run_setter(info, attr, &mut requested, &self.context) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotSupported && fallback.is_some() => {
                    unresolved.push((i, e));
                    continue;
                }
                Err(e) => return Err(e.at(i)),
            }
            next = fold(next, current, requested, info.state_hint());
            if info.is_stored() {
                commit.push((attr.id, attr.value.try_clone()?));
            }
        }

        if let (Some(setter), false) = (fallback, unresolved.is_empty()) {
            unresolved.sort_by_key(|(i, _)| *i);
            let indices: Vec<usize> = unresolved.iter().map(|(i, _)| *i).collect();
            let batch: Vec<Attribute> = indices.iter().map(|&i| attrs[i].clone()).collect();
            let errors: Vec<Error> = unresolved.into_iter().map(|(_, e)| e).collect();

            let mut requested = current;
            match setter(&batch, &errors, &mut requested, &self.context) {
                Err(e) if e.kind() != ErrorKind::NotExecuted => return Err(remap(e, &indices)),
                _ => {}
            }
            next = fold(next, current, requested, FsmState::INIT);
        }

        let mut values = self.values()?;
        for (id, value) in commit {
            values.insert(id, value);
        }
        Ok(Some(next))
    }

    /// Writes one attribute, skipping the writability check of read-only
    /// and create-only attributes.
    ///
    /// # Errors
    ///
    /// Fails if the attribute is unknown or invalid, or if its hook fails.
    pub fn set_readonly(&self, attr: &Attribute, without_hook: bool) -> Result<()> {
        self.store(attr, true, without_hook)
    }

    /// Writes one attribute.
    ///
    /// # Errors
    ///
    /// Fails if the attribute is unknown, read-only or invalid, or if its
    /// hook fails.
    pub fn set(&self, attr: &Attribute, without_hook: bool) -> Result<()> {
        self.store(attr, false, without_hook)
    }

    fn store(&self, attr: &Attribute, privileged: bool, without_hook: bool) -> Result<()> {
        let info = self.info(attr.id)?;
        check_writable(info.meta(), attr, privileged)?;
        if !info.validate(&attr.value) {
            return Err(Error::new(
                ErrorKind::InvalidValue,
                format!("Invalid value for {}", info.meta().short_name),
            ));
        }
        if !without_hook {
            let mut requested = FsmState::INIT;
            run_setter(info, attr, &mut requested, &self.context)?;
        }
        if info.is_stored() {
            let value = attr.value.try_clone()?;
            self.values()?.insert(attr.id, value);
        }
        Ok(())
    }

    /// Reads one attribute.
    ///
    /// The getter hook answers unless bypassed. Otherwise the stored value
    /// is copied, or the default one when nothing is stored.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::NotSupported`] for an unknown attribute,
    /// [`ErrorKind::Uninitialized`] when there is neither value nor default,
    /// and [`ErrorKind::BufferOverflow`] when the attribute is too small.
    pub fn get_attribute(&self, attr: &mut Attribute, without_hook: bool) -> Result<()> {
        let info = self.info(attr.id)?;
        if !without_hook && let Some(getter) = info.getter_hook() {
            return getter(attr, &self.context);
        }

        let values = self.values()?;
        match values.get(&attr.id).or_else(|| info.default()) {
            Some(value) => Ok(attr.copy_value(value)?),
            None => Err(Error::new(
                ErrorKind::Uninitialized,
                format!("Attribute {} has no value", info.meta().short_name),
            )),
        }
    }

    /// Reads a batch of attributes.
    ///
    /// Every failure is collected. When a fallback getter is configured, it
    /// receives all failed attributes at once and may still answer them.
    ///
    /// # Errors
    ///
    /// Reports the first unresolved attribute with its position.
    pub fn get_attributes(&self, attrs: &mut [Attribute]) -> Result<()> {
        let Some(getter) = self.fallbacks.getter.as_ref() else {
            for (i, attr) in attrs.iter_mut().enumerate() {
                self.get_attribute(attr, false).map_err(|e| e.at(i))?;
            }
            return Ok(());
        };

        let mut indices = Vec::new();
        let mut errors = Vec::new();
        for (i, attr) in attrs.iter_mut().enumerate() {
            let result = if self.schema.contains(attr.id) {
                self.get_attribute(attr, false)
            } else {
                Err(Error::unlogged(
                    ErrorKind::NotSupported,
                    format!("Attribute {} is not in the schema", attr.id),
                ))
            };
            if let Err(e) = result {
                indices.push(i);
                errors.push(e);
            }
        }

        if indices.is_empty() {
            return Ok(());
        }

        let mut batch: Vec<Attribute> = indices.iter().map(|&i| attrs[i].clone()).collect();
        let result = getter(&mut batch, &errors, &self.context).map_err(|e| remap(e, &indices));
        // Copied back even on failure, to report the required capacities.
        for (i, attr) in indices.into_iter().zip(batch) {
            attrs[i] = attr;
        }
        result
    }

    /// Returns the effective value of an attribute: the stored one, or the
    /// default one.
    #[must_use]
    pub fn get(&self, id: AttrId) -> Option<AttributeValue> {
        let info = self.schema.get(id)?;
        let values = self.values().ok()?;
        values.get(&id).or_else(|| info.default()).cloned()
    }

    /// Returns the stored value of an attribute, ignoring defaults.
    #[must_use]
    pub fn stored(&self, id: AttrId) -> Option<AttributeValue> {
        self.values().ok()?.get(&id).cloned()
    }

    /// Clears a batch of attributes back to their defaults.
    ///
    /// When a cleared value differs from its default, the setter hook is
    /// replayed with the default value. Attributes with no stored value are
    /// skipped. Stored values are removed only once every replay succeeded.
    ///
    /// Returns the folded next state like
    /// [`ConfigStore::set_attributes`], or `None` when nothing was stored.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::NotSupported`] for an unknown attribute, and
    /// with [`ErrorKind::InvalidValue`] for a non-clearable one unless
    /// `force` is set. A failing replay is reported with its position and
    /// leaves the store untouched.
    pub fn clear_attributes(
        &self,
        ids: &[AttrId],
        current: FsmState,
        force: bool,
    ) -> Result<Option<FsmState>> {
        for (i, &id) in ids.iter().enumerate() {
            let info = self.info(id).map_err(|e| e.at(i))?;
            if !force && !info.meta().is_clearable() {
                return Err(Error::new(
                    ErrorKind::InvalidValue,
                    format!("Attribute {} is not clearable", info.meta().short_name),
                )
                .at(i));
            }
        }

        let mut cleared: Vec<(usize, AttrId, AttributeValue)> = Vec::new();
        {
            let values = self.values()?;
            for (i, &id) in ids.iter().enumerate() {
                if cleared.iter().any(|(_, seen, _)| *seen == id) {
                    continue;
                }
                if let Some(value) = values.get(&id) {
                    cleared.push((i, id, value.try_clone()?));
                }
            }
        }

        if cleared.is_empty() {
            debug!("{} attributes already cleared", self.schema.object_type());
            return Ok(None);
        }

        let mut next = FsmState::END;
        for (i, id, old) in &cleared {
            let (i, id) = (*i, *id);
            let info = self.info(id).map_err(|e| e.at(i))?;
            let mut requested = current;

            if let Some(default) = info.default()
                && default != old
            {
                let attr = Attribute::new(id, default.try_clone()?);
                match run_setter(info, &attr, &mut requested, &self.context) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotSupported => {
                        let Some(setter) = self.fallbacks.setter.as_ref() else {
                            return Err(e.at(i));
                        };
                        match setter(&[attr], &[e], &mut requested, &self.context) {
                            Err(e) if e.kind() != ErrorKind::NotExecuted => {
                                return Err(e.at(i));
                            }
                            _ => {}
                        }
                    }
                    Err(e) => return Err(e.at(i)),
                }
            }
            next = fold(next, current, requested, info.state_hint());
        }

        let mut values = self.values()?;
        for (_, id, _) in &cleared {
            values.shift_remove(id);
        }
        Ok(Some(next))
    }

    /// Removes the stored value of an attribute, without running hooks.
    ///
    /// Returns whether a value was stored.
    pub fn clear(&self, id: AttrId) -> bool {
        match self.values() {
            Ok(mut values) => values.shift_remove(&id).is_some(),
            Err(_) => false,
        }
    }

    /// Removes every stored value, without running hooks.
    pub fn clear_all(&self) {
        match self.values() {
            Ok(mut values) => values.clear(),
            Err(e) => warn!("Cannot clear attributes: {e}"),
        }
    }

    /// Number of stored values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values().map(|values| values.len()).unwrap_or(0)
    }

    /// Whether no value is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the stored attributes, in insertion order.
    ///
    /// # Errors
    ///
    /// Fails if a payload cannot be copied.
    pub fn list(&self) -> Result<Vec<Attribute>> {
        self.values()?
            .iter()
            .map(|(id, value)| Ok(Attribute::new(*id, value.try_clone()?)))
            .collect()
    }

    /// Returns the stored values as a JSON object keyed by short attribute
    /// name.
    ///
    /// # Errors
    ///
    /// Fails if the store lock is poisoned.
    pub fn to_json(&self, human: bool) -> Result<Value> {
        let values = self.values()?;
        let map: JsonMap<String, Value> = values
            .iter()
            .filter_map(|(id, value)| {
                let meta = self.schema.get(*id)?.meta();
                Some((
                    meta.short_name.to_owned(),
                    to_json(value, meta.enum_metadata, human),
                ))
            })
            .collect();
        Ok(Value::Object(map))
    }
}

impl<C: 'static> core::fmt::Display for ConfigStore<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let attrs = self.list().map_err(|_| core::fmt::Error)?;
        let options = SerializeOptions::new().human(true);
        for attr in &attrs {
            let Some(info) = self.schema.get(attr.id) else {
                continue;
            };
            match serialize_attribute(info.meta(), attr, options) {
                Ok(line) => writeln!(f, "{line}")?,
                Err(_) => writeln!(f, "{} | <unprintable>", info.meta().short_name)?,
            }
        }
        Ok(())
    }
}
