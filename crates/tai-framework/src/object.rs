use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use tai::attribute::{AllocInfo, Attribute};
use tai::capability::AttributeCapability;
use tai::catalog;
use tai::metadata::AttrId;
use tai::object::{ObjectId, ObjectType};
use tai::value::NotificationHandler;

use crate::config::{ConfigStore, Fallbacks};
use crate::error::{Error, ErrorKind, Result};
use crate::fsm::{Fsm, FsmHandle, FsmState};
use crate::schema::SchemaTable;

/// Decides the transition requested after an attribute change.
///
/// Receives the state folded by the attribute store and the state machine of
/// the device. Returns the state to request, or `None` to stay.
pub type TransitCondition = Arc<dyn Fn(FsmState, &FsmHandle) -> Option<FsmState> + Send + Sync>;

// Default policy: never go past what the device configuration allows.
fn capped_transition(next: FsmState, fsm: &FsmHandle) -> Option<FsmState> {
    let cap = if fsm.configured() {
        FsmState::READY
    } else {
        FsmState::WAITING_CONFIGURATION
    };
    let target = next.min(cap);
    (target != fsm.state()).then_some(target)
}

/// A managed object: a module or one of its interfaces.
///
/// Operations on one object are serialized. A root object owns the state
/// machine of its device.
pub struct Object<C: 'static> {
    id: ObjectId,
    parent: Option<ObjectId>,
    config: ConfigStore<C>,
    // Last values sent in alarm mode.
    alarms: ConfigStore<C>,
    fsm: Option<Fsm>,
    transit_condition: Option<TransitCondition>,
    lock: Mutex<()>,
}

impl<C: Clone + 'static> Object<C> {
    /// Creates an [`Object`] and applies its creation attributes.
    ///
    /// # Errors
    ///
    /// Fails if a creation attribute is rejected by the schema or its hook.
    pub fn new(
        id: ObjectId,
        parent: Option<ObjectId>,
        schema: &'static SchemaTable<C>,
        context: C,
        fallbacks: Fallbacks<C>,
        attrs: &[Attribute],
    ) -> Result<Self> {
        let config = ConfigStore::new(schema, context.clone(), fallbacks);
        config.initialize(attrs)?;

        Ok(Self {
            id,
            parent,
            config,
            alarms: ConfigStore::new(schema, context, Fallbacks::new()),
            fsm: None,
            transit_condition: None,
            lock: Mutex::new(()),
        })
    }
}

impl<C: 'static> Object<C> {
    /// Sets the state machine of a root object.
    #[must_use]
    pub fn with_fsm(mut self, fsm: Fsm) -> Self {
        self.fsm = Some(fsm);
        self
    }

    /// Replaces the default transition policy.
    #[must_use]
    pub fn with_transit_condition(mut self, condition: Option<TransitCondition>) -> Self {
        self.transit_condition = condition;
        self
    }

    /// Returns the object identifier.
    #[must_use]
    pub const fn id(&self) -> ObjectId {
        self.id
    }

    /// Returns the object type.
    #[must_use]
    pub fn object_type(&self) -> ObjectType {
        self.config.schema().object_type()
    }

    /// Returns the parent identifier, `None` for a root.
    #[must_use]
    pub const fn parent(&self) -> Option<ObjectId> {
        self.parent
    }

    /// Returns the attribute store.
    #[must_use]
    pub const fn config(&self) -> &ConfigStore<C> {
        &self.config
    }

    /// Returns the state machine owned by a root.
    #[must_use]
    pub const fn fsm(&self) -> Option<&Fsm> {
        self.fsm.as_ref()
    }

    fn guard(&self) -> Result<MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| Error::new(ErrorKind::Failure, format!("Object {} lock poisoned", self.id)))
    }

    /// Reads attributes.
    ///
    /// # Errors
    ///
    /// See [`ConfigStore::get_attributes`].
    pub fn get_attributes(&self, attrs: &mut [Attribute]) -> Result<()> {
        let _guard = self.guard()?;
        self.config.get_attributes(attrs)
    }

    /// Writes attributes, then requests the resulting transition.
    ///
    /// A batch which changes nothing requests nothing.
    ///
    /// # Errors
    ///
    /// See [`ConfigStore::set_attributes`].
    pub fn set_attributes(&self, attrs: &[Attribute], fsm: &FsmHandle) -> Result<()> {
        let _guard = self.guard()?;
        if let Some(next) = self.config.set_attributes(attrs, fsm.state())? {
            self.transit(next, fsm);
        }
        Ok(())
    }

    /// Clears attributes, then requests the resulting transition.
    ///
    /// # Errors
    ///
    /// See [`ConfigStore::clear_attributes`].
    pub fn clear_attributes(&self, ids: &[AttrId], fsm: &FsmHandle) -> Result<()> {
        let _guard = self.guard()?;
        if let Some(next) = self.config.clear_attributes(ids, fsm.state(), false)? {
            self.transit(next, fsm);
        }
        Ok(())
    }

    /// Requests a transition according to the transition policy.
    ///
    /// Never blocks on the state machine.
    pub fn transit(&self, next: FsmState, fsm: &FsmHandle) {
        let target = match &self.transit_condition {
            Some(condition) => condition(next, fsm),
            None => capped_transition(next, fsm),
        };
        if let Some(target) = target {
            debug!("Object {} requests {target}", self.id);
            fsm.transit(target);
        }
    }

    /// Registers a notification handler.
    ///
    /// # Errors
    ///
    /// Fails if the notification attribute is not part of the schema.
    pub fn subscribe(&self, notification: AttrId, handler: NotificationHandler) -> Result<()> {
        let _guard = self.guard()?;
        self.config
            .set_readonly(&Attribute::new(notification, handler), false)
    }

    /// Whether a handler is registered on the notification attribute.
    #[must_use]
    pub fn is_subscribed(&self, notification: AttrId) -> bool {
        self.handler(notification).is_some()
    }

    fn handler(&self, notification: AttrId) -> Option<NotificationHandler> {
        self.config
            .get(notification)
            .and_then(|value| value.as_notification().cloned())
            .filter(NotificationHandler::is_set)
    }

    /// Reads the given attributes and sends them to the handler registered
    /// on the notification attribute.
    ///
    /// In alarm mode, only values which changed since the previous alarm
    /// notification are sent. Nothing is sent for an empty batch.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::Failure`] when no handler is registered.
    pub fn notify(&self, notification: AttrId, ids: &[AttrId], alarm: bool) -> Result<()> {
        let Some(handler) = self.handler(notification) else {
            return Err(Error::new(
                ErrorKind::Failure,
                format!("No handler on notification {notification} of {}", self.id),
            ));
        };

        let batch = {
            let _guard = self.guard()?;
            let mut batch = Vec::with_capacity(ids.len());
            for &id in ids {
                let attr = match self.read(id) {
                    Ok(attr) => attr,
                    Err(e) => {
                        warn!("Skipping attribute {id} of {}: {e}", self.id);
                        continue;
                    }
                };
                if alarm {
                    if self.alarms.stored(id).as_ref() == Some(&attr.value) {
                        continue;
                    }
                    if let Err(e) = self.alarms.set_readonly(&attr, true) {
                        debug!("Attribute {id} of {} not cached: {e}", self.id);
                    }
                }
                batch.push(attr);
            }
            batch
        };

        if batch.is_empty() {
            debug!("Nothing to notify for {}", self.id);
            return Ok(());
        }
        handler.notify(self.id, &batch);
        Ok(())
    }

    /// Same as [`Object::notify`] in alarm mode.
    ///
    /// # Errors
    ///
    /// See [`Object::notify`].
    pub fn notify_alarm(&self, notification: AttrId, ids: &[AttrId]) -> Result<()> {
        self.notify(notification, ids, true)
    }

    /// Forgets the values sent in alarm mode.
    pub fn clear_alarm_cache(&self) {
        self.alarms.clear_all();
    }

    // Reads one attribute through the regular path, growing list capacity
    // once if needed.
    fn read(&self, id: AttrId) -> Result<Attribute> {
        let meta = catalog::attr_metadata(self.object_type(), id).ok_or_else(|| {
            Error::new(
                ErrorKind::NotSupported,
                format!("{} attribute {id} is unknown", self.object_type()),
            )
        })?;
        let mut attrs = [Attribute::alloc(meta, AllocInfo::Default)?];
        match self.config.get_attributes(&mut attrs) {
            Err(e) if e.kind() == ErrorKind::BufferOverflow => {
                let size = attrs[0].capacity().unwrap_or_default();
                attrs = [Attribute::alloc(meta, AllocInfo::Size(size))?];
                self.config.get_attributes(&mut attrs)?;
            }
            result => result?,
        }
        let [attr] = attrs;
        Ok(attr)
    }

    /// Returns the capabilities of the given attributes.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::NotSupported`] for an attribute unknown to the
    /// metadata catalog, or when a capability hook fails.
    pub fn get_capabilities(&self, ids: &[AttrId]) -> Result<Vec<AttributeCapability>> {
        let _guard = self.guard()?;
        ids.iter()
            .enumerate()
            .map(|(i, &id)| {
                let capability = match self.config.schema().get(id) {
                    Some(info) => info.capability_of(self.config.context()),
                    None => catalog::attr_metadata(self.object_type(), id)
                        .map(AttributeCapability::from_metadata)
                        .ok_or_else(|| {
                            Error::new(
                                ErrorKind::NotSupported,
                                format!("{} attribute {id} is unknown", self.object_type()),
                            )
                        }),
                };
                capability.map_err(|e| e.at(i))
            })
            .collect()
    }

    /// Stops the state machine of a root, waiting for its thread.
    pub fn shutdown(&self) {
        if let Some(fsm) = &self.fsm {
            fsm.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, LazyLock, Mutex};

    use serial_test::serial;

    use tai::attribute::Attribute;
    use tai::catalog::{host_interface, module};
    use tai::object::ObjectId;
    use tai::value::{AttributeValue, NotificationHandler};

    use crate::config::Fallbacks;
    use crate::error::ErrorKind;
    use crate::fsm::{FsmBuilder, FsmState};
    use crate::schema::{SchemaTable, Validator};
    use crate::testing::wait_until;

    use super::Object;

    type Context = Arc<AtomicBool>;

    static MODULE: LazyLock<SchemaTable<Context>> = LazyLock::new(|| {
        SchemaTable::builder(tai::object::ObjectType::Module)
            .attribute(module::LOCATION, |info| info)
            .attribute(module::OPER_STATUS, |info| info)
            .attribute(module::ADMIN_STATUS, |info| {
                info.validator(Validator::Enum(vec![
                    module::ADMIN_STATUS_DOWN,
                    module::ADMIN_STATUS_UP,
                ]))
                .fsm_state(FsmState::WAITING_CONFIGURATION)
            })
            .attribute(module::NUM_HOST_INTERFACES, |info| {
                info.getter(|attr, _| Ok(attr.copy_value(&AttributeValue::U32(2))?))
            })
            .attribute(module::NOTIFY, |info| info)
    });

    static HOST_INTERFACE: LazyLock<SchemaTable<Context>> = LazyLock::new(|| {
        SchemaTable::builder(tai::object::ObjectType::HostInterface)
            .attribute(host_interface::FEC_TYPE, |info| {
                info.validator(Validator::Enum(vec![
                    host_interface::FEC_TYPE_NONE,
                    host_interface::FEC_TYPE_RS,
                ]))
            })
    });

    fn module_object() -> Object<Context> {
        Object::new(
            ObjectId::module(0),
            None,
            &MODULE,
            Context::default(),
            Fallbacks::new(),
            &[Attribute::new(module::LOCATION, "0")],
        )
        .unwrap()
    }

    fn collect(object: &Object<Context>) -> Arc<Mutex<Vec<Vec<Attribute>>>> {
        let batches = Arc::new(Mutex::new(Vec::new()));
        let sink = batches.clone();
        object
            .subscribe(
                module::NOTIFY,
                NotificationHandler::new(move |_, attrs| sink.lock().unwrap().push(attrs.to_vec())),
            )
            .unwrap();
        batches
    }

    #[test]
    fn notify_requires_handler() {
        let object = module_object();
        assert!(!object.is_subscribed(module::NOTIFY));

        let error = object
            .notify(module::NOTIFY, &[module::OPER_STATUS], false)
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Failure);
    }

    #[test]
    fn notify_reads_through_hooks() {
        let object = module_object();
        let batches = collect(&object);

        object
            .notify(
                module::NOTIFY,
                &[module::NUM_HOST_INTERFACES, module::OPER_STATUS, module::TEMP],
                false,
            )
            .unwrap();

        // The uninitialized and unsupported attributes are skipped.
        let batches = batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(
            batches[0],
            vec![Attribute::new(module::NUM_HOST_INTERFACES, 2u32)]
        );
    }

    #[test]
    fn alarms_are_coalesced() {
        let object = module_object();
        let batches = collect(&object);
        let oper = |value: i32| Attribute::new(module::OPER_STATUS, value);

        object
            .config()
            .set_readonly(&oper(module::OPER_STATUS_INITIALIZE), false)
            .unwrap();
        object
            .notify_alarm(module::NOTIFY, &[module::OPER_STATUS])
            .unwrap();
        object
            .notify_alarm(module::NOTIFY, &[module::OPER_STATUS])
            .unwrap();
        assert_eq!(batches.lock().unwrap().len(), 1);

        object
            .config()
            .set_readonly(&oper(module::OPER_STATUS_READY), false)
            .unwrap();
        object
            .notify_alarm(module::NOTIFY, &[module::OPER_STATUS])
            .unwrap();
        assert_eq!(batches.lock().unwrap().len(), 2);

        object.clear_alarm_cache();
        object
            .notify_alarm(module::NOTIFY, &[module::OPER_STATUS])
            .unwrap();

        let batches = batches.lock().unwrap();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[2], vec![oper(module::OPER_STATUS_READY)]);
    }

    #[test]
    fn capabilities() {
        let object = Object::new(
            ObjectId::child(tai::object::ObjectType::HostInterface, ObjectId::module(0), 0),
            Some(ObjectId::module(0)),
            &HOST_INTERFACE,
            Context::default(),
            Fallbacks::new(),
            &[],
        )
        .unwrap();

        let capabilities = object
            .get_capabilities(&[host_interface::FEC_TYPE, host_interface::LANE_FAULT])
            .unwrap();
        assert_eq!(
            capabilities[0].supported,
            vec![AttributeValue::S32(0), AttributeValue::S32(1)]
        );
        assert_eq!(capabilities[1].id, host_interface::LANE_FAULT);

        let error = object.get_capabilities(&[99]).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::NotSupported);
        assert_eq!(error.index(), Some(0));
    }

    #[test]
    #[serial]
    fn transitions_are_capped() {
        let configured = Context::default();
        let flag = configured.clone();

        let fsm = FsmBuilder::new("object")
            .configured(move || flag.load(Ordering::SeqCst))
            .state(FsmState::INIT, |_| async { FsmState::WAITING_CONFIGURATION })
            .state(FsmState::WAITING_CONFIGURATION, |context| async move {
                context.wait_transition().await
            })
            .state(FsmState::READY, |context| async move {
                context.wait_transition().await
            })
            .build();

        let object = Object::new(
            ObjectId::module(1),
            None,
            &MODULE,
            configured.clone(),
            Fallbacks::new(),
            &[Attribute::new(module::LOCATION, "1")],
        )
        .unwrap()
        .with_fsm(fsm);

        let fsm = object.fsm().unwrap();
        let handle = fsm.handle();
        fsm.start().unwrap();
        assert!(wait_until(|| handle.state() == FsmState::WAITING_CONFIGURATION));

        // Not configured: READY is capped.
        object.transit(FsmState::END, &handle);
        configured.store(true, Ordering::SeqCst);
        object
            .set_attributes(
                &[Attribute::new(module::ADMIN_STATUS, module::ADMIN_STATUS_UP)],
                &handle,
            )
            .unwrap();
        assert_eq!(handle.state(), FsmState::WAITING_CONFIGURATION);

        object.transit(FsmState::END, &handle);
        assert!(wait_until(|| handle.state() == FsmState::READY));

        object
            .clear_attributes(&[module::ADMIN_STATUS], &handle)
            .unwrap();
        assert!(wait_until(|| handle.state() == FsmState::WAITING_CONFIGURATION));

        object.shutdown();
        assert_eq!(handle.state(), FsmState::END);
    }

    #[test]
    #[serial]
    fn unchanged_writes_request_nothing() {
        let configured = Context::default();
        let flag = configured.clone();

        let fsm = FsmBuilder::new("unchanged")
            .configured(move || flag.load(Ordering::SeqCst))
            .state(FsmState::INIT, |_| async { FsmState::WAITING_CONFIGURATION })
            .state(FsmState::WAITING_CONFIGURATION, |context| async move {
                context.wait_transition().await
            })
            .state(FsmState::READY, |context| async move {
                context.wait_transition().await
            })
            .build();

        let object = Object::new(
            ObjectId::module(2),
            None,
            &MODULE,
            configured.clone(),
            Fallbacks::new(),
            &[Attribute::new(module::LOCATION, "2")],
        )
        .unwrap()
        .with_fsm(fsm);

        let fsm = object.fsm().unwrap();
        let handle = fsm.handle();
        fsm.start().unwrap();
        assert!(wait_until(|| handle.state() == FsmState::WAITING_CONFIGURATION));

        let up = [Attribute::new(module::ADMIN_STATUS, module::ADMIN_STATUS_UP)];
        configured.store(true, Ordering::SeqCst);
        object.set_attributes(&up, &handle).unwrap();
        object.transit(FsmState::END, &handle);
        assert!(wait_until(|| handle.state() == FsmState::READY));

        // A changed write would fall back to waiting-configuration.
        configured.store(false, Ordering::SeqCst);
        object.set_attributes(&up, &handle).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert_eq!(handle.state(), FsmState::READY);

        object.shutdown();
    }
}
