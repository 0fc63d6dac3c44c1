use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use tai::attribute::Attribute;
use tai::capability::AttributeCapability;
use tai::catalog::{self, module};
use tai::metadata::{AttrId, AttrMetadata, ObjectInfo};
use tai::object::{ObjectId, ObjectType};
use tai::value::NotificationHandler;

use crate::Map;
use crate::config::Fallbacks;
use crate::error::{Error, ErrorKind, Result};
use crate::fsm::{Fsm, FsmHandle};
use crate::object::{Object, TransitCondition};
use crate::schema::SchemaTable;

/// The device-specific half of a [`Platform`].
///
/// An adapter declares the schema of each object type it supports, derives
/// object identifiers, and builds one state machine per device.
pub trait Adapter: Send + Sync + 'static {
    /// Context shared by the hooks of all objects of a device.
    type Context: Clone + Send + Sync + 'static;

    /// Returns the schema of an object type, `None` if unsupported.
    fn schema(&self, object_type: ObjectType) -> Option<&'static SchemaTable<Self::Context>>;

    /// Derives the identifier of a new object.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::InvalidParameter`] when a creation attribute
    /// is out of range.
    fn object_id(
        &self,
        object_type: ObjectType,
        parent: Option<ObjectId>,
        attrs: &[Attribute],
    ) -> Result<ObjectId>;

    /// Creates the context and the state machine of the device at
    /// `location`.
    ///
    /// # Errors
    ///
    /// Fails if the device cannot be opened.
    fn build_device(&self, location: &str) -> Result<(Self::Context, Fsm)>;

    /// Attribute carrying the location of a root.
    fn location_attribute(&self) -> AttrId {
        module::LOCATION
    }

    /// Returns the fallback hooks of a new object.
    fn fallbacks(&self, _object_type: ObjectType, _id: ObjectId) -> Fallbacks<Self::Context> {
        Fallbacks::new()
    }

    /// Returns the transition policy of an object type, `None` for the
    /// default one.
    fn transit_condition(&self, _object_type: ObjectType) -> Option<TransitCondition> {
        None
    }

    /// Called once a new object is registered.
    fn attach(&self, _object: &Arc<Object<Self::Context>>) {}

    /// Called once an object is unregistered.
    fn detach(&self, _object: &Object<Self::Context>) {}

    /// Lists the locations of the devices currently present.
    fn locations(&self) -> Vec<String> {
        Vec::new()
    }
}

type PresenceFn = Arc<dyn Fn(bool, &str) + Send + Sync>;

/// Callbacks provided by the software driving a [`Platform`].
#[derive(Clone, Default)]
pub struct Services {
    device_presence: Option<PresenceFn>,
}

impl Services {
    /// Creates [`Services`] without callbacks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the callback invoked when a device appears or disappears.
    #[must_use]
    pub fn device_presence(mut self, callback: impl Fn(bool, &str) + Send + Sync + 'static) -> Self {
        self.device_presence = Some(Arc::new(callback));
        self
    }

    fn report_presence(&self, present: bool, location: &str) {
        if let Some(callback) = &self.device_presence {
            callback(present, location);
        }
    }
}

// A registered device.
struct Device {
    root: ObjectId,
    fsm: FsmHandle,
}

/// The registry of live objects and device state machines.
pub struct Platform<A: Adapter> {
    adapter: A,
    services: Services,
    objects: Mutex<Map<ObjectId, Arc<Object<A::Context>>>>,
    // Devices by location.
    devices: Mutex<Map<String, Device>>,
}

impl<A: Adapter> Platform<A> {
    /// Creates a [`Platform`] and reports every device present.
    pub fn new(adapter: A, services: Services) -> Self {
        let locations = adapter.locations();
        let platform = Self {
            adapter,
            services,
            objects: Mutex::new(Map::default()),
            devices: Mutex::new(Map::default()),
        };
        for location in &locations {
            info!("Device present at {location}");
            platform.services.report_presence(true, location);
        }
        platform
    }

    /// Returns the adapter.
    #[must_use]
    pub const fn adapter(&self) -> &A {
        &self.adapter
    }

    fn objects(&self) -> Result<MutexGuard<'_, Map<ObjectId, Arc<Object<A::Context>>>>> {
        self.objects
            .lock()
            .map_err(|_| Error::new(ErrorKind::Failure, "Object registry lock poisoned"))
    }

    fn devices(&self) -> Result<MutexGuard<'_, Map<String, Device>>> {
        self.devices
            .lock()
            .map_err(|_| Error::new(ErrorKind::Failure, "Device registry lock poisoned"))
    }

    fn object(&self, id: ObjectId) -> Result<Arc<Object<A::Context>>> {
        self.objects()?
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::new(ErrorKind::NotFound, format!("Object {id} not found")))
    }

    // Resolves an object together with the state machine of its device.
    fn resolve(&self, id: ObjectId) -> Result<(Arc<Object<A::Context>>, FsmHandle)> {
        let object = self.object(id)?;
        let root = match object.parent() {
            Some(parent) => self.object(parent)?,
            None => object.clone(),
        };
        let fsm = root.fsm().map(Fsm::handle).ok_or_else(|| {
            Error::new(
                ErrorKind::Failure,
                format!("Object {} has no state machine", root.id()),
            )
        })?;
        Ok((object, fsm))
    }

    fn location(&self, attrs: &[Attribute]) -> Result<String> {
        let id = self.adapter.location_attribute();
        attrs
            .iter()
            .find(|attr| attr.id == id)
            .and_then(|attr| attr.value.as_str())
            .map(str::to_owned)
            .ok_or_else(|| Error::new(ErrorKind::MandatoryMissing, "Location is missing"))
    }

    /// Creates an object.
    ///
    /// A root creates and starts the state machine of its device. A child
    /// shares the context of its parent.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::NotSupported`] for an object type without schema
    /// - [`ErrorKind::MandatoryMissing`] when a mandatory attribute is absent
    /// - [`ErrorKind::AlreadyExists`] for a duplicate location or identifier
    /// - [`ErrorKind::InvalidObjectId`] and [`ErrorKind::NotFound`] for a bad
    ///   parent
    ///
    /// Creation attribute failures are reported with their position.
    pub fn create(
        &self,
        object_type: ObjectType,
        parent: Option<ObjectId>,
        attrs: &[Attribute],
    ) -> Result<ObjectId> {
        let schema = self.adapter.schema(object_type).ok_or_else(|| {
            Error::new(
                ErrorKind::NotSupported,
                format!("Object type {object_type} not supported"),
            )
        })?;

        if let Some(meta) = catalog::list_metadata(object_type)
            .filter(|meta| meta.is_mandatory_on_create())
            .find(|meta| !attrs.iter().any(|attr| attr.id == meta.id))
        {
            return Err(Error::new(
                ErrorKind::MandatoryMissing,
                format!("Attribute {} is mandatory", meta.short_name),
            ));
        }

        if object_type.is_root() {
            self.create_root(object_type, schema, attrs)
        } else {
            self.create_child(object_type, schema, parent, attrs)
        }
    }

    fn create_root(
        &self,
        object_type: ObjectType,
        schema: &'static SchemaTable<A::Context>,
        attrs: &[Attribute],
    ) -> Result<ObjectId> {
        let location = self.location(attrs)?;
        if self.devices()?.contains_key(&location) {
            return Err(Error::new(
                ErrorKind::AlreadyExists,
                format!("Device at {location} already exists"),
            ));
        }

        let id = self.adapter.object_id(object_type, None, attrs)?;
        self.check_free(id)?;

        let (context, fsm) = self.adapter.build_device(&location)?;
        let object = Object::new(
            id,
            None,
            schema,
            context,
            self.adapter.fallbacks(object_type, id),
            attrs,
        )?
        .with_transit_condition(self.adapter.transit_condition(object_type))
        .with_fsm(fsm);

        let object = Arc::new(object);
        let fsm = match object.fsm() {
            Some(fsm) => {
                fsm.start()?;
                fsm.handle()
            }
            None => return Err(Error::new(ErrorKind::Failure, "Missing state machine")),
        };

        self.objects()?.insert(id, object.clone());
        self.devices()?.insert(location.clone(), Device { root: id, fsm });
        self.adapter.attach(&object);

        info!("Created {object_type} {id} at {location}");
        Ok(id)
    }

    fn create_child(
        &self,
        object_type: ObjectType,
        schema: &'static SchemaTable<A::Context>,
        parent: Option<ObjectId>,
        attrs: &[Attribute],
    ) -> Result<ObjectId> {
        let parent = parent
            .filter(|parent| parent.object_type().is_root())
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::InvalidObjectId,
                    format!("{object_type} requires a module parent"),
                )
            })?;
        let root = self.object(parent)?;

        let id = self.adapter.object_id(object_type, Some(parent), attrs)?;
        self.check_free(id)?;

        let object = Object::new(
            id,
            Some(parent),
            schema,
            root.config().context().clone(),
            self.adapter.fallbacks(object_type, id),
            attrs,
        )?
        .with_transit_condition(self.adapter.transit_condition(object_type));

        let object = Arc::new(object);
        self.objects()?.insert(id, object.clone());
        self.adapter.attach(&object);

        info!("Created {object_type} {id}");
        Ok(id)
    }

    fn check_free(&self, id: ObjectId) -> Result<()> {
        if self.objects()?.contains_key(&id) {
            return Err(Error::new(
                ErrorKind::AlreadyExists,
                format!("Object {id} already exists"),
            ));
        }
        Ok(())
    }

    /// Removes an object.
    ///
    /// Removing a root stops the state machine of its device and waits for
    /// it.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::NotFound`] for an unknown object and
    /// [`ErrorKind::InUse`] for a root which still has children.
    pub fn remove(&self, id: ObjectId) -> Result<()> {
        let object = self.object(id)?;

        if object.parent().is_none() {
            if self.objects()?.values().any(|o| o.parent() == Some(id)) {
                return Err(Error::new(
                    ErrorKind::InUse,
                    format!("Object {id} still has children"),
                ));
            }
            // Joins the loop thread: no registry lock may be held.
            object.shutdown();
            self.devices()?.retain(|_, device| device.root != id);
        }

        self.objects()?.shift_remove(&id);
        self.adapter.detach(&object);

        info!("Removed {} {id}", object.object_type());
        Ok(())
    }

    /// Returns the type of a registered object, [`ObjectType::Null`] if
    /// unknown.
    #[must_use]
    pub fn get_object_type(&self, id: ObjectId) -> ObjectType {
        self.object(id)
            .map(|object| object.object_type())
            .unwrap_or(ObjectType::Null)
    }

    /// Returns the root owning a registered object, the object itself for a
    /// root, or [`ObjectId::NULL`] if unknown.
    #[must_use]
    pub fn get_parent_id(&self, id: ObjectId) -> ObjectId {
        self.object(id)
            .map(|object| object.parent().unwrap_or(id))
            .unwrap_or(ObjectId::NULL)
    }

    /// Returns the state machine of the device at `location`.
    #[must_use]
    pub fn fsm(&self, location: &str) -> Option<FsmHandle> {
        self.devices()
            .ok()?
            .get(location)
            .map(|device| device.fsm.clone())
    }

    /// Lists the registered objects of a type.
    #[must_use]
    pub fn list_objects(&self, object_type: ObjectType) -> Vec<ObjectId> {
        self.objects()
            .map(|objects| {
                objects
                    .keys()
                    .copied()
                    .filter(|id| id.object_type() == object_type)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Reads attributes of an object.
    ///
    /// # Errors
    ///
    /// See [`Object::get_attributes`].
    pub fn get_attributes(&self, id: ObjectId, attrs: &mut [Attribute]) -> Result<()> {
        self.object(id)?.get_attributes(attrs)
    }

    /// Writes attributes of an object.
    ///
    /// # Errors
    ///
    /// See [`Object::set_attributes`].
    pub fn set_attributes(&self, id: ObjectId, attrs: &[Attribute]) -> Result<()> {
        let (object, fsm) = self.resolve(id)?;
        object.set_attributes(attrs, &fsm)
    }

    /// Clears attributes of an object.
    ///
    /// # Errors
    ///
    /// See [`Object::clear_attributes`].
    pub fn clear_attributes(&self, id: ObjectId, ids: &[AttrId]) -> Result<()> {
        let (object, fsm) = self.resolve(id)?;
        object.clear_attributes(ids, &fsm)
    }

    /// Returns attribute capabilities of an object.
    ///
    /// # Errors
    ///
    /// See [`Object::get_capabilities`].
    pub fn get_capabilities(
        &self,
        id: ObjectId,
        ids: &[AttrId],
    ) -> Result<Vec<AttributeCapability>> {
        self.object(id)?.get_capabilities(ids)
    }

    /// Sends attributes of an object to a notification handler.
    ///
    /// # Errors
    ///
    /// See [`Object::notify`].
    pub fn notify(
        &self,
        id: ObjectId,
        notification: AttrId,
        ids: &[AttrId],
        alarm: bool,
    ) -> Result<()> {
        self.object(id)?.notify(notification, ids, alarm)
    }

    /// Registers a notification handler on an object.
    ///
    /// # Errors
    ///
    /// See [`Object::subscribe`].
    pub fn subscribe(
        &self,
        id: ObjectId,
        notification: AttrId,
        handler: NotificationHandler,
    ) -> Result<()> {
        self.object(id)?.subscribe(notification, handler)
    }

    /// Handles a device appearing or disappearing.
    ///
    /// The change is first reported to [`Services`]. A present device then
    /// gets its root created, unless the presence callback already created
    /// it. An absent one is removed together with its children. Returns the
    /// root identifier.
    ///
    /// # Errors
    ///
    /// Propagates creation and removal failures.
    pub fn device_presence(&self, present: bool, location: &str) -> Result<ObjectId> {
        self.services.report_presence(present, location);

        if present {
            if let Some(root) = self.devices()?.get(location).map(|device| device.root) {
                debug!("Device at {location} already has root {root}");
                return Ok(root);
            }
            let attrs = [Attribute::new(self.adapter.location_attribute(), location)];
            return self.create(ObjectType::Module, None, &attrs);
        }

        let root = self
            .devices()?
            .get(location)
            .map(|device| device.root)
            .ok_or_else(|| {
                Error::new(ErrorKind::NotFound, format!("No device at {location}"))
            })?;

        let children: Vec<ObjectId> = self
            .objects()?
            .values()
            .filter(|object| object.parent() == Some(root))
            .map(|object| object.id())
            .collect();
        for child in children {
            self.remove(child)?;
        }
        self.remove(root)?;
        debug!("Device at {location} gone");
        Ok(root)
    }

    /// Lists the metadata of an object type.
    #[must_use]
    pub fn list_metadata(&self, object_type: ObjectType) -> Vec<&'static AttrMetadata> {
        catalog::list_metadata(object_type).collect()
    }

    /// Looks up the metadata of an attribute.
    #[must_use]
    pub fn attribute_metadata(
        &self,
        object_type: ObjectType,
        id: AttrId,
    ) -> Option<&'static AttrMetadata> {
        catalog::attr_metadata(object_type, id)
    }

    /// Summarizes every object type.
    #[must_use]
    pub fn list_object_info(&self) -> Vec<ObjectInfo> {
        catalog::object_info()
    }
}

impl<A: Adapter> Drop for Platform<A> {
    fn drop(&mut self) {
        let objects: Vec<_> = match self.objects.get_mut() {
            Ok(objects) => objects.drain(..).map(|(_, object)| object).collect(),
            Err(_) => {
                warn!("Object registry lock poisoned");
                return;
            }
        };
        // Children first, then roots.
        for object in objects.iter().filter(|object| object.parent().is_some()) {
            self.adapter.detach(object);
        }
        for object in objects.iter().filter(|object| object.parent().is_none()) {
            object.shutdown();
            self.adapter.detach(object);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, LazyLock, Mutex, OnceLock, Weak};

    use serial_test::serial;

    use tai::attribute::Attribute;
    use tai::catalog::{host_interface, module};
    use tai::object::{ObjectId, ObjectType};

    use crate::error::{ErrorKind, Result};
    use crate::fsm::{Fsm, FsmBuilder, FsmState};
    use crate::object::Object;
    use crate::schema::SchemaTable;
    use crate::testing::wait_until;

    use super::{Adapter, Platform, Services};

    type Context = Arc<AtomicUsize>;

    static MODULE: LazyLock<SchemaTable<Context>> = LazyLock::new(|| {
        SchemaTable::builder(ObjectType::Module).attribute(module::LOCATION, |info| info)
    });

    static HOST_INTERFACE: LazyLock<SchemaTable<Context>> = LazyLock::new(|| {
        SchemaTable::builder(ObjectType::HostInterface)
            .attribute(host_interface::INDEX, |info| info)
    });

    #[derive(Default)]
    struct Stub {
        attached: Mutex<Vec<ObjectId>>,
    }

    impl Adapter for Stub {
        type Context = Context;

        fn schema(&self, object_type: ObjectType) -> Option<&'static SchemaTable<Context>> {
            match object_type {
                ObjectType::Module => Some(&*MODULE),
                ObjectType::HostInterface => Some(&*HOST_INTERFACE),
                _ => None,
            }
        }

        fn object_id(
            &self,
            object_type: ObjectType,
            parent: Option<ObjectId>,
            attrs: &[Attribute],
        ) -> Result<ObjectId> {
            let number = |id| {
                attrs
                    .iter()
                    .find(|attr| attr.id == id)
                    .map(|attr| match &attr.value {
                        tai::value::AttributeValue::CharList(s) => s.parse().unwrap_or(0),
                        tai::value::AttributeValue::U32(v) => *v,
                        _ => 0,
                    })
                    .unwrap_or(0)
            };
            Ok(match parent {
                None => ObjectId::module(number(module::LOCATION)),
                Some(parent) => {
                    ObjectId::child(object_type, parent, number(host_interface::INDEX) as u16)
                }
            })
        }

        fn build_device(&self, _location: &str) -> Result<(Context, Fsm)> {
            let fsm = FsmBuilder::new("stub")
                .state(FsmState::INIT, |context| async move {
                    context.wait_transition().await
                })
                .build();
            Ok((Context::default(), fsm))
        }

        fn attach(&self, object: &Arc<Object<Context>>) {
            self.attached.lock().unwrap().push(object.id());
        }

        fn detach(&self, object: &Object<Context>) {
            self.attached.lock().unwrap().retain(|id| *id != object.id());
        }

        fn locations(&self) -> Vec<String> {
            vec!["0".into(), "1".into()]
        }
    }

    fn location(value: &str) -> Attribute {
        Attribute::new(module::LOCATION, value)
    }

    #[test]
    fn presence_is_reported() {
        let reported = Arc::new(Mutex::new(Vec::new()));
        let sink = reported.clone();
        let platform = Platform::new(
            Stub::default(),
            Services::new().device_presence(move |present, location| {
                sink.lock().unwrap().push((present, location.to_owned()));
            }),
        );
        assert_eq!(
            *reported.lock().unwrap(),
            vec![(true, "0".to_owned()), (true, "1".to_owned())]
        );
        assert!(platform.list_objects(ObjectType::Module).is_empty());
    }

    #[test]
    #[serial]
    fn create_and_remove() {
        let platform = Platform::new(Stub::default(), Services::new());

        let error = platform
            .create(ObjectType::Module, None, &[])
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::MandatoryMissing);

        let root = platform
            .create(ObjectType::Module, None, &[location("1")])
            .unwrap();
        assert_eq!(root, ObjectId::module(1));
        assert_eq!(platform.get_object_type(root), ObjectType::Module);
        assert_eq!(platform.get_parent_id(root), root);
        assert!(platform.fsm("1").is_some());

        let error = platform
            .create(ObjectType::Module, None, &[location("1")])
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::AlreadyExists);

        let error = platform
            .create(
                ObjectType::NetworkInterface,
                Some(root),
                &[Attribute::new(host_interface::INDEX, 0u32)],
            )
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::NotSupported);

        let index = [Attribute::new(host_interface::INDEX, 0u32)];
        let error = platform
            .create(ObjectType::HostInterface, Some(ObjectId::module(3)), &index)
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::NotFound);

        let child = platform
            .create(ObjectType::HostInterface, Some(root), &index)
            .unwrap();
        assert_eq!(platform.get_parent_id(child), root);
        assert_eq!(platform.adapter().attached.lock().unwrap().len(), 2);

        let error = platform
            .create(ObjectType::HostInterface, Some(child), &index)
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidObjectId);

        let error = platform.remove(root).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InUse);

        let fsm = platform.fsm("1").unwrap();
        platform.remove(child).unwrap();
        platform.remove(root).unwrap();
        assert_eq!(fsm.state(), FsmState::END);
        assert!(platform.fsm("1").is_none());
        assert!(platform.adapter().attached.lock().unwrap().is_empty());

        assert_eq!(platform.get_object_type(root), ObjectType::Null);
        assert_eq!(platform.get_parent_id(child), ObjectId::NULL);
        assert_eq!(
            platform.remove(root).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    #[serial]
    fn device_presence() {
        let platform = Platform::new(Stub::default(), Services::new());

        let root = platform.device_presence(true, "0").unwrap();
        platform
            .create(
                ObjectType::HostInterface,
                Some(root),
                &[Attribute::new(host_interface::INDEX, 1u32)],
            )
            .unwrap();
        let fsm = platform.fsm("0").unwrap();
        assert!(wait_until(|| fsm.state() == FsmState::INIT));

        assert_eq!(platform.device_presence(false, "0").unwrap(), root);
        assert!(platform.list_objects(ObjectType::HostInterface).is_empty());
        assert_eq!(fsm.state(), FsmState::END);

        let error = platform.device_presence(false, "0").unwrap_err();
        assert_eq!(error.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn metadata_passthrough() {
        let platform = Platform::new(Stub::default(), Services::new());
        assert!(!platform.list_metadata(ObjectType::Module).is_empty());
        assert_eq!(
            platform
                .attribute_metadata(ObjectType::Module, module::LOCATION)
                .map(|meta| meta.short_name),
            Some("location")
        );
        assert_eq!(platform.list_object_info().len(), 3);
    }

    #[test]
    #[serial]
    fn presence_callback_may_create() {
        let location_attr = |value: &str| Attribute::new(module::LOCATION, value);
        let slot: Arc<OnceLock<Weak<Platform<Stub>>>> = Arc::new(OnceLock::new());
        let registry = slot.clone();
        let platform = Arc::new(Platform::new(
            Stub::default(),
            Services::new().device_presence(move |present, location| {
                let Some(platform) = registry.get().and_then(Weak::upgrade) else {
                    return;
                };
                if present && platform.fsm(location).is_none() {
                    platform
                        .create(ObjectType::Module, None, &[location_attr(location)])
                        .unwrap();
                }
            }),
        ));
        slot.set(Arc::downgrade(&platform)).unwrap();

        let root = platform.device_presence(true, "1").unwrap();
        assert_eq!(root, ObjectId::module(1));
        assert_eq!(platform.list_objects(ObjectType::Module), vec![root]);

        // Reported again while already present.
        assert_eq!(platform.device_presence(true, "1").unwrap(), root);

        assert_eq!(platform.device_presence(false, "1").unwrap(), root);
        assert!(platform.list_objects(ObjectType::Module).is_empty());
    }
}
