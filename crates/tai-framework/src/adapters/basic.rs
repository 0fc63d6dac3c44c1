use std::sync::{Arc, LazyLock, Mutex, Weak};
use std::time::Duration;

use tracing::{debug, info, warn};

use tai::attribute::Attribute;
use tai::catalog::{self, host_interface, module, network_interface};
use tai::metadata::AttrId;
use tai::object::{ObjectId, ObjectType};
use tai::value::AttributeValue;

use crate::Map;
use crate::config::Fallbacks;
use crate::error::{Error, ErrorKind, Result};
use crate::fsm::{Fsm, FsmBuilder, FsmContext, FsmState};
use crate::object::Object;
use crate::platform::Adapter;
use crate::schema::{SchemaTable, Validator};

/// Default number of modules.
pub const DEFAULT_NUM_MODULES: u32 = 4;
/// Default number of host interfaces per module.
pub const DEFAULT_NUM_HOST_INTERFACES: u32 = 2;
/// Number of network interfaces per module.
pub const NUM_NETWORK_INTERFACES: u32 = 1;
/// Default interval between two device polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Default vendor name.
pub const DEFAULT_VENDOR_NAME: &str = "BASIC";

// Tunable laser range, in Hz.
const MIN_LASER_FREQ: f64 = 191_150_000_000_000.0;
const MAX_LASER_FREQ: f64 = 196_100_000_000_000.0;

// Modulation formats the simulated optics support.
const MODULATION_FORMAT_DP_16_QAM: i32 = 3;

/// Configuration of the [`Basic`] adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasicConfig {
    num_modules: u32,
    num_host_interfaces: u32,
    poll_interval: Duration,
    vendor_name: &'static str,
}

impl Default for BasicConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl BasicConfig {
    /// Creates a [`BasicConfig`] with the default values.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            num_modules: DEFAULT_NUM_MODULES,
            num_host_interfaces: DEFAULT_NUM_HOST_INTERFACES,
            poll_interval: DEFAULT_POLL_INTERVAL,
            vendor_name: DEFAULT_VENDOR_NAME,
        }
    }

    /// Sets the number of modules.
    #[must_use]
    pub const fn num_modules(mut self, num_modules: u32) -> Self {
        self.num_modules = num_modules;
        self
    }

    /// Sets the number of host interfaces per module.
    #[must_use]
    pub const fn num_host_interfaces(mut self, num_host_interfaces: u32) -> Self {
        self.num_host_interfaces = num_host_interfaces;
        self
    }

    /// Sets the polling interval of the state machines.
    #[must_use]
    pub const fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Sets the vendor name reported by modules.
    #[must_use]
    pub const fn vendor_name(mut self, vendor_name: &'static str) -> Self {
        self.vendor_name = vendor_name;
        self
    }
}

/// Hook context of a [`Basic`] device.
pub type BasicContext = Arc<BasicDevice>;

type BasicObject = Object<BasicContext>;

/// A simulated transponder.
///
/// Keeps weak references to the objects of the device, so hooks can reach
/// their siblings.
pub struct BasicDevice {
    location: String,
    config: BasicConfig,
    module: Mutex<Weak<BasicObject>>,
    network_interface: Mutex<Weak<BasicObject>>,
    host_interfaces: Mutex<Vec<Weak<BasicObject>>>,
}

impl BasicDevice {
    fn new(location: &str, config: BasicConfig) -> Self {
        let host_interfaces = (0..config.num_host_interfaces).map(|_| Weak::new()).collect();
        Self {
            location: location.to_owned(),
            config,
            module: Mutex::new(Weak::new()),
            network_interface: Mutex::new(Weak::new()),
            host_interfaces: Mutex::new(host_interfaces),
        }
    }

    /// Returns the device location.
    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Returns the module object, if registered.
    #[must_use]
    pub fn module(&self) -> Option<Arc<BasicObject>> {
        self.module.lock().ok()?.upgrade()
    }

    /// Returns the network interface object, if registered.
    #[must_use]
    pub fn network_interface(&self) -> Option<Arc<BasicObject>> {
        self.network_interface.lock().ok()?.upgrade()
    }

    /// Returns a host interface object, if registered.
    #[must_use]
    pub fn host_interface(&self, index: usize) -> Option<Arc<BasicObject>> {
        self.host_interfaces.lock().ok()?.get(index)?.upgrade()
    }

    /// Whether the device can reach [`FsmState::READY`]: module and network
    /// interface are created, and the module is administratively up.
    #[must_use]
    pub fn configured(&self) -> bool {
        let (Some(module), Some(_)) = (self.module(), self.network_interface()) else {
            return false;
        };
        module
            .config()
            .get(module::ADMIN_STATUS)
            .and_then(|value| value.as_i32())
            == Some(module::ADMIN_STATUS_UP)
    }

    fn set_slot(&self, object_type: ObjectType, index: u16, weak: Weak<BasicObject>) {
        let updated = match object_type {
            ObjectType::Module => self.module.lock().map(|mut slot| *slot = weak).is_ok(),
            ObjectType::NetworkInterface => self
                .network_interface
                .lock()
                .map(|mut slot| *slot = weak)
                .is_ok(),
            ObjectType::HostInterface => self
                .host_interfaces
                .lock()
                .map(|mut slots| {
                    if let Some(slot) = slots.get_mut(usize::from(index)) {
                        *slot = weak;
                    }
                })
                .is_ok(),
            ObjectType::Null => true,
        };
        if !updated {
            warn!("Device {} slots poisoned", self.location);
        }
    }

    async fn waiting_configuration(self: Arc<Self>, context: FsmContext) -> FsmState {
        if self.configured() {
            return FsmState::READY;
        }
        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.tick().await;
        loop {
            tokio::select! {
                next = context.wait_transition() => return next,
                _ = interval.tick() => {
                    if self.configured() {
                        return FsmState::READY;
                    }
                }
            }
        }
    }

    async fn ready(self: Arc<Self>, context: FsmContext) -> FsmState {
        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.tick().await;
        loop {
            tokio::select! {
                next = context.wait_transition() => return next,
                _ = interval.tick() => self.poll(),
            }
        }
    }

    // Periodic report of the device inventory.
    fn poll(&self) {
        let Some(module) = self.module() else {
            return;
        };
        if !module.is_subscribed(module::NOTIFY) {
            return;
        }
        if let Err(e) = module.notify(module::NOTIFY, &[module::NUM_HOST_INTERFACES], false) {
            warn!("Device {} poll failed: {e}", self.location);
        }
    }

    // Mirrors the state into the module operational status.
    fn state_changed(&self, current: FsmState, next: FsmState) -> FsmState {
        debug!("Device {}: {current} -> {next}", self.location);
        let Some(module) = self.module() else {
            return next;
        };

        let oper_status = if next == FsmState::READY {
            module::OPER_STATUS_READY
        } else {
            module::OPER_STATUS_INITIALIZE
        };
        if let Err(e) = module
            .config()
            .set_readonly(&Attribute::new(module::OPER_STATUS, oper_status), false)
        {
            warn!("Device {} oper status not updated: {e}", self.location);
        }

        if module.is_subscribed(module::NOTIFY)
            && let Err(e) = module.notify_alarm(module::NOTIFY, &[module::OPER_STATUS])
        {
            warn!("Device {} oper status not notified: {e}", self.location);
        }
        next
    }
}

fn log_setter(attr: &Attribute, _: &mut FsmState, device: &BasicContext) -> Result<()> {
    info!(
        "Device {} applies attribute {}: {:?}",
        device.location, attr.id, attr.value
    );
    Ok(())
}

static MODULE: LazyLock<SchemaTable<BasicContext>> = LazyLock::new(|| {
    SchemaTable::builder(ObjectType::Module)
        .attribute(module::LOCATION, |info| info)
        .attribute(module::VENDOR_NAME, |info| {
            info.default_value(DEFAULT_VENDOR_NAME)
                .getter(|attr, device: &BasicContext| {
                    Ok(attr.copy_value(&AttributeValue::from(device.config.vendor_name))?)
                })
        })
        .attribute(module::OPER_STATUS, |info| {
            info.default_value(module::OPER_STATUS_INITIALIZE)
        })
        .attribute(module::NUM_NETWORK_INTERFACES, |info| {
            info.default_value(NUM_NETWORK_INTERFACES)
        })
        .attribute(module::NUM_HOST_INTERFACES, |info| {
            info.default_value(DEFAULT_NUM_HOST_INTERFACES)
                .getter(|attr, device: &BasicContext| {
                    Ok(attr.copy_value(&AttributeValue::U32(device.config.num_host_interfaces))?)
                })
        })
        .attribute(module::ADMIN_STATUS, |info| {
            info.validator(Validator::Enum(vec![
                module::ADMIN_STATUS_DOWN,
                module::ADMIN_STATUS_UP,
            ]))
            .fsm_state(FsmState::WAITING_CONFIGURATION)
            .setter(log_setter)
        })
        .attribute(module::MODULE_SHUTDOWN_REQUEST_NOTIFY, |info| info)
        .attribute(module::MODULE_STATE_CHANGE_NOTIFY, |info| info)
        .attribute(module::NOTIFY, |info| info)
});

static NETWORK_INTERFACE: LazyLock<SchemaTable<BasicContext>> = LazyLock::new(|| {
    SchemaTable::builder(ObjectType::NetworkInterface)
        .attribute(network_interface::INDEX, |info| info)
        .attribute(network_interface::TX_DIS, |info| {
            info.setter(log_setter)
                .getter(|attr, device: &BasicContext| {
                    let netif = device.network_interface().ok_or_else(|| {
                        Error::new(ErrorKind::Failure, "Network interface not attached")
                    })?;
                    netif.config().get_attribute(attr, true)
                })
        })
        .attribute(network_interface::TX_LASER_FREQ, |info| {
            info.validator(Validator::Range {
                min: MIN_LASER_FREQ,
                max: MAX_LASER_FREQ,
            })
            .setter(log_setter)
        })
        .attribute(network_interface::OUTPUT_POWER, |info| {
            let meta = info.meta();
            let validator = match (meta.min, meta.max) {
                (Some(min), Some(max)) => Validator::Range { min, max },
                _ => Validator::custom(|_| true),
            };
            info.validator(validator).setter(log_setter)
        })
        .attribute(network_interface::MODULATION_FORMAT, |info| {
            info.validator(Validator::Enum(vec![
                network_interface::MODULATION_FORMAT_DP_QPSK,
                MODULATION_FORMAT_DP_16_QAM,
            ]))
            .fsm_state(FsmState::WAITING_CONFIGURATION)
            .setter(log_setter)
        })
        .attribute(network_interface::NOTIFY, |info| info)
});

static HOST_INTERFACE: LazyLock<SchemaTable<BasicContext>> = LazyLock::new(|| {
    SchemaTable::builder(ObjectType::HostInterface)
        .attribute(host_interface::INDEX, |info| info)
        .attribute(host_interface::FEC_TYPE, |info| {
            info.validator(Validator::Enum(vec![
                host_interface::FEC_TYPE_NONE,
                host_interface::FEC_TYPE_RS,
                host_interface::FEC_TYPE_FC,
            ]))
            .setter(log_setter)
        })
        .attribute(host_interface::NOTIFY, |info| info)
});

// Values of the attributes an object schema does not handle.
type Storage = Arc<Mutex<Map<AttrId, Attribute>>>;

fn storage_error() -> Error {
    Error::new(ErrorKind::Failure, "Attribute storage poisoned")
}

fn store_fallback(
    object_type: ObjectType,
    storage: &Storage,
    attrs: &[Attribute],
    errors: &[Error],
) -> Result<()> {
    let mut stored = storage.lock().map_err(|_| storage_error())?;
    for (i, (attr, error)) in attrs.iter().zip(errors).enumerate() {
        if error.kind() != ErrorKind::NotSupported {
            return Err(error.clone().at(i));
        }
        if catalog::attr_metadata(object_type, attr.id).is_none() {
            return Err(Error::new(
                ErrorKind::NotSupported,
                format!("{object_type} attribute {} is unknown", attr.id),
            )
            .at(i));
        }
        stored.insert(attr.id, attr.clone());
    }
    Ok(())
}

fn load_fallback(
    object_type: ObjectType,
    storage: &Storage,
    attrs: &mut [Attribute],
    errors: &[Error],
) -> Result<()> {
    let stored = storage.lock().map_err(|_| storage_error())?;
    for (i, (attr, error)) in attrs.iter_mut().zip(errors).enumerate() {
        if error.kind() != ErrorKind::NotSupported {
            return Err(error.clone().at(i));
        }
        if let Some(value) = stored.get(&attr.id) {
            attr.copy_from(value).map_err(|e| Error::from(e).at(i))?;
            continue;
        }
        let meta = match catalog::attr_metadata(object_type, attr.id) {
            Some(meta) if !meta.is_read_only() => meta,
            _ => {
                return Err(Error::new(
                    ErrorKind::NotSupported,
                    format!("{object_type} attribute {} is not available", attr.id),
                )
                .at(i));
            }
        };
        match &meta.default {
            Some(default) => attr.copy_value(default).map_err(|e| Error::from(e).at(i))?,
            None => {
                return Err(Error::new(
                    ErrorKind::Uninitialized,
                    format!("Attribute {} has no value", meta.short_name),
                )
                .at(i));
            }
        }
    }
    Ok(())
}

/// The reference adapter.
///
/// Every device location in `0..num_modules` is present. Devices need an
/// administratively up module and a network interface to become ready.
pub struct Basic {
    config: BasicConfig,
}

impl Basic {
    /// Creates a [`Basic`] adapter.
    #[must_use]
    pub const fn new(config: BasicConfig) -> Self {
        Self { config }
    }

    fn index(
        attrs: &[Attribute],
        id: AttrId,
        count: u32,
        parent: Option<ObjectId>,
    ) -> Result<(ObjectId, u16)> {
        let parent = parent.ok_or_else(|| {
            Error::new(ErrorKind::InvalidObjectId, "Interfaces require a module")
        })?;
        let index = attrs
            .iter()
            .find(|attr| attr.id == id)
            .and_then(|attr| attr.value.as_u32())
            .ok_or_else(|| Error::new(ErrorKind::MandatoryMissing, "Index is missing"))?;
        if index >= count {
            return Err(Error::new(
                ErrorKind::InvalidParameter,
                format!("Index {index} out of range, {count} interfaces"),
            ));
        }
        let index = u16::try_from(index)
            .map_err(|_| Error::new(ErrorKind::InvalidParameter, "Index out of range"))?;
        Ok((parent, index))
    }
}

impl Adapter for Basic {
    type Context = BasicContext;

    fn schema(&self, object_type: ObjectType) -> Option<&'static SchemaTable<BasicContext>> {
        match object_type {
            ObjectType::Module => Some(&*MODULE),
            ObjectType::NetworkInterface => Some(&*NETWORK_INTERFACE),
            ObjectType::HostInterface => Some(&*HOST_INTERFACE),
            ObjectType::Null => None,
        }
    }

    fn object_id(
        &self,
        object_type: ObjectType,
        parent: Option<ObjectId>,
        attrs: &[Attribute],
    ) -> Result<ObjectId> {
        match object_type {
            ObjectType::Module => {
                let location = attrs
                    .iter()
                    .find(|attr| attr.id == module::LOCATION)
                    .and_then(|attr| attr.value.as_str())
                    .ok_or_else(|| Error::new(ErrorKind::MandatoryMissing, "Location is missing"))?;
                let slot = location.parse::<u32>().map_err(|_| {
                    Error::new(
                        ErrorKind::InvalidParameter,
                        format!("Location {location} is not a number"),
                    )
                })?;
                if slot >= self.config.num_modules {
                    return Err(Error::new(
                        ErrorKind::InvalidParameter,
                        format!("Location {location} out of range"),
                    ));
                }
                Ok(ObjectId::module(slot))
            }
            ObjectType::NetworkInterface => {
                let (parent, index) = Self::index(
                    attrs,
                    network_interface::INDEX,
                    NUM_NETWORK_INTERFACES,
                    parent,
                )?;
                Ok(ObjectId::child(object_type, parent, index))
            }
            ObjectType::HostInterface => {
                let (parent, index) = Self::index(
                    attrs,
                    host_interface::INDEX,
                    self.config.num_host_interfaces,
                    parent,
                )?;
                Ok(ObjectId::child(object_type, parent, index))
            }
            ObjectType::Null => Err(Error::new(
                ErrorKind::InvalidObjectId,
                "Null objects cannot be created",
            )),
        }
    }

    fn build_device(&self, location: &str) -> Result<(BasicContext, Fsm)> {
        let device = Arc::new(BasicDevice::new(location, self.config));

        let fsm = FsmBuilder::new(format!("basic-{location}"))
            .configured({
                let device = device.clone();
                move || device.configured()
            })
            .state(FsmState::INIT, |_| async { FsmState::WAITING_CONFIGURATION })
            .state(FsmState::WAITING_CONFIGURATION, {
                let device = device.clone();
                move |context| device.clone().waiting_configuration(context)
            })
            .state(FsmState::READY, {
                let device = device.clone();
                move |context| device.clone().ready(context)
            })
            .state_change({
                let device = device.clone();
                move |current, next| device.state_changed(current, next)
            })
            .build();

        Ok((device, fsm))
    }

    fn fallbacks(&self, object_type: ObjectType, _id: ObjectId) -> Fallbacks<BasicContext> {
        let storage = Storage::default();
        let load = storage.clone();
        Fallbacks::new()
            .setter(move |attrs: &[Attribute], errors: &[Error], _: &mut FsmState, _: &BasicContext| {
                store_fallback(object_type, &storage, attrs, errors)
            })
            .getter(move |attrs: &mut [Attribute], errors: &[Error], _: &BasicContext| {
                load_fallback(object_type, &load, attrs, errors)
            })
    }

    fn attach(&self, object: &Arc<BasicObject>) {
        object.config().context().set_slot(
            object.object_type(),
            object.id().index(),
            Arc::downgrade(object),
        );
    }

    fn detach(&self, object: &BasicObject) {
        object
            .config()
            .context()
            .set_slot(object.object_type(), object.id().index(), Weak::new());
    }

    fn locations(&self) -> Vec<String> {
        (0..self.config.num_modules).map(|slot| slot.to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use serial_test::serial;

    use tai::attribute::Attribute;
    use tai::catalog::{host_interface, module, network_interface};
    use tai::object::{ObjectId, ObjectType};
    use tai::value::{AttributeValue, NotificationHandler};

    use crate::error::ErrorKind;
    use crate::fsm::FsmState;
    use crate::platform::{Platform, Services};
    use crate::testing::{init_logging, wait_until};

    use super::{Basic, BasicConfig};

    fn platform() -> Platform<Basic> {
        init_logging();
        let config = BasicConfig::new().poll_interval(Duration::from_millis(20));
        Platform::new(Basic::new(config), Services::new())
    }

    fn get(platform: &Platform<Basic>, id: ObjectId, attr: Attribute) -> AttributeValue {
        let mut attrs = [attr];
        platform.get_attributes(id, &mut attrs).unwrap();
        let [attr] = attrs;
        attr.value
    }

    fn create_interfaces(platform: &Platform<Basic>, root: ObjectId) -> Vec<ObjectId> {
        let mut ids = vec![
            platform
                .create(
                    ObjectType::NetworkInterface,
                    Some(root),
                    &[Attribute::new(network_interface::INDEX, 0u32)],
                )
                .unwrap(),
        ];
        for index in 0..2u32 {
            ids.push(
                platform
                    .create(
                        ObjectType::HostInterface,
                        Some(root),
                        &[Attribute::new(host_interface::INDEX, index)],
                    )
                    .unwrap(),
            );
        }
        ids
    }

    #[test]
    #[serial]
    fn module_becomes_ready() {
        let platform = platform();

        let root = platform
            .create(
                ObjectType::Module,
                None,
                &[Attribute::new(module::LOCATION, "3")],
            )
            .unwrap();
        assert_eq!(
            get(&platform, root, Attribute::new(module::NUM_NETWORK_INTERFACES, 0u32)),
            AttributeValue::U32(1)
        );
        assert_eq!(
            get(&platform, root, Attribute::new(module::NUM_HOST_INTERFACES, 0u32)),
            AttributeValue::U32(2)
        );
        assert_eq!(
            get(&platform, root, Attribute::new(module::VENDOR_NAME, "")),
            AttributeValue::from("BASIC")
        );

        let children = create_interfaces(&platform, root);
        let fsm = platform.fsm("3").unwrap();
        assert!(wait_until(|| fsm.state() == FsmState::WAITING_CONFIGURATION));

        let batches = Arc::new(Mutex::new(Vec::new()));
        let sink = batches.clone();
        platform
            .subscribe(
                root,
                module::NOTIFY,
                NotificationHandler::new(move |_, attrs| sink.lock().unwrap().push(attrs.to_vec())),
            )
            .unwrap();

        platform
            .set_attributes(
                root,
                &[Attribute::new(module::ADMIN_STATUS, module::ADMIN_STATUS_UP)],
            )
            .unwrap();
        assert!(wait_until(|| fsm.state() == FsmState::READY));
        assert!(wait_until(|| {
            get(&platform, root, Attribute::new(module::OPER_STATUS, 0))
                == AttributeValue::S32(module::OPER_STATUS_READY)
        }));

        let ready = Attribute::new(module::OPER_STATUS, module::OPER_STATUS_READY);
        assert!(wait_until(|| batches
            .lock()
            .unwrap()
            .iter()
            .any(|batch| batch.contains(&ready))));
        // Periodic inventory report.
        let hosts = Attribute::new(module::NUM_HOST_INTERFACES, 2u32);
        assert!(wait_until(|| batches
            .lock()
            .unwrap()
            .iter()
            .any(|batch| batch == &vec![hosts.clone()])));

        platform
            .clear_attributes(root, &[module::ADMIN_STATUS])
            .unwrap();
        assert!(wait_until(|| fsm.state() == FsmState::WAITING_CONFIGURATION));

        let error = platform.remove(root).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InUse);

        for child in children {
            platform.remove(child).unwrap();
        }
        platform.remove(root).unwrap();
        assert_eq!(fsm.state(), FsmState::END);
    }

    #[test]
    #[serial]
    fn creation_parameters() {
        let platform = platform();

        for location in ["4", "front"] {
            let error = platform
                .create(
                    ObjectType::Module,
                    None,
                    &[Attribute::new(module::LOCATION, location)],
                )
                .unwrap_err();
            assert_eq!(error.kind(), ErrorKind::InvalidParameter);
        }

        let root = platform.device_presence(true, "0").unwrap();
        assert_eq!(root, ObjectId::module(0));

        let error = platform
            .create(
                ObjectType::HostInterface,
                Some(root),
                &[Attribute::new(host_interface::INDEX, 2u32)],
            )
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidParameter);

        let error = platform
            .create(
                ObjectType::NetworkInterface,
                Some(root),
                &[Attribute::new(network_interface::INDEX, 1u32)],
            )
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidParameter);

        let error = platform
            .create(
                ObjectType::NetworkInterface,
                Some(root),
                &[
                    Attribute::new(network_interface::INDEX, 0u32),
                    Attribute::new(network_interface::OUTPUT_POWER, 9.0f32),
                ],
            )
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidValue);
        assert_eq!(error.index(), Some(1));

        platform.device_presence(false, "0").unwrap();
        assert_eq!(platform.get_object_type(root), ObjectType::Null);
    }

    #[test]
    #[serial]
    fn interface_attributes() {
        let platform = platform();
        let root = platform.device_presence(true, "1").unwrap();
        let children = create_interfaces(&platform, root);
        let (netif, hostif) = (children[0], children[1]);

        platform
            .set_attributes(
                netif,
                &[
                    Attribute::new(network_interface::TX_DIS, true),
                    Attribute::new(network_interface::TX_CHANNEL, 5u16),
                ],
            )
            .unwrap();
        assert_eq!(
            get(&platform, netif, Attribute::new(network_interface::TX_DIS, false)),
            AttributeValue::Bool(true)
        );
        assert_eq!(
            get(&platform, netif, Attribute::new(network_interface::TX_CHANNEL, 0u16)),
            AttributeValue::U16(5)
        );

        assert_eq!(
            get(&platform, hostif, Attribute::new(host_interface::LOOPBACK_TYPE, 1)),
            AttributeValue::S32(0)
        );
        let mut attrs = [Attribute::new(
            host_interface::LANE_FAULT,
            AttributeValue::U32List(Vec::new()),
        )];
        let error = platform.get_attributes(hostif, &mut attrs).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::NotSupported);
        assert_eq!(error.index(), Some(0));

        let error = platform
            .set_attributes(
                hostif,
                &[Attribute::new(host_interface::FEC_TYPE, 9)],
            )
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidValue);

        let capabilities = platform
            .get_capabilities(
                netif,
                &[
                    network_interface::MODULATION_FORMAT,
                    network_interface::OUTPUT_POWER,
                ],
            )
            .unwrap();
        assert_eq!(
            capabilities[0].supported,
            vec![AttributeValue::S32(1), AttributeValue::S32(3)]
        );
        assert_eq!(capabilities[1].min, Some(AttributeValue::Float(-20.0)));

        for child in children {
            platform.remove(child).unwrap();
        }
    }
}
