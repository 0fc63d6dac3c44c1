use std::sync::LazyLock;

use crate::Map;
use crate::metadata::{AttrFlags, AttrId, AttrMetadata, EnumMetadata, ObjectInfo};
use crate::object::ObjectType;
use crate::value::{NotificationHandler, ValueKind};

/// Module attributes.
pub mod module {
    use crate::metadata::{AttrId, EnumMetadata};

    /// Module location, required at creation.
    pub const LOCATION: AttrId = 0;
    /// Vendor name.
    pub const VENDOR_NAME: AttrId = 1;
    /// Vendor part number.
    pub const VENDOR_PART_NUMBER: AttrId = 2;
    /// Vendor serial number.
    pub const VENDOR_SERIAL_NUMBER: AttrId = 3;
    /// Firmware versions.
    pub const FIRMWARE_VERSIONS: AttrId = 4;
    /// Operational status.
    pub const OPER_STATUS: AttrId = 5;
    /// Internal temperature.
    pub const TEMP: AttrId = 6;
    /// Power supply voltage.
    pub const POWER: AttrId = 7;
    /// Number of host interfaces.
    pub const NUM_HOST_INTERFACES: AttrId = 8;
    /// Number of network interfaces.
    pub const NUM_NETWORK_INTERFACES: AttrId = 9;
    /// Administrative status.
    pub const ADMIN_STATUS: AttrId = 10;
    /// Shutdown request notification handler.
    pub const MODULE_SHUTDOWN_REQUEST_NOTIFY: AttrId = 11;
    /// State change notification handler.
    pub const MODULE_STATE_CHANGE_NOTIFY: AttrId = 12;
    /// Generic notification handler.
    pub const NOTIFY: AttrId = 13;

    /// Unknown operational status.
    pub const OPER_STATUS_UNKNOWN: i32 = 0;
    /// The module is initializing.
    pub const OPER_STATUS_INITIALIZE: i32 = 2;
    /// The module is ready.
    pub const OPER_STATUS_READY: i32 = 7;

    /// Unknown administrative status.
    pub const ADMIN_STATUS_UNKNOWN: i32 = 0;
    /// The module is administratively down.
    pub const ADMIN_STATUS_DOWN: i32 = 1;
    /// The module is administratively up.
    pub const ADMIN_STATUS_UP: i32 = 2;

    pub(super) static OPER_STATUS_ENUM: EnumMetadata = EnumMetadata {
        name: "module-oper-status",
        values: &[
            (OPER_STATUS_UNKNOWN, "unknown"),
            (1, "reset"),
            (OPER_STATUS_INITIALIZE, "initialize"),
            (3, "low-power"),
            (4, "high-power-up"),
            (5, "tx-off"),
            (6, "tx-turn-on"),
            (OPER_STATUS_READY, "ready"),
            (8, "tx-turn-off"),
            (9, "high-power-down"),
            (10, "fault"),
        ],
    };

    pub(super) static ADMIN_STATUS_ENUM: EnumMetadata = EnumMetadata {
        name: "module-admin-status",
        values: &[
            (ADMIN_STATUS_UNKNOWN, "unknown"),
            (ADMIN_STATUS_DOWN, "down"),
            (ADMIN_STATUS_UP, "up"),
        ],
    };
}

/// Network interface attributes.
pub mod network_interface {
    use crate::metadata::{AttrId, EnumMetadata};

    /// Interface index, required at creation.
    pub const INDEX: AttrId = 0;
    /// Transmitter disabled.
    pub const TX_DIS: AttrId = 1;
    /// Transmit laser frequency in Hz.
    pub const TX_LASER_FREQ: AttrId = 2;
    /// Output power in dBm.
    pub const OUTPUT_POWER: AttrId = 3;
    /// Modulation format.
    pub const MODULATION_FORMAT: AttrId = 4;
    /// Transmit channel.
    pub const TX_CHANNEL: AttrId = 5;
    /// Generic notification handler.
    pub const NOTIFY: AttrId = 6;

    /// DP-QPSK modulation.
    pub const MODULATION_FORMAT_DP_QPSK: i32 = 1;

    pub(super) static MODULATION_FORMAT_ENUM: EnumMetadata = EnumMetadata {
        name: "network-interface-modulation-format",
        values: &[
            (0, "unknown"),
            (MODULATION_FORMAT_DP_QPSK, "dp-qpsk"),
            (2, "dp-8-qam"),
            (3, "dp-16-qam"),
        ],
    };
}

/// Host interface attributes.
pub mod host_interface {
    use crate::metadata::{AttrId, EnumMetadata};

    /// Interface index, required at creation.
    pub const INDEX: AttrId = 0;
    /// Forward error correction type.
    pub const FEC_TYPE: AttrId = 1;
    /// Loopback type.
    pub const LOOPBACK_TYPE: AttrId = 2;
    /// Lane fault flags.
    pub const LANE_FAULT: AttrId = 3;
    /// Generic notification handler.
    pub const NOTIFY: AttrId = 4;

    /// No forward error correction.
    pub const FEC_TYPE_NONE: i32 = 0;
    /// Reed-Solomon forward error correction.
    pub const FEC_TYPE_RS: i32 = 1;
    /// Fire-code forward error correction.
    pub const FEC_TYPE_FC: i32 = 2;

    pub(super) static FEC_TYPE_ENUM: EnumMetadata = EnumMetadata {
        name: "host-interface-fec-type",
        values: &[
            (FEC_TYPE_NONE, "none"),
            (FEC_TYPE_RS, "rs"),
            (FEC_TYPE_FC, "fc"),
        ],
    };

    pub(super) static LOOPBACK_TYPE_ENUM: EnumMetadata = EnumMetadata {
        name: "host-interface-loopback-type",
        values: &[(0, "none"), (1, "shallow"), (2, "deep")],
    };
}

type Table = Map<AttrId, AttrMetadata>;

fn table(entries: Vec<AttrMetadata>) -> Table {
    entries.into_iter().map(|meta| (meta.id, meta)).collect()
}

static MODULE: LazyLock<Table> = LazyLock::new(|| {
    use module::*;

    let m = |id, name, short_name, kind, flags| {
        AttrMetadata::new(ObjectType::Module, id, name, short_name, kind, flags)
    };

    table(vec![
        m(
            LOCATION,
            "TAI_MODULE_ATTR_LOCATION",
            "location",
            ValueKind::CharList,
            AttrFlags::MANDATORY_CREATE_ONLY,
        ),
        m(
            VENDOR_NAME,
            "TAI_MODULE_ATTR_VENDOR_NAME",
            "vendor-name",
            ValueKind::CharList,
            AttrFlags::READ_ONLY,
        ),
        m(
            VENDOR_PART_NUMBER,
            "TAI_MODULE_ATTR_VENDOR_PART_NUMBER",
            "vendor-part-number",
            ValueKind::CharList,
            AttrFlags::READ_ONLY,
        ),
        m(
            VENDOR_SERIAL_NUMBER,
            "TAI_MODULE_ATTR_VENDOR_SERIAL_NUMBER",
            "vendor-serial-number",
            ValueKind::CharList,
            AttrFlags::READ_ONLY,
        ),
        m(
            FIRMWARE_VERSIONS,
            "TAI_MODULE_ATTR_FIRMWARE_VERSIONS",
            "firmware-versions",
            ValueKind::FloatList,
            AttrFlags::READ_ONLY,
        ),
        m(
            OPER_STATUS,
            "TAI_MODULE_ATTR_OPER_STATUS",
            "oper-status",
            ValueKind::S32,
            AttrFlags::READ_ONLY,
        )
        .enumeration(&OPER_STATUS_ENUM),
        m(
            TEMP,
            "TAI_MODULE_ATTR_TEMP",
            "temp",
            ValueKind::Float,
            AttrFlags::READ_ONLY,
        ),
        m(
            POWER,
            "TAI_MODULE_ATTR_POWER",
            "power",
            ValueKind::Float,
            AttrFlags::READ_ONLY,
        ),
        m(
            NUM_HOST_INTERFACES,
            "TAI_MODULE_ATTR_NUM_HOST_INTERFACES",
            "num-host-interfaces",
            ValueKind::U32,
            AttrFlags::READ_ONLY,
        ),
        m(
            NUM_NETWORK_INTERFACES,
            "TAI_MODULE_ATTR_NUM_NETWORK_INTERFACES",
            "num-network-interfaces",
            ValueKind::U32,
            AttrFlags::READ_ONLY,
        ),
        m(
            ADMIN_STATUS,
            "TAI_MODULE_ATTR_ADMIN_STATUS",
            "admin-status",
            ValueKind::S32,
            AttrFlags::CLEARABLE,
        )
        .enumeration(&ADMIN_STATUS_ENUM)
        .default_value(ADMIN_STATUS_DOWN),
        m(
            MODULE_SHUTDOWN_REQUEST_NOTIFY,
            "TAI_MODULE_ATTR_MODULE_SHUTDOWN_REQUEST_NOTIFY",
            "module-shutdown-request-notify",
            ValueKind::Notification,
            AttrFlags::NONE,
        )
        .default_value(NotificationHandler::none()),
        m(
            MODULE_STATE_CHANGE_NOTIFY,
            "TAI_MODULE_ATTR_MODULE_STATE_CHANGE_NOTIFY",
            "module-state-change-notify",
            ValueKind::Notification,
            AttrFlags::NONE,
        )
        .default_value(NotificationHandler::none()),
        m(
            NOTIFY,
            "TAI_MODULE_ATTR_NOTIFY",
            "notify",
            ValueKind::Notification,
            AttrFlags::NONE,
        )
        .default_value(NotificationHandler::none()),
    ])
});

static NETWORK_INTERFACE: LazyLock<Table> = LazyLock::new(|| {
    use network_interface::*;

    let n = |id, name, short_name, kind, flags| {
        AttrMetadata::new(
            ObjectType::NetworkInterface,
            id,
            name,
            short_name,
            kind,
            flags,
        )
    };

    table(vec![
        n(
            INDEX,
            "TAI_NETWORK_INTERFACE_ATTR_INDEX",
            "index",
            ValueKind::U32,
            AttrFlags::MANDATORY_CREATE_ONLY,
        ),
        n(
            TX_DIS,
            "TAI_NETWORK_INTERFACE_ATTR_TX_DIS",
            "tx-dis",
            ValueKind::Bool,
            AttrFlags::CLEARABLE,
        )
        .default_value(false),
        n(
            TX_LASER_FREQ,
            "TAI_NETWORK_INTERFACE_ATTR_TX_LASER_FREQ",
            "tx-laser-freq",
            ValueKind::U64,
            AttrFlags::NONE,
        ),
        n(
            OUTPUT_POWER,
            "TAI_NETWORK_INTERFACE_ATTR_OUTPUT_POWER",
            "output-power",
            ValueKind::Float,
            AttrFlags::CLEARABLE,
        )
        .default_value(0.0f32)
        .bounds(-20.0, 5.0),
        n(
            MODULATION_FORMAT,
            "TAI_NETWORK_INTERFACE_ATTR_MODULATION_FORMAT",
            "modulation-format",
            ValueKind::S32,
            AttrFlags::CLEARABLE,
        )
        .enumeration(&MODULATION_FORMAT_ENUM)
        .default_value(MODULATION_FORMAT_DP_QPSK),
        n(
            TX_CHANNEL,
            "TAI_NETWORK_INTERFACE_ATTR_TX_CHANNEL",
            "tx-channel",
            ValueKind::U16,
            AttrFlags::NONE,
        )
        .bounds(1.0, 96.0),
        n(
            NOTIFY,
            "TAI_NETWORK_INTERFACE_ATTR_NOTIFY",
            "notify",
            ValueKind::Notification,
            AttrFlags::NONE,
        )
        .default_value(NotificationHandler::none()),
    ])
});

static HOST_INTERFACE: LazyLock<Table> = LazyLock::new(|| {
    use host_interface::*;

    let h = |id, name, short_name, kind, flags| {
        AttrMetadata::new(ObjectType::HostInterface, id, name, short_name, kind, flags)
    };

    table(vec![
        h(
            INDEX,
            "TAI_HOST_INTERFACE_ATTR_INDEX",
            "index",
            ValueKind::U32,
            AttrFlags::MANDATORY_CREATE_ONLY,
        ),
        h(
            FEC_TYPE,
            "TAI_HOST_INTERFACE_ATTR_FEC_TYPE",
            "fec-type",
            ValueKind::S32,
            AttrFlags::CLEARABLE,
        )
        .enumeration(&FEC_TYPE_ENUM)
        .default_value(FEC_TYPE_NONE),
        h(
            LOOPBACK_TYPE,
            "TAI_HOST_INTERFACE_ATTR_LOOPBACK_TYPE",
            "loopback-type",
            ValueKind::S32,
            AttrFlags::CLEARABLE,
        )
        .enumeration(&LOOPBACK_TYPE_ENUM)
        .default_value(0),
        h(
            LANE_FAULT,
            "TAI_HOST_INTERFACE_ATTR_LANE_FAULT",
            "lane-fault",
            ValueKind::U32List,
            AttrFlags::READ_ONLY,
        ),
        h(
            NOTIFY,
            "TAI_HOST_INTERFACE_ATTR_NOTIFY",
            "notify",
            ValueKind::Notification,
            AttrFlags::NONE,
        )
        .default_value(NotificationHandler::none()),
    ])
});

fn table_of(object_type: ObjectType) -> Option<&'static Table> {
    match object_type {
        ObjectType::Module => Some(&*MODULE),
        ObjectType::NetworkInterface => Some(&*NETWORK_INTERFACE),
        ObjectType::HostInterface => Some(&*HOST_INTERFACE),
        ObjectType::Null => None,
    }
}

/// Looks up the metadata of an attribute.
#[must_use]
pub fn attr_metadata(object_type: ObjectType, id: AttrId) -> Option<&'static AttrMetadata> {
    table_of(object_type).and_then(|table| table.get(&id))
}

/// Looks up the metadata of an attribute by its short name.
#[must_use]
pub fn attr_metadata_by_name(
    object_type: ObjectType,
    short_name: &str,
) -> Option<&'static AttrMetadata> {
    table_of(object_type)
        .and_then(|table| table.values().find(|meta| meta.short_name == short_name))
}

/// Lists the metadata of all attributes of an object type, in identifier
/// order.
pub fn list_metadata(object_type: ObjectType) -> impl Iterator<Item = &'static AttrMetadata> {
    table_of(object_type)
        .into_iter()
        .flat_map(|table| table.values())
}

/// Lists a summary of every supported object type.
#[must_use]
pub fn object_info() -> Vec<ObjectInfo> {
    ObjectType::ALL
        .into_iter()
        .map(|object_type| ObjectInfo {
            object_type,
            name: object_type.to_string(),
            attributes: list_metadata(object_type).count(),
            mandatory: list_metadata(object_type)
                .filter(|meta| meta.is_mandatory_on_create())
                .map(|meta| meta.id)
                .collect(),
        })
        .collect()
}

/// Returns the enumeration names of an attribute, if any.
#[must_use]
pub fn enum_metadata(object_type: ObjectType, id: AttrId) -> Option<&'static EnumMetadata> {
    attr_metadata(object_type, id).and_then(|meta| meta.enum_metadata)
}

#[cfg(test)]
mod tests {
    use crate::object::ObjectType;
    use crate::value::{AttributeValue, ValueKind};

    use super::{
        attr_metadata, attr_metadata_by_name, enum_metadata, host_interface, list_metadata,
        module, network_interface, object_info,
    };

    #[test]
    fn module_table() {
        let location = attr_metadata(ObjectType::Module, module::LOCATION).unwrap();
        assert!(location.is_mandatory_on_create());
        assert!(location.is_create_only());
        assert_eq!(location.kind, ValueKind::CharList);

        let admin = attr_metadata(ObjectType::Module, module::ADMIN_STATUS).unwrap();
        assert_eq!(
            admin.default,
            Some(AttributeValue::S32(module::ADMIN_STATUS_DOWN))
        );
        assert_eq!(
            enum_metadata(ObjectType::Module, module::ADMIN_STATUS)
                .and_then(|e| e.value_of("up")),
            Some(module::ADMIN_STATUS_UP)
        );

        let ids: Vec<_> = list_metadata(ObjectType::Module).map(|m| m.id).collect();
        assert_eq!(ids.first(), Some(&module::LOCATION));
        assert_eq!(ids.last(), Some(&module::NOTIFY));
    }

    #[test]
    fn lookup_misses() {
        assert!(attr_metadata(ObjectType::Null, 0).is_none());
        assert!(attr_metadata(ObjectType::HostInterface, 0xFFFF).is_none());
        assert_eq!(list_metadata(ObjectType::Null).count(), 0);
    }

    #[test]
    fn lookup_by_name() {
        let meta = attr_metadata_by_name(ObjectType::NetworkInterface, "tx-dis").unwrap();
        assert_eq!(meta.id, network_interface::TX_DIS);
        assert_eq!(meta.object_type, ObjectType::NetworkInterface);

        let meta = attr_metadata_by_name(ObjectType::HostInterface, "fec-type").unwrap();
        assert_eq!(meta.id, host_interface::FEC_TYPE);
    }

    #[test]
    fn object_summaries() {
        let info = object_info();
        assert_eq!(info.len(), 3);
        assert_eq!(info[0].object_type, ObjectType::Module);
        assert_eq!(info[0].mandatory, vec![module::LOCATION]);
        assert_eq!(info[2].name, "network-interface");
    }
}
