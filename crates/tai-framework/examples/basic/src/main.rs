use std::time::{Duration, Instant};

use clap::Parser;

use tracing::info;

use tai::attribute::{AllocInfo, Attribute};
use tai::catalog::{self, host_interface, module, network_interface};
use tai::object::ObjectType;
use tai::serialize::{SerializeOptions, serialize_attribute};
use tai::value::NotificationHandler;

use tai_framework::adapters::basic::{Basic, BasicConfig};
use tai_framework::error::{Error, ErrorKind, Result};
use tai_framework::fsm::FsmState;
use tai_framework::platform::{Platform, Services};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Location of the transponder to bring up.
    #[arg(short, long, default_value = "0")]
    location: String,

    /// Number of host interfaces per transponder.
    #[arg(long, default_value_t = 2)]
    host_interfaces: u32,

    /// Polling interval of the state machine, in milliseconds.
    #[arg(short, long, default_value_t = 200)]
    poll_interval: u64,

    /// Seconds to wait for the transponder to become ready.
    #[arg(short, long, default_value_t = 5)]
    timeout: u64,
}

fn dump(platform: &Platform<Basic>, id: tai::object::ObjectId, object_type: ObjectType) {
    let options = SerializeOptions::new().human(true);
    for meta in catalog::list_metadata(object_type) {
        let Ok(mut attr) = Attribute::alloc(meta, AllocInfo::Default) else {
            continue;
        };
        if platform
            .get_attributes(id, std::slice::from_mut(&mut attr))
            .is_err()
        {
            continue;
        }
        if let Ok(line) = serialize_attribute(meta, &attr, options) {
            info!("  {line}");
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    let cli = Cli::parse();

    let config = BasicConfig::new()
        .num_host_interfaces(cli.host_interfaces)
        .poll_interval(Duration::from_millis(cli.poll_interval));
    let services = Services::new().device_presence(|present, location| {
        info!("Transponder at {location} present: {present}");
    });
    let platform = Platform::new(Basic::new(config), services);

    let root = platform.device_presence(true, &cli.location)?;
    platform.subscribe(
        root,
        module::NOTIFY,
        NotificationHandler::new(|id, attrs| {
            for attr in attrs {
                info!("Notification from {id}: {} = {:?}", attr.id, attr.value);
            }
        }),
    )?;

    let mut children = vec![platform.create(
        ObjectType::NetworkInterface,
        Some(root),
        &[Attribute::new(network_interface::INDEX, 0u32)],
    )?];
    for index in 0..cli.host_interfaces {
        children.push(platform.create(
            ObjectType::HostInterface,
            Some(root),
            &[Attribute::new(host_interface::INDEX, index)],
        )?);
    }

    platform.set_attributes(
        root,
        &[Attribute::new(module::ADMIN_STATUS, module::ADMIN_STATUS_UP)],
    )?;

    let fsm = platform
        .fsm(&cli.location)
        .ok_or_else(|| Error::new(ErrorKind::NotFound, "Missing state machine"))?;
    let deadline = Instant::now() + Duration::from_secs(cli.timeout);
    while fsm.state() != FsmState::READY {
        if Instant::now() > deadline {
            return Err(Error::new(
                ErrorKind::Failure,
                format!("Transponder stuck in {}", fsm.state()),
            ));
        }
        std::thread::sleep(Duration::from_millis(cli.poll_interval));
    }

    info!("Transponder {root} is ready");
    dump(&platform, root, ObjectType::Module);
    for child in &children {
        info!("Object {child}");
        dump(&platform, *child, platform.get_object_type(*child));
    }

    platform.device_presence(false, &cli.location)?;
    Ok(())
}
