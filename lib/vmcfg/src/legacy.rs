// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Conversion from the flat configuration format used before version 4.
//!
//! The old format kept every setting as a top-level key. Conversion is
//! total: a key that is missing or holds an unrecognised value maps to the
//! zero value or to the derived default, never to an error.

use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;
use uuid::Uuid;
use vmcfg_types::{
    Architecture, DriveInterface, ImageType, MacAddress, NetworkMode,
    NetworkProtocol, QemuArgument, Target,
};

use crate::config::{Configuration, Information};
use crate::drive::Drive;
use crate::network::{Network, PortForward};
use crate::qemu::QemuTweaks;
use crate::system::{System, DEFAULT_CPU};

/// Name given to migrated VMs that never had one.
pub const DEFAULT_NAME: &str = "Virtual Machine";

/// A configuration in the pre-version-4 flat format.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct LegacyConfiguration {
    pub name: Option<String>,

    pub debug_log_enabled: bool,
    pub system_boot_uefi: bool,
    pub system_rng_enabled: bool,
    pub use_hypervisor: bool,
    pub rtc_use_local_time: bool,
    pub force_ps2_controller: bool,
    pub system_machine_properties: Option<String>,
    pub system_arguments: Option<Vec<String>>,

    pub system_architecture: Option<String>,
    pub system_target: Option<String>,
    pub system_cpu: Option<String>,
    pub system_cpu_count: Option<i64>,
    pub system_memory: Option<i64>,
    pub system_jit_cache_size: Option<i64>,
    pub system_force_multicore: bool,

    pub drives: Option<Vec<LegacyDrive>>,

    pub network_enabled: bool,
    pub network_mode: Option<String>,
    pub network_card: Option<String>,
    pub network_card_mac: Option<String>,
    pub network_port_forward: Option<Vec<LegacyPortForward>>,

    /// Where the configuration was loaded from. Supplied by the loader.
    #[serde(skip)]
    pub existing_path: Option<PathBuf>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct LegacyDrive {
    pub image_path: Option<String>,
    pub image_type: Option<String>,
    pub interface_type: Option<String>,
    pub removable: bool,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct LegacyPortForward {
    pub protocol: Option<String>,
    pub guest_address: Option<String>,
    pub guest_port: Option<i64>,
    pub host_address: Option<String>,
    pub host_port: Option<i64>,
}

impl LegacyConfiguration {
    pub fn architecture(&self) -> Architecture {
        self.system_architecture
            .as_deref()
            .and_then(|raw| Architecture::from_str(raw).ok())
            .unwrap_or(Architecture::X86_64)
    }

    pub fn target(&self) -> Target {
        self.system_target
            .as_deref()
            .and_then(|raw| Target::new(raw).ok())
            .unwrap_or_else(|| self.architecture().default_target())
    }
}

impl From<&LegacyConfiguration> for QemuTweaks {
    fn from(old: &LegacyConfiguration) -> Self {
        Self {
            base_path: old.existing_path.clone(),
            has_debug_log: old.debug_log_enabled,
            has_uefi_boot: old.system_boot_uefi,
            has_rng_device: old.system_rng_enabled,
            has_hypervisor: old.use_hypervisor,
            has_rtc_local_time: old.rtc_use_local_time,
            has_ps2_controller: old.force_ps2_controller,
            machine_property_override: old.system_machine_properties.clone(),
            additional_arguments: old
                .system_arguments
                .iter()
                .flatten()
                .map(|arg| QemuArgument::from(arg.as_str()))
                .collect(),
            ..Self::default()
        }
    }
}

impl From<&LegacyConfiguration> for System {
    fn from(old: &LegacyConfiguration) -> Self {
        let size = |raw: Option<i64>, default: u32| {
            raw.and_then(|v| u32::try_from(v).ok()).unwrap_or(default)
        };

        let arch = old.architecture();
        let mut system = System::new(arch, old.target());
        system.cpu =
            old.system_cpu.clone().unwrap_or_else(|| DEFAULT_CPU.to_owned());
        system.cpu_count = size(old.system_cpu_count, 0);
        system.memory_size = size(old.system_memory, system.memory_size);
        system.jit_cache_size = size(old.system_jit_cache_size, 0);
        system.force_multicore = old.system_force_multicore;
        system
    }
}

fn legacy_image_type(raw: &str) -> ImageType {
    match raw.to_ascii_lowercase().as_str() {
        "disk" => ImageType::Disk,
        "cd" | "cdrom" => ImageType::Cd,
        "bios" => ImageType::Bios,
        "kernel" => ImageType::LinuxKernel,
        "initrd" => ImageType::LinuxInitrd,
        "dtb" => ImageType::LinuxDtb,
        other => ImageType::from_str(other).unwrap_or(ImageType::Disk),
    }
}

impl Drive {
    /// Converts an old drive entry for a machine of `arch`/`target`.
    pub fn migrating(
        old: &LegacyDrive,
        arch: Architecture,
        target: &Target,
    ) -> Self {
        let image_type = old
            .image_type
            .as_deref()
            .map(legacy_image_type)
            .unwrap_or(ImageType::Disk);
        let interface = old
            .interface_type
            .as_deref()
            .and_then(|raw| DriveInterface::from_str(raw).ok())
            .unwrap_or_else(|| Drive::default_interface(arch, target, image_type));
        let image_name = if old.removable { None } else { old.image_path.clone() };
        let is_raw_image = image_name
            .as_deref()
            .is_some_and(|name| name.ends_with(".img") || name.ends_with(".raw"));

        Self {
            image_name,
            image_type,
            interface,
            is_removable: old.removable,
            is_read_only: old.removable || image_type == ImageType::Cd,
            is_raw_image,
            ..Self::default()
        }
    }
}

impl PortForward {
    /// Old entries without two valid ports cannot be expressed and yield
    /// `None`.
    pub fn migrating(old: &LegacyPortForward) -> Option<Self> {
        let address = |raw: &Option<String>| {
            raw.as_deref().and_then(|a| a.parse().ok())
        };
        let port = |raw: Option<i64>| raw.and_then(|p| u16::try_from(p).ok());
        Some(Self {
            protocol: old
                .protocol
                .as_deref()
                .and_then(|p| NetworkProtocol::from_str(p).ok())
                .unwrap_or_default(),
            guest_address: address(&old.guest_address),
            guest_port: port(old.guest_port)?,
            host_address: address(&old.host_address),
            host_port: port(old.host_port)?,
        })
    }
}

impl Network {
    /// The single NIC of an old configuration, if networking was enabled.
    pub fn migrating(old: &LegacyConfiguration) -> Option<Self> {
        if !old.network_enabled {
            return None;
        }
        let arch = old.architecture();
        let target = old.target();

        let mac_address = old
            .network_card_mac
            .as_deref()
            .and_then(|raw| MacAddress::from_str(raw).ok())
            .unwrap_or_else(MacAddress::local_random);

        Some(Self {
            mode: old
                .network_mode
                .as_deref()
                .and_then(|raw| NetworkMode::from_str(raw).ok())
                .unwrap_or_default(),
            hardware: old
                .network_card
                .clone()
                .unwrap_or_else(|| Network::default_hardware(arch, &target).to_owned()),
            mac_address,
            port_forwards: old
                .network_port_forward
                .iter()
                .flatten()
                .filter_map(PortForward::migrating)
                .collect(),
            ..Self::default()
        })
    }
}

impl From<&LegacyConfiguration> for Configuration {
    fn from(old: &LegacyConfiguration) -> Self {
        let system = System::from(old);
        let drives = old
            .drives
            .iter()
            .flatten()
            .map(|d| Drive::migrating(d, system.architecture, &system.target))
            .collect();

        Self {
            base_path: old.existing_path.clone(),
            information: Information {
                name: old.name.clone().unwrap_or_else(|| DEFAULT_NAME.to_owned()),
                uuid: Uuid::new_v4(),
                notes: None,
            },
            qemu: QemuTweaks::from(old),
            drives,
            networks: Network::migrating(old).into_iter().collect(),
            system,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse(raw: &str) -> LegacyConfiguration {
        toml::from_str(raw).unwrap()
    }

    #[test]
    fn tweaks_map_field_by_field() {
        let mut old = parse(
            r#"
DebugLogEnabled = true
SystemBootUefi = false
RtcUseLocalTime = true
UseHypervisor = true
SystemMachineProperties = "highmem=off"
SystemArguments = ["-device", "virtio-gpu-pci"]
"#,
        );
        old.existing_path = Some(PathBuf::from("/vms/old.utm"));

        let t = QemuTweaks::from(&old);
        assert!(t.has_debug_log);
        assert!(!t.has_uefi_boot);
        assert!(t.has_rtc_local_time);
        assert!(t.has_hypervisor);
        assert!(!t.has_rng_device);
        assert!(!t.has_ps2_controller);
        assert!(!t.has_balloon_device);
        assert!(!t.has_tpm_device);
        assert_eq!(t.machine_property_override.as_deref(), Some("highmem=off"));
        let args: Vec<&str> =
            t.additional_arguments.iter().map(QemuArgument::as_str).collect();
        assert_eq!(args, ["-device", "virtio-gpu-pci"]);
        assert_eq!(t.base_path, Some(PathBuf::from("/vms/old.utm")));
    }

    #[test]
    fn absent_arguments_become_empty() {
        let t = QemuTweaks::from(&LegacyConfiguration::default());
        assert!(t.additional_arguments.is_empty());
        assert_eq!(t, QemuTweaks::default());
    }

    #[test]
    fn system_falls_back_to_defaults() {
        let old = parse(
            r#"
SystemArchitecture = "vax"
SystemTarget = "not a target"
SystemMemory = -5
"#,
        );
        let s = System::from(&old);
        assert_eq!(s.architecture, Architecture::X86_64);
        assert_eq!(s.target.as_str(), "q35");
        assert_eq!(s.memory_size, 4096);
        assert_eq!(s.cpu, DEFAULT_CPU);

        let old = parse(
            r#"
SystemArchitecture = "aarch64"
SystemTarget = "virt-5.2"
SystemCpu = "cortex-a72"
SystemCpuCount = 4
SystemMemory = 2048
SystemForceMulticore = true
"#,
        );
        let s = System::from(&old);
        assert_eq!(s.architecture, Architecture::Aarch64);
        assert_eq!(s.target.as_str(), "virt-5.2");
        assert_eq!(s.cpu, "cortex-a72");
        assert_eq!(s.cpu_count, 4);
        assert_eq!(s.memory_size, 2048);
        assert!(s.force_multicore);
    }

    #[test]
    fn drives_keep_order_and_infer_interfaces() {
        let old = parse(
            r#"
SystemArchitecture = "aarch64"
SystemTarget = "virt"

[[Drives]]
ImagePath = "debian.qcow2"
ImageType = "disk"
InterfaceType = "nvme"

[[Drives]]
ImageType = "cd"
Removable = true

[[Drives]]
ImagePath = "firmware.img"
ImageType = "bios"
InterfaceType = "floppy-ish"
"#,
        );
        let config = Configuration::from(&old);
        let d = &config.drives;
        assert_eq!(d.len(), 3);

        assert_eq!(d[0].image_name.as_deref(), Some("debian.qcow2"));
        assert_eq!(d[0].interface, DriveInterface::Nvme);
        assert!(!d[0].is_raw_image);

        assert_eq!(d[1].image_type, ImageType::Cd);
        assert_eq!(d[1].interface, DriveInterface::Usb);
        assert!(d[1].is_removable);
        assert_eq!(d[1].image_name, None);

        assert_eq!(d[2].image_type, ImageType::Bios);
        assert_eq!(d[2].interface, DriveInterface::None);
        assert!(d[2].is_raw_image);
    }

    #[test]
    fn network_only_when_enabled() {
        let old = parse(r#"NetworkMode = "shared""#);
        assert!(Network::migrating(&old).is_none());

        let old = parse(
            r#"
NetworkEnabled = true
NetworkMode = "emulated"
NetworkCardMac = "52:54:00:aa:bb:cc"

[[NetworkPortForward]]
Protocol = "udp"
GuestPort = 53
HostPort = 5353

[[NetworkPortForward]]
GuestPort = 22
"#,
        );
        let n = Network::migrating(&old).unwrap();
        assert_eq!(n.mode, NetworkMode::Emulated);
        assert_eq!(n.hardware, "e1000");
        assert_eq!(n.mac_address.to_string(), "52:54:00:aa:bb:cc");
        assert_eq!(n.port_forwards.len(), 1);
        assert_eq!(n.port_forwards[0].protocol, NetworkProtocol::Udp);

        let old = parse(
            r#"
NetworkEnabled = true
NetworkCardMac = "garbage"
"#,
        );
        let n = Network::migrating(&old).unwrap();
        assert!(n.mac_address.is_locally_administered());
    }

    #[test]
    fn whole_configuration() {
        let mut old = parse(
            r#"
Name = "Old Linux"
DebugLogEnabled = true
NetworkEnabled = true
"#,
        );
        old.existing_path = Some(PathBuf::from("/vms/old.utm"));
        let config = Configuration::from(&old);
        assert_eq!(config.information.name, "Old Linux");
        assert_eq!(config.base_path, old.existing_path);
        assert_eq!(config.qemu.base_path, old.existing_path);
        assert!(config.qemu.has_debug_log);
        assert_eq!(config.networks.len(), 1);
        assert!(config.drives.is_empty());

        let unnamed = Configuration::from(&LegacyConfiguration::default());
        assert_eq!(unnamed.information.name, DEFAULT_NAME);
        assert!(unnamed.networks.is_empty());
    }
}
