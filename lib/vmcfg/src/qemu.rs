// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Tweaks and advanced QEMU settings.

use std::path::{Path, PathBuf};

use vmcfg_types::{Architecture, QemuArgument, Target};

use crate::codec::{self, Document, Field, Value};
use crate::host::HostCapabilities;

/// File in the VM bundle receiving QEMU's output when debug logging is on.
pub const DEBUG_LOG_NAME: &str = "debug.log";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QemuTweaks {
    /// Location of the VM bundle. Not persisted.
    pub base_path: Option<PathBuf>,

    /// Write QEMU's standard output to `debug.log` in the bundle.
    pub has_debug_log: bool,

    /// Boot through UEFI firmware on targets that support it.
    pub has_uefi_boot: bool,

    /// Create a virtio-rng device.
    pub has_rng_device: bool,

    /// Create a virtio-balloon device.
    pub has_balloon_device: bool,

    /// Create a vTPM device with an emulated backend.
    pub has_tpm_device: bool,

    /// Run on the host hypervisor instead of TCG.
    pub has_hypervisor: bool,

    /// Keep the guest RTC in local time rather than UTC.
    pub has_rtc_local_time: bool,

    /// Emulate a PS/2 controller instead of relying on USB input.
    pub has_ps2_controller: bool,

    /// Replaces the machine properties that would otherwise be generated.
    pub machine_property_override: Option<String>,

    pub additional_arguments: Vec<QemuArgument>,
}

impl QemuTweaks {
    /// Tweaks for a freshly created VM.
    pub fn for_architecture(
        arch: Architecture,
        target: &Target,
        host: &HostCapabilities,
    ) -> Self {
        let mut tweaks = Self::default();

        let generic_arm = matches!(arch, Architecture::Arm | Architecture::Aarch64)
            && target.is_virt_family();
        if target.is_pc_family() || generic_arm {
            tweaks.has_uefi_boot = true;
            tweaks.has_rng_device = true;
        }

        tweaks.has_hypervisor = host.accelerates(arch);
        tweaks
    }

    /// Where QEMU output is captured, if debug logging is on and the
    /// bundle location is known.
    pub fn debug_log_path(&self) -> Option<PathBuf> {
        if !self.has_debug_log {
            return None;
        }
        self.base_path.as_ref().map(|base| base.join(DEBUG_LOG_NAME))
    }
}

type F = Field<QemuTweaks>;

impl Document for QemuTweaks {
    const NAME: &'static str = "QEMU";

    const FIELDS: &'static [Field<Self>] = &[
        F::required(
            "DebugLog",
            |t| t.has_debug_log.into(),
            |t, v| {
                t.has_debug_log = codec::boolean(v)?;
                Ok(())
            },
        ),
        F::required(
            "UEFIBoot",
            |t| t.has_uefi_boot.into(),
            |t, v| {
                t.has_uefi_boot = codec::boolean(v)?;
                Ok(())
            },
        ),
        F::required(
            "RNGDevice",
            |t| t.has_rng_device.into(),
            |t, v| {
                t.has_rng_device = codec::boolean(v)?;
                Ok(())
            },
        ),
        F::required(
            "BalloonDevice",
            |t| t.has_balloon_device.into(),
            |t, v| {
                t.has_balloon_device = codec::boolean(v)?;
                Ok(())
            },
        ),
        F::required(
            "TPMDevice",
            |t| t.has_tpm_device.into(),
            |t, v| {
                t.has_tpm_device = codec::boolean(v)?;
                Ok(())
            },
        ),
        F::required(
            "Hypervisor",
            |t| t.has_hypervisor.into(),
            |t, v| {
                t.has_hypervisor = codec::boolean(v)?;
                Ok(())
            },
        ),
        F::required(
            "RTCLocalTime",
            |t| t.has_rtc_local_time.into(),
            |t, v| {
                t.has_rtc_local_time = codec::boolean(v)?;
                Ok(())
            },
        ),
        F::required(
            "PS2Controller",
            |t| t.has_ps2_controller.into(),
            |t, v| {
                t.has_ps2_controller = codec::boolean(v)?;
                Ok(())
            },
        ),
        F::optional(
            "MachinePropertyOverride",
            |t| t.machine_property_override.clone().map(Value::from),
            |t, v| {
                t.machine_property_override = Some(codec::string(v)?);
                Ok(())
            },
        ),
        F::required(
            "AdditionalArguments",
            |t| codec::texts(&t.additional_arguments),
            |t, v| {
                t.additional_arguments =
                    codec::list(v, |v| codec::string(v).map(QemuArgument::from))?;
                Ok(())
            },
        ),
    ];

    fn attach_base_path(&mut self, base: &Path) {
        self.base_path = Some(base.to_owned());
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::codec::{decode, encode, DecodeError, Table};

    fn target(raw: &str) -> Target {
        Target::new(raw).unwrap()
    }

    fn derive(arch: Architecture, raw: &str) -> QemuTweaks {
        QemuTweaks::for_architecture(
            arch,
            &target(raw),
            &HostCapabilities::EMULATION_ONLY,
        )
    }

    #[test]
    fn pc_family_gets_uefi_and_rng() {
        for raw in ["pc", "pc-i440fx-7.2", "pc-q35-8.0", "q35"] {
            for arch in [Architecture::X86_64, Architecture::I386] {
                let t = derive(arch, raw);
                assert!(t.has_uefi_boot, "{arch} {raw}");
                assert!(t.has_rng_device, "{arch} {raw}");
            }
        }
    }

    #[test]
    fn arm_virt_gets_uefi_and_rng() {
        for raw in ["virt", "virt-8.0", "virt-2.12"] {
            for arch in [Architecture::Arm, Architecture::Aarch64] {
                let t = derive(arch, raw);
                assert!(t.has_uefi_boot, "{arch} {raw}");
                assert!(t.has_rng_device, "{arch} {raw}");
            }
        }
    }

    #[test]
    fn other_targets_keep_native_firmware() {
        let cases = [
            (Architecture::X86_64, "isapc"),
            (Architecture::X86_64, "microvm"),
            (Architecture::Riscv64, "virt"),
            (Architecture::Aarch64, "raspi3b"),
            (Architecture::Aarch64, "virtual"),
            (Architecture::Ppc64, "pseries"),
        ];
        for (arch, raw) in cases {
            let t = derive(arch, raw);
            assert!(!t.has_uefi_boot, "{arch} {raw}");
            assert!(!t.has_rng_device, "{arch} {raw}");
        }
    }

    #[test]
    fn derivation_leaves_other_flags_clear() {
        let t = derive(Architecture::X86_64, "q35");
        assert!(!t.has_debug_log);
        assert!(!t.has_balloon_device);
        assert!(!t.has_tpm_device);
        assert!(!t.has_rtc_local_time);
        assert!(!t.has_ps2_controller);
        assert!(!t.has_hypervisor);
        assert_eq!(t.machine_property_override, None);
        assert!(t.additional_arguments.is_empty());
    }

    #[test]
    fn hypervisor_follows_host() {
        let arm_mac = HostCapabilities {
            arch: Some(Architecture::Aarch64),
            hardware_acceleration: true,
            vmnet: true,
        };
        let virt = target("virt");
        assert!(
            QemuTweaks::for_architecture(Architecture::Aarch64, &virt, &arm_mac)
                .has_hypervisor
        );
        assert!(
            !QemuTweaks::for_architecture(Architecture::Arm, &virt, &arm_mac)
                .has_hypervisor
        );

        let x86_only = HostCapabilities {
            arch: Some(Architecture::X86_64),
            hardware_acceleration: true,
            vmnet: false,
        };
        assert!(
            !QemuTweaks::for_architecture(Architecture::Aarch64, &virt, &x86_only)
                .has_hypervisor
        );
        assert!(
            QemuTweaks::for_architecture(
                Architecture::X86_64,
                &target("q35"),
                &x86_only
            )
            .has_hypervisor
        );
    }

    const FULL: &str = r#"
DebugLog = true
UEFIBoot = true
RNGDevice = false
BalloonDevice = true
TPMDevice = false
Hypervisor = true
RTCLocalTime = false
PS2Controller = true
MachinePropertyOverride = "highmem=off"
AdditionalArguments = ["-s", "-S", "-device virtio-gpu-pci"]
"#;

    fn full_table() -> Table {
        toml::from_str(FULL).unwrap()
    }

    #[test]
    fn decode_full_document() {
        let t: QemuTweaks =
            decode(full_table(), Some(Path::new("/vms/linux.bundle")))
                .unwrap();
        assert!(t.has_debug_log);
        assert!(t.has_uefi_boot);
        assert!(!t.has_rng_device);
        assert!(t.has_balloon_device);
        assert!(!t.has_tpm_device);
        assert!(t.has_hypervisor);
        assert!(!t.has_rtc_local_time);
        assert!(t.has_ps2_controller);
        assert_eq!(t.machine_property_override.as_deref(), Some("highmem=off"));
        let args: Vec<&str> =
            t.additional_arguments.iter().map(QemuArgument::as_str).collect();
        assert_eq!(args, ["-s", "-S", "-device virtio-gpu-pci"]);
        assert_eq!(t.base_path, Some(PathBuf::from("/vms/linux.bundle")));
        assert_eq!(
            t.debug_log_path(),
            Some(PathBuf::from("/vms/linux.bundle/debug.log"))
        );
    }

    #[test]
    fn encode_reproduces_document_without_base_path() {
        let t: QemuTweaks =
            decode(full_table(), Some(Path::new("/vms/linux.bundle")))
                .unwrap();
        let encoded = encode(&t);
        assert_eq!(encoded, full_table());

        let text = codec::to_toml_string(&t).unwrap();
        assert!(!text.contains("linux.bundle"));
    }

    #[test]
    fn missing_additional_arguments_is_an_error() {
        let mut table = full_table();
        table.remove("AdditionalArguments");
        match decode::<QemuTweaks>(table, None) {
            Err(DecodeError::MissingField { key, .. }) => {
                assert_eq!(key, "AdditionalArguments")
            }
            other => panic!("unexpected decode result {other:?}"),
        }
    }

    #[test]
    fn every_flag_is_required() {
        for key in [
            "DebugLog",
            "UEFIBoot",
            "RNGDevice",
            "BalloonDevice",
            "TPMDevice",
            "Hypervisor",
            "RTCLocalTime",
            "PS2Controller",
        ] {
            let mut table = full_table();
            table.remove(key);
            assert!(
                matches!(
                    decode::<QemuTweaks>(table, None),
                    Err(DecodeError::MissingField { key: k, .. }) if k == key
                ),
                "{key} should be required"
            );
        }
    }

    #[test]
    fn machine_property_override_is_optional() {
        let mut table = full_table();
        table.remove("MachinePropertyOverride");
        let t: QemuTweaks = decode(table, None).unwrap();
        assert_eq!(t.machine_property_override, None);
        assert_eq!(t.base_path, None);
        assert_eq!(t.debug_log_path(), None);
        assert!(!encode(&t).contains_key("MachinePropertyOverride"));
    }

    #[test]
    fn from_toml_text() {
        let t: QemuTweaks =
            codec::from_toml_str(FULL, Some(Path::new("/b"))).unwrap();
        assert_eq!(t.additional_arguments.len(), 3);
        assert!(codec::from_toml_str::<QemuTweaks>("DebugLog = 1", None)
            .is_err());
    }
}
