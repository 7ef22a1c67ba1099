// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! What the machine running the VM can offer it.

use std::path::Path;

use vmcfg_types::Architecture;

/// Host facts consulted when deriving defaults.
///
/// Derivation takes this as an argument rather than probing the host
/// itself, so defaults for any host can be computed anywhere.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HostCapabilities {
    /// Native CPU architecture, if QEMU can emulate it.
    pub arch: Option<Architecture>,

    /// The OS offers a hypervisor (HVF, KVM) for guests of `arch`.
    pub hardware_acceleration: bool,

    /// Shared, host-only and bridged networking through vmnet.
    pub vmnet: bool,
}

impl HostCapabilities {
    /// A host that can only run guests under TCG with user-mode networking.
    pub const EMULATION_ONLY: Self =
        Self { arch: None, hardware_acceleration: false, vmnet: false };

    /// Probes the executing machine.
    pub fn detect() -> Self {
        let arch = Architecture::host();
        let hardware_acceleration = if cfg!(target_os = "macos") {
            matches!(arch, Some(Architecture::X86_64 | Architecture::Aarch64))
        } else if cfg!(target_os = "linux") {
            Path::new("/dev/kvm").exists()
        } else {
            false
        };
        let vmnet = cfg!(target_os = "macos");

        Self { arch, hardware_acceleration, vmnet }
    }

    /// Whether a guest of `arch` can run on the host hypervisor instead of
    /// being emulated.
    pub fn accelerates(&self, arch: Architecture) -> bool {
        self.hardware_acceleration && self.arch == Some(arch)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn acceleration_requires_matching_arch() {
        let host = HostCapabilities {
            arch: Some(Architecture::X86_64),
            hardware_acceleration: true,
            vmnet: false,
        };
        assert!(host.accelerates(Architecture::X86_64));
        assert!(!host.accelerates(Architecture::Aarch64));
        assert!(!host.accelerates(Architecture::I386));

        let no_hv = HostCapabilities { hardware_acceleration: false, ..host };
        assert!(!no_hv.accelerates(Architecture::X86_64));

        assert!(!HostCapabilities::EMULATION_ONLY
            .accelerates(Architecture::X86_64));
    }

    #[test]
    fn detect_reports_build_arch() {
        let host = HostCapabilities::detect();
        assert_eq!(host.arch, Architecture::host());
        assert_eq!(host.vmnet, cfg!(target_os = "macos"));
    }
}
