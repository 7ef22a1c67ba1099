// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use vmcfg_types::{Architecture, Target};

use crate::codec::{self, Document, Field};

/// CPU model name meaning "whatever QEMU picks for the target".
pub const DEFAULT_CPU: &str = "default";

/// Emulated machine and resource sizing. The architecture is fixed when
/// the VM is created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct System {
    pub architecture: Architecture,
    pub target: Target,
    pub cpu: String,
    pub cpu_flags_add: Vec<String>,
    pub cpu_flags_remove: Vec<String>,

    /// Zero lets QEMU match the host core count.
    pub cpu_count: u32,

    /// Use multiple TCG threads even where QEMU thinks it unsafe.
    pub force_multicore: bool,

    /// Guest RAM in MiB.
    pub memory_size: u32,

    /// TCG translation cache in MiB, zero for QEMU's default.
    pub jit_cache_size: u32,
}

impl Default for System {
    fn default() -> Self {
        let arch = Architecture::X86_64;
        Self::new(arch, arch.default_target())
    }
}

impl System {
    pub fn new(architecture: Architecture, target: Target) -> Self {
        Self {
            architecture,
            target,
            cpu: DEFAULT_CPU.to_owned(),
            cpu_flags_add: Vec::new(),
            cpu_flags_remove: Vec::new(),
            cpu_count: 0,
            force_multicore: false,
            memory_size: Self::default_memory_size(architecture),
            jit_cache_size: 0,
        }
    }

    pub fn default_memory_size(arch: Architecture) -> u32 {
        match arch {
            Architecture::X86_64 | Architecture::Aarch64 => 4096,
            _ => 512,
        }
    }
}

type F = Field<System>;

impl Document for System {
    const NAME: &'static str = "System";

    const FIELDS: &'static [Field<Self>] = &[
        F::required(
            "Architecture",
            |s| codec::text(&s.architecture),
            |s, v| {
                s.architecture = codec::parsed(v)?;
                Ok(())
            },
        ),
        F::required(
            "Target",
            |s| codec::text(&s.target),
            |s, v| {
                s.target = codec::parsed(v)?;
                Ok(())
            },
        ),
        F::required(
            "CPU",
            |s| s.cpu.clone().into(),
            |s, v| {
                s.cpu = codec::string(v)?;
                Ok(())
            },
        ),
        F::required(
            "CPUFlagsAdd",
            |s| codec::texts(&s.cpu_flags_add),
            |s, v| {
                s.cpu_flags_add = codec::list(v, codec::string)?;
                Ok(())
            },
        ),
        F::required(
            "CPUFlagsRemove",
            |s| codec::texts(&s.cpu_flags_remove),
            |s, v| {
                s.cpu_flags_remove = codec::list(v, codec::string)?;
                Ok(())
            },
        ),
        F::required(
            "CPUCount",
            |s| i64::from(s.cpu_count).into(),
            |s, v| {
                s.cpu_count = codec::bounded(v)?;
                Ok(())
            },
        ),
        F::required(
            "ForceMulticore",
            |s| s.force_multicore.into(),
            |s, v| {
                s.force_multicore = codec::boolean(v)?;
                Ok(())
            },
        ),
        F::required(
            "MemorySize",
            |s| i64::from(s.memory_size).into(),
            |s, v| {
                s.memory_size = codec::bounded(v)?;
                Ok(())
            },
        ),
        F::required(
            "JITCacheSize",
            |s| i64::from(s.jit_cache_size).into(),
            |s, v| {
                s.jit_cache_size = codec::bounded(v)?;
                Ok(())
            },
        ),
    ];
}
