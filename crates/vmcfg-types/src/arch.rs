// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt::Display;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::ParseError;

/// A CPU family QEMU can emulate. The string form is the suffix of the
/// matching `qemu-system-*` binary.
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::EnumString,
    strum::Display,
    strum::EnumIter,
    strum::IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Architecture {
    Alpha,
    Arm,
    Aarch64,
    Avr,
    Cris,
    Hppa,
    I386,
    Loongarch64,
    M68k,
    Microblaze,
    Microblazeel,
    Mips,
    Mipsel,
    Mips64,
    Mips64el,
    Or1k,
    Ppc,
    Ppc64,
    Riscv32,
    Riscv64,
    Rx,
    S390x,
    Sh4,
    Sh4eb,
    Sparc,
    Sparc64,
    Tricore,
    X86_64,
    Xtensa,
    Xtensaeb,
}

impl Architecture {
    /// Human readable name, suitable for a picker.
    pub fn pretty_name(&self) -> &'static str {
        match self {
            Self::Alpha => "Alpha",
            Self::Arm => "ARM (aarch32)",
            Self::Aarch64 => "ARM64 (aarch64)",
            Self::Avr => "AVR",
            Self::Cris => "CRIS",
            Self::Hppa => "HPPA",
            Self::I386 => "i386 (x86)",
            Self::Loongarch64 => "LoongArch64",
            Self::M68k => "m68k",
            Self::Microblaze => "Microblaze",
            Self::Microblazeel => "Microblaze (Little Endian)",
            Self::Mips => "MIPS",
            Self::Mipsel => "MIPS (Little Endian)",
            Self::Mips64 => "MIPS64",
            Self::Mips64el => "MIPS64 (Little Endian)",
            Self::Or1k => "OpenRISC",
            Self::Ppc => "PowerPC",
            Self::Ppc64 => "PowerPC64",
            Self::Riscv32 => "RISC-V32",
            Self::Riscv64 => "RISC-V64",
            Self::Rx => "RX",
            Self::S390x => "S390x (zSeries)",
            Self::Sh4 => "SH4",
            Self::Sh4eb => "SH4 (Big Endian)",
            Self::Sparc => "SPARC",
            Self::Sparc64 => "SPARC64",
            Self::Tricore => "TriCore",
            Self::X86_64 => "x86_64",
            Self::Xtensa => "Xtensa",
            Self::Xtensaeb => "Xtensa (Big Endian)",
        }
    }

    /// The architecture of the machine this code was built for, if QEMU
    /// knows how to emulate it.
    pub fn host() -> Option<Self> {
        let little = cfg!(target_endian = "little");
        match std::env::consts::ARCH {
            "x86" => Some(Self::I386),
            "x86_64" => Some(Self::X86_64),
            "arm" => Some(Self::Arm),
            "aarch64" => Some(Self::Aarch64),
            "loongarch64" => Some(Self::Loongarch64),
            "m68k" => Some(Self::M68k),
            "mips" if little => Some(Self::Mipsel),
            "mips" => Some(Self::Mips),
            "mips64" if little => Some(Self::Mips64el),
            "mips64" => Some(Self::Mips64),
            "powerpc" => Some(Self::Ppc),
            "powerpc64" => Some(Self::Ppc64),
            "riscv32" => Some(Self::Riscv32),
            "riscv64" => Some(Self::Riscv64),
            "s390x" => Some(Self::S390x),
            "sparc" => Some(Self::Sparc),
            "sparc64" => Some(Self::Sparc64),
            _ => None,
        }
    }

    /// The machine type a fresh VM of this architecture starts with.
    pub fn default_target(&self) -> Target {
        let raw = match self {
            Self::Alpha => "clipper",
            Self::Arm | Self::Aarch64 => "virt",
            Self::Avr => "mega",
            Self::Cris => "axis-dev88",
            Self::Hppa => "hppa",
            Self::I386 | Self::X86_64 => "q35",
            Self::Loongarch64 => "virt",
            Self::M68k => "q800",
            Self::Microblaze | Self::Microblazeel => "petalogix-s3adsp1800",
            Self::Mips | Self::Mipsel | Self::Mips64 | Self::Mips64el => {
                "malta"
            }
            Self::Or1k => "or1k-sim",
            Self::Ppc => "mac99",
            Self::Ppc64 => "pseries",
            Self::Riscv32 | Self::Riscv64 => "virt",
            Self::Rx => "gdbsim-r5f562n8",
            Self::S390x => "s390-ccw-virtio",
            Self::Sh4 | Self::Sh4eb => "r2d",
            Self::Sparc => "SS-5",
            Self::Sparc64 => "sun4u",
            Self::Tricore => "tricore_testboard",
            Self::Xtensa | Self::Xtensaeb => "sim",
        };
        Target(raw.to_owned())
    }
}

/// A QEMU machine type (`-machine <target>`), e.g. `q35`, `pc-i440fx-7.2`
/// or `virt-8.0`.
///
/// The set of targets depends on the architecture and on the QEMU build, so
/// this is kept open: any identifier made of ASCII alphanumerics, `-`, `.`
/// and `_` is accepted.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Target(String);

impl Target {
    pub fn new<S: Into<String>>(raw: S) -> Result<Self, ParseError> {
        let raw = raw.into();
        let valid = !raw.is_empty()
            && raw
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b"-._".contains(&b));
        if valid {
            Ok(Self(raw))
        } else {
            Err(ParseError::InvalidTarget(raw))
        }
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Legacy (`pc*`) and modern (`q35*`) x86 chipsets.
    pub fn is_pc_family(&self) -> bool {
        self.0.starts_with("pc") || self.0.starts_with("q35")
    }

    /// The generic `virt` board, optionally pinned to a QEMU version.
    pub fn is_virt_family(&self) -> bool {
        self.0 == "virt" || self.0.starts_with("virt-")
    }
}

impl FromStr for Target {
    type Err = ParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Target {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'d> Deserialize<'d> for Target {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'d>,
    {
        let s = String::deserialize(deserializer)?;
        Target::new(s).map_err(de::Error::custom)
    }
}
