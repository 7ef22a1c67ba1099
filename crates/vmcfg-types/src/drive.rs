// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use serde::{Deserialize, Serialize};

/// The guest-visible bus a drive is attached to.
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::EnumString,
    strum::Display,
    strum::EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum DriveInterface {
    #[default]
    None,
    #[serde(rename = "IDE")]
    #[strum(serialize = "IDE")]
    Ide,
    #[serde(rename = "SCSI")]
    #[strum(serialize = "SCSI")]
    Scsi,
    #[serde(rename = "SD")]
    #[strum(serialize = "SD")]
    Sd,
    #[serde(rename = "MTD")]
    #[strum(serialize = "MTD")]
    Mtd,
    Floppy,
    #[serde(rename = "PFlash")]
    #[strum(serialize = "PFlash")]
    PFlash,
    #[serde(rename = "VirtIO")]
    #[strum(serialize = "VirtIO")]
    VirtIo,
    #[serde(rename = "NVMe")]
    #[strum(serialize = "NVMe")]
    Nvme,
    #[serde(rename = "USB")]
    #[strum(serialize = "USB")]
    Usb,
}

/// What a drive image holds, which decides how QEMU is told about it.
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::EnumString,
    strum::Display,
    strum::EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum ImageType {
    #[default]
    None,
    Disk,
    #[serde(rename = "CD")]
    #[strum(serialize = "CD")]
    Cd,
    #[serde(rename = "BIOS")]
    #[strum(serialize = "BIOS")]
    Bios,
    LinuxKernel,
    LinuxInitrd,
    #[serde(rename = "LinuxDTB")]
    #[strum(serialize = "LinuxDTB")]
    LinuxDtb,
    #[serde(rename = "EFIVariables")]
    #[strum(serialize = "EFIVariables")]
    EfiVariables,
}

impl ImageType {
    pub fn pretty_name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Disk => "Disk Image",
            Self::Cd => "CD/DVD (ISO) Image",
            Self::Bios => "BIOS",
            Self::LinuxKernel => "Linux Kernel",
            Self::LinuxInitrd => "Linux RAM Disk",
            Self::LinuxDtb => "Linux Device Tree Binary",
            Self::EfiVariables => "EFI Variables",
        }
    }

    /// Disk and CD images are attached to a guest bus; everything else is
    /// handed to QEMU or the firmware directly.
    pub fn is_attached(&self) -> bool {
        matches!(self, Self::Disk | Self::Cd)
    }
}
