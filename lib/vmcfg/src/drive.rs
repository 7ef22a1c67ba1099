// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};

use uuid::Uuid;
use vmcfg_types::{Architecture, DriveInterface, ImageType, Target};

use crate::codec::{self, Document, Field, Value};

/// Directory inside the VM bundle holding drive images.
pub const DATA_DIR: &str = "Data";

/// Image name reserved for the UEFI variable store.
pub const EFI_VARIABLES_NAME: &str = "efi_vars.fd";

/// A drive attached to the VM. The position of a drive in
/// [`crate::Configuration::drives`] is its boot order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Drive {
    pub id: Uuid,

    /// File name of the backing image inside the bundle's data directory.
    /// Removable drives have none; their media is supplied at run time.
    pub image_name: Option<String>,

    pub image_type: ImageType,

    pub interface: DriveInterface,

    pub is_removable: bool,

    pub is_read_only: bool,

    /// A raw image cannot be snapshotted and does not grow on demand.
    pub is_raw_image: bool,

    /// Size of a newly created image in MiB. Only meaningful when the
    /// drive is not removable. Not range checked here; see
    /// [`Drive::clamp_size`].
    pub size_mib: i64,
}

impl Default for Drive {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4(),
            image_name: None,
            image_type: ImageType::None,
            interface: DriveInterface::None,
            is_removable: false,
            is_read_only: false,
            is_raw_image: false,
            size_mib: Self::DEFAULT_SIZE_MIB,
        }
    }
}

impl Drive {
    pub const DEFAULT_SIZE_MIB: i64 = 10240;
    pub const MIN_SIZE_MIB: i64 = 1;

    /// A new drive with defaults for the given machine.
    pub fn new(arch: Architecture, target: &Target, removable: bool) -> Self {
        let mut drive = Self::default();
        drive.reset(arch, target, removable);
        drive
    }

    /// The UEFI variable store for a machine booting through UEFI.
    pub fn efi_variables() -> Self {
        Self {
            image_name: Some(EFI_VARIABLES_NAME.to_owned()),
            image_type: ImageType::EfiVariables,
            interface: DriveInterface::PFlash,
            is_raw_image: true,
            ..Self::default()
        }
    }

    /// Restores every setting except the identifier to the defaults for
    /// the given machine. Removable drives default to CD media.
    pub fn reset(
        &mut self,
        arch: Architecture,
        target: &Target,
        removable: bool,
    ) {
        let image_type = if removable { ImageType::Cd } else { ImageType::Disk };
        *self = Self {
            id: self.id,
            image_name: None,
            image_type,
            interface: Self::default_interface(arch, target, image_type),
            is_removable: removable,
            is_read_only: removable,
            is_raw_image: false,
            size_mib: Self::DEFAULT_SIZE_MIB,
        };
    }

    /// The bus a guest of this machine most likely has a driver for.
    pub fn default_interface(
        arch: Architecture,
        target: &Target,
        image_type: ImageType,
    ) -> DriveInterface {
        use Architecture::*;

        match image_type {
            ImageType::EfiVariables => return DriveInterface::PFlash,
            t if !t.is_attached() => return DriveInterface::None,
            _ => {}
        }
        let cd = image_type == ImageType::Cd;

        if target.is_virt_family() {
            if cd {
                DriveInterface::Usb
            } else {
                DriveInterface::VirtIo
            }
        } else if target.is_pc_family() {
            DriveInterface::Ide
        } else {
            match arch {
                Sparc | Sparc64 | M68k => DriveInterface::Scsi,
                S390x => DriveInterface::VirtIo,
                Ppc | Ppc64 if target.as_str() == "pseries" => {
                    DriveInterface::Scsi
                }
                _ => DriveInterface::Ide,
            }
        }
    }

    /// Raises the creation size to the smallest allowed value.
    pub fn clamp_size(&mut self) {
        if self.size_mib < Self::MIN_SIZE_MIB {
            self.size_mib = Self::MIN_SIZE_MIB;
        }
    }

    pub fn is_efi_variables(&self) -> bool {
        self.image_type == ImageType::EfiVariables
            || self.image_name.as_deref() == Some(EFI_VARIABLES_NAME)
    }

    /// Full path of the backing image within the bundle at `base`.
    pub fn image_path(&self, base: &Path) -> Option<PathBuf> {
        self.image_name.as_ref().map(|name| base.join(DATA_DIR).join(name))
    }
}

type F = Field<Drive>;

impl Document for Drive {
    const NAME: &'static str = "Drive";

    const FIELDS: &'static [Field<Self>] = &[
        F::required(
            "Identifier",
            |d| codec::text(&d.id),
            |d, v| {
                d.id = codec::parsed(v)?;
                Ok(())
            },
        ),
        F::required(
            "ImageType",
            |d| codec::text(&d.image_type),
            |d, v| {
                d.image_type = codec::parsed(v)?;
                Ok(())
            },
        ),
        F::required(
            "Interface",
            |d| codec::text(&d.interface),
            |d, v| {
                d.interface = codec::parsed(v)?;
                Ok(())
            },
        ),
        F::required(
            "Removable",
            |d| d.is_removable.into(),
            |d, v| {
                d.is_removable = codec::boolean(v)?;
                Ok(())
            },
        ),
        F::required(
            "ReadOnly",
            |d| d.is_read_only.into(),
            |d, v| {
                d.is_read_only = codec::boolean(v)?;
                Ok(())
            },
        ),
        F::required(
            "RawImage",
            |d| d.is_raw_image.into(),
            |d, v| {
                d.is_raw_image = codec::boolean(v)?;
                Ok(())
            },
        ),
        F::optional(
            "Size",
            |d| (!d.is_removable).then(|| Value::Integer(d.size_mib)),
            |d, v| {
                d.size_mib = codec::integer(v)?;
                Ok(())
            },
        ),
        F::optional(
            "ImageName",
            |d| d.image_name.clone().map(Value::from),
            |d, v| {
                d.image_name = Some(codec::string(v)?);
                Ok(())
            },
        ),
    ];
}
