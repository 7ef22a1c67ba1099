// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The top-level VM configuration and its bundle storage.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use slog::{debug, info, Logger};
use uuid::Uuid;
use vmcfg_types::{Architecture, Target};

use crate::codec::{self, Document, Field, FieldError, Table, Value};
use crate::drive::Drive;
use crate::host::HostCapabilities;
use crate::legacy::LegacyConfiguration;
use crate::network::Network;
use crate::order;
use crate::qemu::QemuTweaks;
use crate::system::System;
use crate::ConfigError;

/// Version written by this crate. Older numbers denote the flat legacy
/// format.
pub const CURRENT_VERSION: i64 = 4;

pub const VERSION_KEY: &str = "ConfigurationVersion";

/// Name of the configuration file inside a VM bundle.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Name a legacy file is kept under after its bundle is upgraded.
pub const LEGACY_BACKUP_NAME: &str = "config.toml.legacy";

/// Which on-disk layout a configuration was read from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocumentFormat {
    Legacy,
    Current,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Information {
    pub name: String,
    pub uuid: Uuid,
    pub notes: Option<String>,
}

impl Default for Information {
    fn default() -> Self {
        Self { name: String::new(), uuid: Uuid::new_v4(), notes: None }
    }
}

impl Document for Information {
    const NAME: &'static str = "Information";

    const FIELDS: &'static [Field<Self>] = &[
        Field::<Self>::required(
            "Name",
            |i| i.name.clone().into(),
            |i, v| {
                i.name = codec::string(v)?;
                Ok(())
            },
        ),
        Field::<Self>::required(
            "UUID",
            |i| codec::text(&i.uuid),
            |i, v| {
                i.uuid = codec::parsed(v)?;
                Ok(())
            },
        ),
        Field::<Self>::optional(
            "Notes",
            |i| i.notes.clone().map(Value::from),
            |i, v| {
                i.notes = Some(codec::string(v)?);
                Ok(())
            },
        ),
    ];
}

/// A complete VM description.
///
/// Mutation is not synchronised; callers with more than one writer must
/// serialise access themselves.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Configuration {
    /// Location of the VM bundle. Not persisted.
    pub base_path: Option<PathBuf>,

    pub information: Information,

    pub system: System,

    pub qemu: QemuTweaks,

    /// In boot order.
    pub drives: Vec<Drive>,

    pub networks: Vec<Network>,
}

type F = Field<Configuration>;

impl Document for Configuration {
    const NAME: &'static str = "Configuration";

    const FIELDS: &'static [Field<Self>] = &[
        F::required(
            VERSION_KEY,
            |_| Value::Integer(CURRENT_VERSION),
            |_, v| match codec::integer(v)? {
                CURRENT_VERSION => Ok(()),
                other => Err(FieldError::Invalid(format!(
                    "expected version {CURRENT_VERSION}, found {other}"
                ))),
            },
        ),
        F::required(
            "Information",
            |c| codec::table(&c.information),
            |c, v| {
                c.information = codec::document(v)?;
                Ok(())
            },
        ),
        F::required(
            "System",
            |c| codec::table(&c.system),
            |c, v| {
                c.system = codec::document(v)?;
                Ok(())
            },
        ),
        F::required(
            "QEMU",
            |c| codec::table(&c.qemu),
            |c, v| {
                c.qemu = codec::document(v)?;
                Ok(())
            },
        ),
        F::optional(
            "Drive",
            |c| Some(codec::tables(&c.drives)),
            |c, v| {
                c.drives = codec::documents(v)?;
                Ok(())
            },
        ),
        F::optional(
            "Network",
            |c| Some(codec::tables(&c.networks)),
            |c, v| {
                c.networks = codec::documents(v)?;
                Ok(())
            },
        ),
    ];

    fn attach_base_path(&mut self, base: &Path) {
        self.base_path = Some(base.to_owned());
        self.qemu.attach_base_path(base);
    }
}

fn format_of(table: &Table) -> Result<DocumentFormat, ConfigError> {
    match table.get(VERSION_KEY) {
        None => Ok(DocumentFormat::Legacy),
        Some(Value::Integer(v)) if *v < CURRENT_VERSION => {
            Ok(DocumentFormat::Legacy)
        }
        Some(Value::Integer(v)) if *v > CURRENT_VERSION => {
            Err(ConfigError::UnsupportedVersion {
                found: *v,
                supported: CURRENT_VERSION,
            })
        }
        // a malformed version is reported by the decoder
        Some(_) => Ok(DocumentFormat::Current),
    }
}

impl Configuration {
    /// A fresh VM with defaults derived for the machine and host.
    pub fn new<S: Into<String>>(
        name: S,
        arch: Architecture,
        target: Target,
        host: &HostCapabilities,
    ) -> Self {
        let qemu = QemuTweaks::for_architecture(arch, &target, host);
        let mut drives = vec![Drive::new(arch, &target, false)];
        if qemu.has_uefi_boot {
            drives.push(Drive::efi_variables());
        }
        let networks = vec![Network::new(arch, &target, host)];

        Self {
            base_path: None,
            information: Information { name: name.into(), ..Default::default() },
            system: System::new(arch, target),
            qemu,
            drives,
            networks,
        }
    }

    /// Parses a configuration in either format. `base` is the bundle the
    /// text came from, if any.
    pub fn from_toml_str(
        raw: &str,
        base: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        Self::parse(raw, base).map(|(config, _)| config)
    }

    fn parse(
        raw: &str,
        base: Option<&Path>,
    ) -> Result<(Self, DocumentFormat), ConfigError> {
        let table = toml::from_str::<Table>(raw)?;
        let format = format_of(&table)?;
        let config = match format {
            DocumentFormat::Current => codec::decode(table, base)?,
            DocumentFormat::Legacy => {
                let mut old: LegacyConfiguration =
                    Value::Table(table).try_into()?;
                old.existing_path = base.map(Path::to_path_buf);
                Self::from(&old)
            }
        };
        Ok((config, format))
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        codec::to_toml_string(self)
    }

    /// Loads the configuration stored in the bundle at `bundle`.
    pub fn load(bundle: &Path, log: &Logger) -> Result<Self, ConfigError> {
        Self::load_detecting(bundle, log).map(|(config, _)| config)
    }

    /// Like [`Configuration::load`], also reporting the stored format.
    pub fn load_detecting(
        bundle: &Path,
        log: &Logger,
    ) -> Result<(Self, DocumentFormat), ConfigError> {
        let path = bundle.join(CONFIG_FILE_NAME);
        debug!(log, "loading configuration"; "path" => %path.display());

        let contents = std::fs::read_to_string(&path)?;
        let (config, format) = Self::parse(&contents, Some(bundle))?;
        if format == DocumentFormat::Legacy {
            info!(log, "converted legacy configuration";
                "path" => %path.display(),
                "name" => &config.information.name);
        }
        Ok((config, format))
    }

    /// Writes the configuration into the bundle at `bundle`, creating the
    /// directory if needed. The previous file is replaced atomically.
    pub fn save(&self, bundle: &Path, log: &Logger) -> Result<(), ConfigError> {
        let contents = self.to_toml_string()?;
        std::fs::create_dir_all(bundle)?;

        let path = bundle.join(CONFIG_FILE_NAME);
        let staging = path.with_extension("toml.tmp");
        std::fs::write(&staging, contents)?;
        std::fs::rename(&staging, &path)?;

        info!(log, "saved configuration";
            "path" => %path.display(),
            "version" => CURRENT_VERSION);
        Ok(())
    }

    pub fn append_drive(&mut self, drive: Drive) {
        self.drives.push(drive);
    }

    /// Removes the drives at `offsets`, returning them in their former
    /// order.
    pub fn remove_drives(
        &mut self,
        offsets: &BTreeSet<usize>,
    ) -> Result<Vec<Drive>, ConfigError> {
        Ok(order::remove_offsets(&mut self.drives, offsets)?)
    }

    /// Moves the drives at `offsets` in front of the drive currently at
    /// `destination`.
    pub fn move_drives(
        &mut self,
        offsets: &BTreeSet<usize>,
        destination: usize,
    ) -> Result<(), ConfigError> {
        Ok(order::move_offsets(&mut self.drives, offsets, destination)?)
    }

    pub fn append_network(&mut self, network: Network) {
        self.networks.push(network);
    }

    pub fn remove_networks(
        &mut self,
        offsets: &BTreeSet<usize>,
    ) -> Result<Vec<Network>, ConfigError> {
        Ok(order::remove_offsets(&mut self.networks, offsets)?)
    }

    pub fn move_networks(
        &mut self,
        offsets: &BTreeSet<usize>,
        destination: usize,
    ) -> Result<(), ConfigError> {
        Ok(order::move_offsets(&mut self.networks, offsets, destination)?)
    }
}

/// Rewrites a legacy bundle in the current format, keeping the old file
/// next to it. Bundles already in the current format are left untouched.
pub fn upgrade_bundle(
    bundle: &Path,
    log: &Logger,
) -> Result<DocumentFormat, ConfigError> {
    let (config, format) = Configuration::load_detecting(bundle, log)?;
    if format == DocumentFormat::Legacy {
        std::fs::copy(
            bundle.join(CONFIG_FILE_NAME),
            bundle.join(LEGACY_BACKUP_NAME),
        )?;
        config.save(bundle, log)?;
    }
    Ok(format)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::codec::{encode, DecodeError};
    use crate::order::OrderError;
    use vmcfg_types::{DriveInterface, ImageType, NetworkMode};

    fn test_logger() -> Logger {
        Logger::root(slog::Discard, slog::o!())
    }

    fn arm_mac() -> HostCapabilities {
        HostCapabilities {
            arch: Some(Architecture::Aarch64),
            hardware_acceleration: true,
            vmnet: true,
        }
    }

    fn sample() -> Configuration {
        Configuration::new(
            "Debian",
            Architecture::Aarch64,
            Target::new("virt").unwrap(),
            &arm_mac(),
        )
    }

    #[test]
    fn new_configuration_is_derived() {
        let c = sample();
        assert_eq!(c.information.name, "Debian");
        assert_eq!(c.system.architecture, Architecture::Aarch64);
        assert!(c.qemu.has_uefi_boot);
        assert!(c.qemu.has_rng_device);
        assert!(c.qemu.has_hypervisor);

        assert_eq!(c.drives.len(), 2);
        assert_eq!(c.drives[0].image_type, ImageType::Disk);
        assert_eq!(c.drives[0].interface, DriveInterface::VirtIo);
        assert!(c.drives[1].is_efi_variables());

        assert_eq!(c.networks.len(), 1);
        assert_eq!(c.networks[0].mode, NetworkMode::Shared);
    }

    #[test]
    fn firmware_targets_have_no_efi_store() {
        let c = Configuration::new(
            "Classic Mac",
            Architecture::Ppc,
            Target::new("mac99").unwrap(),
            &HostCapabilities::EMULATION_ONLY,
        );
        assert!(!c.qemu.has_uefi_boot);
        assert_eq!(c.drives.len(), 1);
        assert_eq!(c.networks[0].mode, NetworkMode::Emulated);
    }

    #[test]
    fn text_round_trip() {
        let original = sample();
        let text = original.to_toml_string().unwrap();
        assert!(text.contains("ConfigurationVersion = 4"));

        let base = Path::new("/vms/debian.bundle");
        let decoded = Configuration::from_toml_str(&text, Some(base)).unwrap();
        assert_eq!(decoded.base_path.as_deref(), Some(base));
        assert_eq!(decoded.qemu.base_path.as_deref(), Some(base));

        let mut expected = original.clone();
        expected.attach_base_path(base);
        assert_eq!(decoded, expected);
        assert_eq!(encode(&decoded), encode(&original));
        assert!(!text.contains("debian.bundle"));
    }

    #[test]
    fn newer_versions_are_rejected() {
        let mut table = encode(&sample());
        table.insert(VERSION_KEY.to_owned(), Value::Integer(5));
        let text = toml::to_string(&table).unwrap();
        assert!(matches!(
            Configuration::from_toml_str(&text, None),
            Err(ConfigError::UnsupportedVersion { found: 5, supported: 4 })
        ));

        table.insert(VERSION_KEY.to_owned(), Value::from("4"));
        let text = toml::to_string(&table).unwrap();
        assert!(matches!(
            Configuration::from_toml_str(&text, None),
            Err(ConfigError::Decode(DecodeError::TypeMismatch { .. }))
        ));
    }

    #[test]
    fn nested_missing_field_is_reported() {
        let mut table = encode(&sample());
        if let Some(Value::Table(qemu)) = table.get_mut("QEMU") {
            qemu.remove("AdditionalArguments");
        }
        let text = toml::to_string(&table).unwrap();
        match Configuration::from_toml_str(&text, None) {
            Err(ConfigError::Decode(err)) => {
                assert!(matches!(
                    err,
                    DecodeError::Nested { key: "QEMU", .. }
                ));
                assert!(matches!(
                    err.innermost(),
                    DecodeError::MissingField {
                        document: "QEMU",
                        key: "AdditionalArguments"
                    }
                ));
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn drive_and_network_lists_are_optional() {
        let mut table = encode(&sample());
        table.remove("Drive");
        table.remove("Network");
        let text = toml::to_string(&table).unwrap();
        let c = Configuration::from_toml_str(&text, None).unwrap();
        assert!(c.drives.is_empty());
        assert!(c.networks.is_empty());
    }

    #[test]
    fn legacy_text_is_converted() {
        let raw = r#"
ConfigurationVersion = 2
Name = "Windows XP"
SystemArchitecture = "i386"
SystemTarget = "pc"
SystemArguments = ["-rtc", "base=localtime"]
"#;
        let base = Path::new("/vms/xp.utm");
        let c = Configuration::from_toml_str(raw, Some(base)).unwrap();
        assert_eq!(c.information.name, "Windows XP");
        assert_eq!(c.system.architecture, Architecture::I386);
        assert_eq!(c.qemu.additional_arguments.len(), 2);
        assert_eq!(c.base_path.as_deref(), Some(base));
        assert_eq!(c.qemu.base_path.as_deref(), Some(base));
    }

    #[test]
    fn bundle_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = dir.path().join("debian.bundle");
        let log = test_logger();

        let original = sample();
        original.save(&bundle, &log).unwrap();
        assert!(bundle.join(CONFIG_FILE_NAME).exists());
        assert!(!bundle.join("config.toml.tmp").exists());

        let (loaded, format) =
            Configuration::load_detecting(&bundle, &log).unwrap();
        assert_eq!(format, DocumentFormat::Current);
        assert_eq!(loaded.base_path.as_deref(), Some(bundle.as_path()));
        assert_eq!(encode(&loaded), encode(&original));
    }

    #[test]
    fn missing_bundle_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Configuration::load(&dir.path().join("nope"), &test_logger()),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn upgrade_legacy_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = dir.path();
        let log = test_logger();
        let legacy = r#"
Name = "Old"
SystemArchitecture = "x86_64"
DebugLogEnabled = true
"#;
        std::fs::write(bundle.join(CONFIG_FILE_NAME), legacy).unwrap();

        assert_eq!(upgrade_bundle(bundle, &log).unwrap(), DocumentFormat::Legacy);
        assert_eq!(
            std::fs::read_to_string(bundle.join(LEGACY_BACKUP_NAME)).unwrap(),
            legacy
        );

        let (c, format) = Configuration::load_detecting(bundle, &log).unwrap();
        assert_eq!(format, DocumentFormat::Current);
        assert_eq!(c.information.name, "Old");
        assert!(c.qemu.has_debug_log);
        assert_eq!(
            c.qemu.debug_log_path(),
            Some(bundle.join(crate::qemu::DEBUG_LOG_NAME))
        );

        assert_eq!(upgrade_bundle(bundle, &log).unwrap(), DocumentFormat::Current);
    }

    #[test]
    fn drive_sequence_edits() {
        let mut c = sample();
        let target = c.system.target.clone();
        c.append_drive(Drive::new(Architecture::Aarch64, &target, true));
        let ids: Vec<Uuid> = c.drives.iter().map(|d| d.id).collect();

        c.move_drives(&BTreeSet::from([2]), 0).unwrap();
        assert_eq!(
            c.drives.iter().map(|d| d.id).collect::<Vec<_>>(),
            [ids[2], ids[0], ids[1]]
        );

        let removed = c.remove_drives(&BTreeSet::from([0, 2])).unwrap();
        assert_eq!(removed.iter().map(|d| d.id).collect::<Vec<_>>(), [ids[2], ids[1]]);
        assert_eq!(c.drives.len(), 1);
        assert_eq!(c.drives[0].id, ids[0]);

        assert!(matches!(
            c.remove_drives(&BTreeSet::from([1])),
            Err(ConfigError::Order(OrderError::OffsetOutOfRange { offset: 1, len: 1 }))
        ));
    }

    #[test]
    fn network_sequence_edits() {
        let mut c = sample();
        let target = c.system.target.clone();
        c.append_network(Network::new(
            Architecture::Aarch64,
            &target,
            &HostCapabilities::EMULATION_ONLY,
        ));
        let macs: Vec<_> = c.networks.iter().map(|n| n.mac_address).collect();

        c.move_networks(&BTreeSet::from([0]), 2).unwrap();
        assert_eq!(c.networks[0].mac_address, macs[1]);
        assert_eq!(c.networks[1].mac_address, macs[0]);

        c.remove_networks(&BTreeSet::from([1])).unwrap();
        assert_eq!(c.networks.len(), 1);
        assert_eq!(c.networks[0].mac_address, macs[1]);
    }
}
