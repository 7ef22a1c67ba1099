// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use slog::{info, o, Drain, Level, Logger};
use vmcfg::codec;
use vmcfg::{upgrade_bundle, Configuration, DocumentFormat, Drive};
use vmcfg::{HostCapabilities, QemuTweaks};
use vmcfg_types::{Architecture, Target};

#[derive(Debug, Parser)]
#[clap(about, version)]
/// Create, inspect and edit QEMU virtual machine bundles
struct Opt {
    /// Enable debugging
    #[clap(short, long, action)]
    debug: bool,

    #[clap(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create a new VM bundle with defaults for the machine
    New {
        /// Bundle directory
        #[clap(action)]
        bundle: PathBuf,

        /// Guest architecture
        #[clap(short, long, action)]
        arch: Architecture,

        /// Machine target (defaults to the architecture's usual machine)
        #[clap(short, long, action)]
        target: Option<Target>,

        /// VM name (defaults to the bundle's file stem)
        #[clap(short, long, action)]
        name: Option<String>,
    },

    /// Print the configuration stored in a bundle
    Show {
        #[clap(action)]
        bundle: PathBuf,

        /// Print JSON instead of TOML
        #[clap(long, action)]
        json: bool,
    },

    /// Rewrite a legacy bundle in the current format
    Migrate {
        #[clap(action)]
        bundle: PathBuf,
    },

    /// Print the QEMU tweaks derived for a machine on this host
    Defaults {
        #[clap(short, long, action)]
        arch: Architecture,

        #[clap(short, long, action)]
        target: Option<Target>,
    },

    /// Edit the drive list of a bundle
    Drive {
        #[clap(subcommand)]
        cmd: DriveCommand,
    },
}

#[derive(Debug, Subcommand)]
enum DriveCommand {
    /// Append a drive with defaults for the bundle's machine
    Add {
        #[clap(action)]
        bundle: PathBuf,

        /// Add removable CD media instead of a disk
        #[clap(long, action)]
        removable: bool,

        /// Disk size (MiB), raised to the minimum if smaller
        #[clap(long, allow_hyphen_values = true, action)]
        size: Option<i64>,
    },

    /// Remove drives by index
    Remove {
        #[clap(action)]
        bundle: PathBuf,

        #[clap(required = true, action)]
        indices: Vec<usize>,
    },

    /// Move drives so they sit before the drive now at `--to`
    Move {
        #[clap(action)]
        bundle: PathBuf,

        #[clap(required = true, action)]
        indices: Vec<usize>,

        /// Destination index; the drive count moves to the end
        #[clap(long, action)]
        to: usize,
    },
}

fn create_logger(opt: &Opt) -> Logger {
    let decorator = slog_term::TermDecorator::new().stderr().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let level = if opt.debug { Level::Debug } else { Level::Info };
    let drain = slog::LevelFilter(drain, level).fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    Logger::root(drain, o!())
}

fn default_name(bundle: &Path) -> String {
    bundle
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| vmcfg::legacy::DEFAULT_NAME.to_owned())
}

fn new_bundle(
    bundle: &Path,
    arch: Architecture,
    target: Option<Target>,
    name: Option<String>,
    log: &Logger,
) -> anyhow::Result<()> {
    if bundle.join(vmcfg::CONFIG_FILE_NAME).exists() {
        return Err(anyhow!("{} already holds a VM", bundle.display()));
    }
    let target = target.unwrap_or_else(|| arch.default_target());
    let name = name.unwrap_or_else(|| default_name(bundle));
    let host = HostCapabilities::detect();

    let config = Configuration::new(name, arch, target, &host);
    config
        .save(bundle, log)
        .with_context(|| format!("failed to create {}", bundle.display()))?;
    info!(log, "created VM";
        "name" => &config.information.name,
        "uuid" => %config.information.uuid);
    Ok(())
}

fn load(bundle: &Path, log: &Logger) -> anyhow::Result<Configuration> {
    Configuration::load(bundle, log)
        .with_context(|| format!("failed to load {}", bundle.display()))
}

fn save(config: &Configuration, bundle: &Path, log: &Logger) -> anyhow::Result<()> {
    config
        .save(bundle, log)
        .with_context(|| format!("failed to save {}", bundle.display()))
}

fn render(config: &Configuration, json: bool) -> anyhow::Result<String> {
    if json {
        let table = codec::encode(config);
        Ok(serde_json::to_string_pretty(&table)?)
    } else {
        Ok(config.to_toml_string()?)
    }
}

fn derived_tweaks(
    arch: Architecture,
    target: Option<Target>,
) -> anyhow::Result<String> {
    let target = target.unwrap_or_else(|| arch.default_target());
    let tweaks =
        QemuTweaks::for_architecture(arch, &target, &HostCapabilities::detect());
    Ok(codec::to_toml_string(&tweaks)?)
}

fn edit_drives(
    cmd: DriveCommand,
    log: &Logger,
) -> anyhow::Result<()> {
    match cmd {
        DriveCommand::Add { bundle, removable, size } => {
            let mut config = load(&bundle, log)?;
            let mut drive = Drive::new(
                config.system.architecture,
                &config.system.target,
                removable,
            );
            if let Some(size) = size {
                drive.size_mib = size;
                drive.clamp_size();
                if drive.size_mib != size {
                    info!(log, "raised drive size to minimum";
                        "requested" => size,
                        "size" => drive.size_mib);
                }
            }
            config.append_drive(drive);
            save(&config, &bundle, log)
        }
        DriveCommand::Remove { bundle, indices } => {
            let mut config = load(&bundle, log)?;
            let offsets: BTreeSet<usize> = indices.into_iter().collect();
            let removed = config
                .remove_drives(&offsets)
                .context("failed to remove drives")?;
            save(&config, &bundle, log)?;
            info!(log, "removed drives"; "count" => removed.len());
            Ok(())
        }
        DriveCommand::Move { bundle, indices, to } => {
            let mut config = load(&bundle, log)?;
            let offsets: BTreeSet<usize> = indices.into_iter().collect();
            config
                .move_drives(&offsets, to)
                .context("failed to move drives")?;
            save(&config, &bundle, log)
        }
    }
}

fn main() -> anyhow::Result<()> {
    let opt = Opt::parse();
    let log = create_logger(&opt);

    match opt.cmd {
        Command::New { bundle, arch, target, name } => {
            new_bundle(&bundle, arch, target, name, &log)?
        }
        Command::Show { bundle, json } => {
            let config = load(&bundle, &log)?;
            println!("{}", render(&config, json)?);
        }
        Command::Migrate { bundle } => {
            let format = upgrade_bundle(&bundle, &log).with_context(|| {
                format!("failed to migrate {}", bundle.display())
            })?;
            if format == DocumentFormat::Current {
                info!(log, "bundle is already current";
                    "bundle" => %bundle.display());
            }
        }
        Command::Defaults { arch, target } => {
            println!("{}", derived_tweaks(arch, target)?);
        }
        Command::Drive { cmd } => edit_drives(cmd, &log)?,
    }

    Ok(())
}
