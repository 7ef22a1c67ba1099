// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Configuration model for QEMU virtual machines.
//!
//! A VM bundle holds a `config.toml` describing the emulated system, the
//! QEMU tweaks applied to it, and its ordered drives and network devices.
//! Files written by older releases use a flat legacy layout; they are
//! accepted transparently and rewritten in the current layout on save.

use thiserror::Error;

pub mod codec;
pub mod config;
pub mod drive;
pub mod host;
pub mod legacy;
pub mod network;
pub mod order;
pub mod qemu;
pub mod system;

pub use codec::DecodeError;
pub use config::{
    upgrade_bundle, Configuration, DocumentFormat, Information,
    CONFIG_FILE_NAME, CURRENT_VERSION,
};
pub use drive::Drive;
pub use host::HostCapabilities;
pub use network::{IpConfiguration, Network, PortForward};
pub use order::OrderError;
pub use qemu::QemuTweaks;
pub use system::System;

/// Errors which may be returned when loading or storing a configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot parse toml: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Cannot serialize toml: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Decode(#[from] DecodeError),

    #[error("Configuration version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: i64, supported: i64 },

    #[error(transparent)]
    Order(#[from] OrderError),
}
