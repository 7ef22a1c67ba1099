// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Primitive value types shared by the VM configuration crates.
//!
//! These are the leaves of a VM configuration: the architecture and machine
//! type a guest is built for, the bus a drive hangs off, how a NIC is
//! attached, and so on. They live in their own crate so that the
//! configuration library, the CLI, and any downstream launcher can all use
//! them without depending on one another.

use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod arch;
mod drive;
mod net;

pub use arch::{Architecture, Target};
pub use drive::{DriveInterface, ImageType};
pub use net::{MacAddress, NetworkMode, NetworkProtocol};

/// Errors produced when parsing the non-enumerated value types.
///
/// The closed enumerations ([`Architecture`], [`DriveInterface`], ...) parse
/// through `strum` and report [`strum::ParseError`] instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid QEMU target {0:?}")]
    InvalidTarget(String),

    #[error("invalid MAC address {0:?}")]
    InvalidMacAddress(String),
}

/// A single additional argument passed verbatim to QEMU.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QemuArgument(String);

impl QemuArgument {
    pub fn new<S: Into<String>>(arg: S) -> Self {
        Self(arg.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for QemuArgument {
    fn from(arg: String) -> Self {
        Self(arg)
    }
}

impl From<&str> for QemuArgument {
    fn from(arg: &str) -> Self {
        Self(arg.to_owned())
    }
}

impl FromStr for QemuArgument {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl Display for QemuArgument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
