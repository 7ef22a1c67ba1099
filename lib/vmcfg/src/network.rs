// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::net::{Ipv4Addr, Ipv6Addr};

use vmcfg_types::{
    Architecture, MacAddress, NetworkMode, NetworkProtocol, Target,
};

use crate::codec::{self, Document, Field, Value};
use crate::host::HostCapabilities;

/// A guest NIC.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Network {
    pub mode: NetworkMode,

    /// QEMU device model of the emulated card, e.g. `virtio-net-pci`.
    pub hardware: String,

    pub mac_address: MacAddress,

    /// Host interface to bridge onto. Only used in bridged mode.
    pub bridge_interface: Option<String>,

    /// Keep the guest from reaching the host itself.
    pub isolate_from_host: bool,

    /// Only honoured in emulated mode.
    pub port_forwards: Vec<PortForward>,

    pub ip: IpConfiguration,
}

impl Default for Network {
    fn default() -> Self {
        Self {
            mode: NetworkMode::default(),
            hardware: String::new(),
            mac_address: MacAddress::local_random(),
            bridge_interface: None,
            isolate_from_host: false,
            port_forwards: Vec::new(),
            ip: IpConfiguration::default(),
        }
    }
}

/// Address plan for the emulated (user-mode) network. Unset entries fall
/// back to QEMU's own defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IpConfiguration {
    /// Guest subnet in CIDR form, e.g. `10.0.2.0/24`.
    pub guest_address: Option<String>,
    pub guest_address_ipv6: Option<String>,
    pub host_address: Option<Ipv4Addr>,
    pub host_address_ipv6: Option<Ipv6Addr>,
    pub dhcp_start_address: Option<Ipv4Addr>,
    pub dhcp_domain: Option<String>,
    pub dns_server_address: Option<Ipv4Addr>,
    pub dns_server_address_ipv6: Option<Ipv6Addr>,
    pub dns_search_domain: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PortForward {
    pub protocol: NetworkProtocol,
    pub guest_address: Option<Ipv4Addr>,
    pub guest_port: u16,
    pub host_address: Option<Ipv4Addr>,
    pub host_port: u16,
}

impl Network {
    pub fn new(
        arch: Architecture,
        target: &Target,
        host: &HostCapabilities,
    ) -> Self {
        let mut network = Self::default();
        network.reset(arch, target, host);
        network
    }

    /// Restores defaults for the given machine, with a fresh MAC address.
    pub fn reset(
        &mut self,
        arch: Architecture,
        target: &Target,
        host: &HostCapabilities,
    ) {
        *self = Self {
            mode: if host.vmnet {
                NetworkMode::Shared
            } else {
                NetworkMode::Emulated
            },
            hardware: Self::default_hardware(arch, target).to_owned(),
            ..Self::default()
        };
    }

    /// The NIC model most likely to be supported by a guest of this
    /// machine.
    pub fn default_hardware(arch: Architecture, target: &Target) -> &'static str {
        use Architecture::*;

        if target.is_virt_family() {
            return "virtio-net-pci";
        }
        match arch {
            X86_64 | I386 if target.as_str() == "isapc" => "ne2k_isa",
            X86_64 | I386 if target.as_str().starts_with("q35") => "e1000",
            X86_64 | I386 => "rtl8139",
            Ppc if target.as_str() == "mac99" => "sungem",
            Ppc64 if target.as_str() == "pseries" => "spapr-vlan",
            Sparc | Sparc64 => "lance",
            M68k => "dp8393x",
            S390x => "virtio-net-ccw",
            _ => "virtio-net-pci",
        }
    }

    pub fn randomize_mac_address(&mut self) {
        self.mac_address = MacAddress::local_random();
    }

    pub fn supports_port_forwarding(&self) -> bool {
        self.mode == NetworkMode::Emulated
    }
}

type F = Field<Network>;

impl Document for Network {
    const NAME: &'static str = "Network";

    const FIELDS: &'static [Field<Self>] = &[
        F::required(
            "Mode",
            |n| codec::text(&n.mode),
            |n, v| {
                n.mode = codec::parsed(v)?;
                Ok(())
            },
        ),
        F::required(
            "Hardware",
            |n| n.hardware.clone().into(),
            |n, v| {
                n.hardware = codec::string(v)?;
                Ok(())
            },
        ),
        F::required(
            "MacAddress",
            |n| codec::text(&n.mac_address),
            |n, v| {
                n.mac_address = codec::parsed(v)?;
                Ok(())
            },
        ),
        F::optional(
            "BridgeInterface",
            |n| n.bridge_interface.clone().map(Value::from),
            |n, v| {
                n.bridge_interface = Some(codec::string(v)?);
                Ok(())
            },
        ),
        F::required(
            "IsolateFromHost",
            |n| n.isolate_from_host.into(),
            |n, v| {
                n.isolate_from_host = codec::boolean(v)?;
                Ok(())
            },
        ),
        F::optional(
            "PortForward",
            |n| {
                (!n.port_forwards.is_empty())
                    .then(|| codec::tables(&n.port_forwards))
            },
            |n, v| {
                n.port_forwards = codec::documents(v)?;
                Ok(())
            },
        ),
        F::optional(
            "VlanGuestAddress",
            |n| codec::text_opt(&n.ip.guest_address),
            |n, v| {
                n.ip.guest_address = Some(codec::string(v)?);
                Ok(())
            },
        ),
        F::optional(
            "VlanGuestAddressIPv6",
            |n| codec::text_opt(&n.ip.guest_address_ipv6),
            |n, v| {
                n.ip.guest_address_ipv6 = Some(codec::string(v)?);
                Ok(())
            },
        ),
        F::optional(
            "VlanHostAddress",
            |n| codec::text_opt(&n.ip.host_address),
            |n, v| {
                n.ip.host_address = Some(codec::parsed(v)?);
                Ok(())
            },
        ),
        F::optional(
            "VlanHostAddressIPv6",
            |n| codec::text_opt(&n.ip.host_address_ipv6),
            |n, v| {
                n.ip.host_address_ipv6 = Some(codec::parsed(v)?);
                Ok(())
            },
        ),
        F::optional(
            "VlanDhcpStartAddress",
            |n| codec::text_opt(&n.ip.dhcp_start_address),
            |n, v| {
                n.ip.dhcp_start_address = Some(codec::parsed(v)?);
                Ok(())
            },
        ),
        F::optional(
            "VlanDhcpDomain",
            |n| codec::text_opt(&n.ip.dhcp_domain),
            |n, v| {
                n.ip.dhcp_domain = Some(codec::string(v)?);
                Ok(())
            },
        ),
        F::optional(
            "VlanDnsServerAddress",
            |n| codec::text_opt(&n.ip.dns_server_address),
            |n, v| {
                n.ip.dns_server_address = Some(codec::parsed(v)?);
                Ok(())
            },
        ),
        F::optional(
            "VlanDnsServerAddressIPv6",
            |n| codec::text_opt(&n.ip.dns_server_address_ipv6),
            |n, v| {
                n.ip.dns_server_address_ipv6 = Some(codec::parsed(v)?);
                Ok(())
            },
        ),
        F::optional(
            "VlanDnsSearchDomain",
            |n| codec::text_opt(&n.ip.dns_search_domain),
            |n, v| {
                n.ip.dns_search_domain = Some(codec::string(v)?);
                Ok(())
            },
        ),
    ];
}

impl Document for PortForward {
    const NAME: &'static str = "PortForward";

    const FIELDS: &'static [Field<Self>] = &[
        Field::<Self>::required(
            "Protocol",
            |p| codec::text(&p.protocol),
            |p, v| {
                p.protocol = codec::parsed(v)?;
                Ok(())
            },
        ),
        Field::<Self>::optional(
            "GuestAddress",
            |p| codec::text_opt(&p.guest_address),
            |p, v| {
                p.guest_address = Some(codec::parsed(v)?);
                Ok(())
            },
        ),
        Field::<Self>::required(
            "GuestPort",
            |p| i64::from(p.guest_port).into(),
            |p, v| {
                p.guest_port = codec::bounded(v)?;
                Ok(())
            },
        ),
        Field::<Self>::optional(
            "HostAddress",
            |p| codec::text_opt(&p.host_address),
            |p, v| {
                p.host_address = Some(codec::parsed(v)?);
                Ok(())
            },
        ),
        Field::<Self>::required(
            "HostPort",
            |p| i64::from(p.host_port).into(),
            |p, v| {
                p.host_port = codec::bounded(v)?;
                Ok(())
            },
        ),
    ];
}
