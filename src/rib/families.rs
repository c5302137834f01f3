use std::fmt;
use std::net::IpAddr;

use bgp_rs::{AFI, SAFI};
use ipnetwork::IpNetwork;
use serde::{Serialize, Serializer};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Family {
    pub afi: AFI,
    pub safi: SAFI,
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.afi, self.safi)
    }
}

impl Family {
    pub const IPV4_UNICAST: Family = Family {
        afi: AFI::IPV4,
        safi: SAFI::Unicast,
    };
    pub const IPV6_UNICAST: Family = Family {
        afi: AFI::IPV6,
        safi: SAFI::Unicast,
    };
    /// Families handled by the reconciler, in processing order
    pub const ALL: [Family; 2] = [Family::IPV4_UNICAST, Family::IPV6_UNICAST];

    /// Unicast family matching the address version
    pub fn for_addr(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => Family::IPV4_UNICAST,
            IpAddr::V6(_) => Family::IPV6_UNICAST,
        }
    }

    pub fn for_network(network: &IpNetwork) -> Self {
        Family::for_addr(network.ip())
    }

    pub fn is_ipv4(self) -> bool {
        matches!(self.afi, AFI::IPV4)
    }

    pub fn is_ipv6(self) -> bool {
        matches!(self.afi, AFI::IPV6)
    }

    /// IPv4/IPv6 unicast are the only families routes are synced for
    pub fn is_ip_unicast(self) -> bool {
        (self.is_ipv4() || self.is_ipv6()) && matches!(self.safi, SAFI::Unicast)
    }

    /// Does this address belong to this family's address space?
    pub fn contains(self, addr: IpAddr) -> bool {
        match addr {
            IpAddr::V4(_) => self.is_ipv4(),
            IpAddr::V6(_) => self.is_ipv6(),
        }
    }
}

impl Serialize for Family {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
