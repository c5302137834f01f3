use std::net::IpAddr;

use bgp_rs::{MPReachNLRI, NLRIEncoding, Origin, PathAttribute};
use ipnetwork::IpNetwork;

use crate::rib::Family;
use crate::speaker::Path;
use crate::utils::{next_hop_from_bytes, next_hop_to_bytes, prefix_from_network, ParseError};

/// Attribute carrying the next hop of a path
#[derive(Debug)]
pub enum NextHop<'a> {
    /// NEXT_HOP, used when peering and prefix share an address family
    Plain(IpAddr),
    /// MP_REACH_NLRI, used for IPv6 and for extended next hop peering
    MpReach(&'a MPReachNLRI),
}

impl<'a> NextHop<'a> {
    /// Find the first next hop carrying attribute, in attribute order
    pub fn from_attributes(attributes: &'a [PathAttribute]) -> Option<Self> {
        attributes.iter().find_map(|attr| match attr {
            PathAttribute::NEXT_HOP(next_hop) => Some(NextHop::Plain(*next_hop)),
            PathAttribute::MP_REACH_NLRI(nlri) => Some(NextHop::MpReach(nlri)),
            _ => None,
        })
    }

    /// Usable next hop address
    /// Only the first next hop of MP_REACH_NLRI is considered
    pub fn addr(&self) -> Result<IpAddr, ParseError> {
        let addr = match self {
            NextHop::Plain(addr) => *addr,
            NextHop::MpReach(nlri) => next_hop_from_bytes(&nlri.next_hop)?,
        };
        if addr.is_unspecified() {
            return Err(ParseError::new(format!("Invalid next hop: {}", addr)));
        }
        Ok(addr)
    }
}

/// Build the path announcing `prefix` via `next_hop`
///
/// Attributes are always ORIGIN (IGP) plus the next hop: a plain NEXT_HOP for
/// an IPv4 prefix with an IPv4 next hop, otherwise MP_REACH_NLRI (IPv6
/// prefixes, and IPv4 prefixes sent with an IPv6 next hop).
pub fn build_path(prefix: &IpNetwork, next_hop: IpAddr, neighbor: Option<IpAddr>) -> Path {
    let family = Family::for_network(prefix);
    let nlri = NLRIEncoding::IP(prefix_from_network(prefix));
    let mut attributes: Vec<PathAttribute> = Vec::with_capacity(2);
    attributes.push(PathAttribute::ORIGIN(Origin::IGP));
    if family.is_ipv4() && next_hop.is_ipv4() {
        attributes.push(PathAttribute::NEXT_HOP(next_hop));
    } else {
        attributes.push(PathAttribute::MP_REACH_NLRI(MPReachNLRI {
            afi: family.afi,
            safi: family.safi,
            next_hop: next_hop_to_bytes(next_hop),
            announced_routes: vec![nlri.clone()],
        }));
    }
    Path {
        family,
        nlri,
        attributes,
        neighbor,
        is_withdraw: false,
    }
}
