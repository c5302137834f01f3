use std::error::Error;
use std::fmt;
use std::net::{AddrParseError, IpAddr, Ipv4Addr, Ipv6Addr};

use bgp_rs::{Prefix, AFI};
use ipnetwork::{IpNetwork, IpNetworkError};

#[derive(Debug)]
pub struct ParseError {
    pub reason: String,
}

impl ParseError {
    pub fn new(reason: String) -> Self {
        ParseError { reason }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ParseError: {}", self.reason)
    }
}

impl Error for ParseError {}

/// Host route for a single address (/32 for IPv4, /128 for IPv6)
pub fn host_network(addr: IpAddr) -> IpNetwork {
    let length = match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    };
    // Full-length masks are always valid
    IpNetwork::new(addr, length).unwrap_or_else(|_| IpNetwork::from(addr))
}

/// Zero any host bits so equal networks compare equal
/// E.g. "10.0.0.5/24" -> "10.0.0.0/24"
pub fn normalize_network(network: IpNetwork) -> IpNetwork {
    IpNetwork::new(network.network(), network.prefix()).unwrap_or(network)
}

/// Parse a single route, with or without a length
/// A bare address (E.g. "10.0.0.5") is treated as a host route
/// ```
/// use ovn_speaker::utils::parse_route;
/// let route = parse_route("10.16.0.0/16").unwrap();
/// assert_eq!(route.prefix(), 16);
/// let host = parse_route("fd00::5").unwrap();
/// assert_eq!(host.prefix(), 128);
/// ```
pub fn parse_route(route: &str) -> Result<IpNetwork, ParseError> {
    let route = route.trim();
    if route.contains('/') {
        let network: IpNetwork = route
            .parse()
            .map_err(|err: IpNetworkError| ParseError::new(format!("{} '{}'", err, route)))?;
        Ok(normalize_network(network))
    } else {
        let addr = parse_addr(route)?;
        Ok(host_network(addr))
    }
}

pub fn parse_addr(addr: &str) -> Result<IpAddr, ParseError> {
    addr.trim()
        .parse()
        .map_err(|err: AddrParseError| ParseError::new(format!("{} '{}'", err, addr)))
}

/// Split a comma-separated list of addresses or CIDRs, parsing each one
/// Empty segments are ignored, and each entry is parsed independently so a
/// single bad entry is reported without hiding the others.
pub fn split_routes(value: &str) -> Vec<Result<IpNetwork, ParseError>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_route)
        .collect()
}

/// Convert an IpNetwork to a bgp_rs::Prefix
pub fn prefix_from_network(network: &IpNetwork) -> Prefix {
    let (protocol, octets) = match network {
        IpNetwork::V4(v4) => (AFI::IPV4, v4.ip().octets().to_vec()),
        IpNetwork::V6(v6) => (AFI::IPV6, v6.ip().octets().to_vec()),
    };
    Prefix {
        protocol,
        length: network.prefix(),
        prefix: octets,
    }
}

/// Convert a bgp_rs::Prefix (possibly with truncated octets) to an IpNetwork
pub fn network_from_prefix(prefix: &Prefix) -> Result<IpNetwork, ParseError> {
    let addr = match prefix.protocol {
        AFI::IPV4 => {
            let mut buffer = [0u8; 4];
            let len = prefix.prefix.len().min(4);
            buffer[..len].copy_from_slice(&prefix.prefix[..len]);
            IpAddr::from(Ipv4Addr::from(buffer))
        }
        AFI::IPV6 => {
            let mut buffer = [0u8; 16];
            let len = prefix.prefix.len().min(16);
            buffer[..len].copy_from_slice(&prefix.prefix[..len]);
            IpAddr::from(Ipv6Addr::from(buffer))
        }
        afi => {
            return Err(ParseError::new(format!(
                "Unsupported prefix AFI: {}",
                afi
            )))
        }
    };
    IpNetwork::new(addr, prefix.length)
        .map(normalize_network)
        .map_err(|err| ParseError::new(format!("{} '{}/{}'", err, addr, prefix.length)))
}

/// Convert an MP_REACH_NLRI next hop to an IpAddr
/// 4 bytes is an IPv4 next hop (extended next hop), 16 bytes an IPv6 global
/// address and 32 bytes a global + link-local pair, of which the global is used.
pub fn next_hop_from_bytes(bytes: &[u8]) -> Result<IpAddr, ParseError> {
    match bytes.len() {
        4 => {
            let mut buffer = [0u8; 4];
            buffer.copy_from_slice(bytes);
            Ok(IpAddr::from(buffer))
        }
        16 | 32 => {
            let mut buffer = [0u8; 16];
            buffer.copy_from_slice(&bytes[..16]);
            Ok(IpAddr::from(buffer))
        }
        len => Err(ParseError::new(format!(
            "Unexpected next hop length: {} bytes",
            len
        ))),
    }
}

/// Encode a next hop for an MP_REACH_NLRI attribute
pub fn next_hop_to_bytes(next_hop: IpAddr) -> Vec<u8> {
    match next_hop {
        IpAddr::V4(v4) => v4.octets().to_vec(),
        IpAddr::V6(v6) => v6.octets().to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_route() {
        let route = parse_route("10.0.0.5/24").unwrap();
        assert_eq!(route, "10.0.0.0/24".parse::<IpNetwork>().unwrap());

        let route = parse_route(" 10.0.0.5 ").unwrap();
        assert_eq!(route, "10.0.0.5/32".parse::<IpNetwork>().unwrap());

        let route = parse_route("fd00::5").unwrap();
        assert_eq!(route.prefix(), 128);
        assert!(route.is_ipv6());

        assert!(parse_route("10.0.0.0/33").is_err());
        assert!(parse_route("not-an-ip").is_err());
        assert!(parse_route("10.0.0.0/abc").is_err());
    }

    #[test]
    fn test_split_routes() {
        let routes = split_routes("10.0.0.0/16,fd00::/64");
        assert_eq!(routes.len(), 2);
        assert!(routes[0].as_ref().unwrap().is_ipv4());
        assert!(routes[1].as_ref().unwrap().is_ipv6());

        let routes = split_routes("10.0.0.0/16,,bogus");
        assert_eq!(routes.len(), 2);
        assert!(routes[0].is_ok());
        assert!(routes[1].is_err());
    }

    #[test]
    fn test_prefix_conversion() {
        let network: IpNetwork = "2001:10::/64".parse().unwrap();
        let prefix = prefix_from_network(&network);
        assert_eq!(prefix.length, 64);
        assert_eq!(network_from_prefix(&prefix).unwrap(), network);

        // Truncated octets, as found in parsed NLRI
        let prefix = Prefix {
            protocol: AFI::IPV4,
            length: 17,
            prefix: vec![10, 10, 128],
        };
        assert_eq!(
            network_from_prefix(&prefix).unwrap(),
            "10.10.128.0/17".parse::<IpNetwork>().unwrap()
        );
    }

    #[test]
    fn test_next_hop_bytes() {
        assert_eq!(
            next_hop_from_bytes(&[10, 1, 1, 1]).unwrap(),
            "10.1.1.1".parse::<IpAddr>().unwrap()
        );
        let global: Ipv6Addr = "2001:db8::1".parse().unwrap();
        let link_local: Ipv6Addr = "fe80::1".parse().unwrap();
        let mut bytes = global.octets().to_vec();
        bytes.extend_from_slice(&link_local.octets());
        assert_eq!(next_hop_from_bytes(&bytes).unwrap(), IpAddr::from(global));
        assert!(next_hop_from_bytes(&[]).is_err());
        assert!(next_hop_from_bytes(&[1, 2, 3]).is_err());
    }
}
