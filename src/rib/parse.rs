use std::fmt;
use std::net::IpAddr;

use ipnetwork::IpNetwork;

use crate::speaker::Path;
use crate::utils::ParseError;

/// A best-path update reduced to what the kernel route injector needs
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedPath {
    pub destination: IpNetwork,
    pub next_hop: IpAddr,
    pub neighbor: Option<IpAddr>,
    pub is_withdraw: bool,
}

impl fmt::Display for ParsedPath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "<ParsedPath {} via {} from {}{}>",
            self.destination,
            self.next_hop,
            self.neighbor
                .map(|n| n.to_string())
                .unwrap_or_else(|| "local".to_string()),
            if self.is_withdraw { " withdraw" } else { "" },
        )
    }
}

/// Extract destination and next hop from a path
///
/// The next hop is taken from the first NEXT_HOP or MP_REACH_NLRI attribute.
/// A path with neither, or with an unusable address, is rejected.
pub fn parse_path(path: &Path) -> Result<ParsedPath, ParseError> {
    if !path.family.is_ip_unicast() {
        return Err(ParseError::new(format!(
            "Unsupported family: {}",
            path.family
        )));
    }
    let destination = path.network()?;
    let next_hop = path
        .next_hop()
        .ok_or_else(|| ParseError::new(format!("No next hop for {}", destination)))?
        .addr()?;
    Ok(ParsedPath {
        destination,
        next_hop,
        neighbor: path.neighbor,
        is_withdraw: path.is_withdraw,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rib::{build_path, Family};
    use bgp_rs::{MPReachNLRI, Origin, PathAttribute};

    #[test]
    fn test_parse_plain_next_hop() {
        let prefix: IpNetwork = "192.168.1.0/24".parse().unwrap();
        let mut path = build_path(&prefix, "10.1.1.1".parse().unwrap(), None);
        path.neighbor = Some("10.1.1.1".parse().unwrap());
        let parsed = parse_path(&path).unwrap();
        assert_eq!(parsed.destination, prefix);
        assert_eq!(parsed.next_hop, "10.1.1.1".parse::<IpAddr>().unwrap());
        assert!(!parsed.is_withdraw);
    }

    #[test]
    fn test_parse_first_next_hop_attribute_wins() {
        let prefix: IpNetwork = "fd00:10::/64".parse().unwrap();
        let mut path = build_path(&prefix, "2001:db8::1".parse().unwrap(), None);
        // A later plain NEXT_HOP does not override MP_REACH_NLRI
        path.attributes
            .push(PathAttribute::NEXT_HOP("10.9.9.9".parse().unwrap()));
        let parsed = parse_path(&path).unwrap();
        assert_eq!(parsed.next_hop, "2001:db8::1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_parse_missing_next_hop() {
        let prefix: IpNetwork = "192.168.1.0/24".parse().unwrap();
        let mut path = build_path(&prefix, "10.1.1.1".parse().unwrap(), None);
        path.attributes = vec![PathAttribute::ORIGIN(Origin::IGP)];
        assert!(parse_path(&path).is_err());
    }

    #[test]
    fn test_parse_bad_mp_reach_next_hop() {
        let prefix: IpNetwork = "fd00:10::/64".parse().unwrap();
        let mut path = build_path(&prefix, "2001:db8::1".parse().unwrap(), None);
        path.attributes = vec![
            PathAttribute::ORIGIN(Origin::IGP),
            PathAttribute::MP_REACH_NLRI(MPReachNLRI {
                afi: Family::IPV6_UNICAST.afi,
                safi: Family::IPV6_UNICAST.safi,
                next_hop: vec![],
                announced_routes: vec![],
            }),
        ];
        assert!(parse_path(&path).is_err());
    }
}
