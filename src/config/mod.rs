mod file;

use std::collections::HashMap;
use std::io::{self, Result};
use std::net::IpAddr;
use std::time::Duration;

use itertools::Itertools;

use crate::error::Error;
use crate::rib::Family;
use crate::speaker::{GlobalConfig, PeerConfig};

/// Parse a TOML config file and return a ServerConfig
pub fn from_file(path: &str) -> Result<ServerConfig> {
    let spec = file::ServerConfigSpec::from_file(path)?;
    ServerConfig::from_spec(spec)
}

/// Parse TOML config contents and return a ServerConfig
pub fn from_str(contents: &str) -> Result<ServerConfig> {
    let spec = file::ServerConfigSpec::from_str(contents)?;
    ServerConfig::from_spec(spec)
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub router_id: IpAddr,
    pub cluster_as: u32,
    pub neighbor_as: u32,
    pub neighbors: Vec<IpAddr>,
    pub neighbors_v6: Vec<IpAddr>,
    pub extended_nexthop: bool,
    /// This speaker's pod address per family
    pub pod_ips: HashMap<Family, IpAddr>,
    /// Next hop to announce instead of the pod address, per family
    pub node_ips: HashMap<Family, IpAddr>,
    pub node_name: String,
    pub announce_cluster_ip: bool,
    pub nat_gw_mode: bool,
    pub gateway_name: Option<String>,
    pub external_interface: String,
    pub sync_interval: u16,
    pub announce_interval: u16,
}

impl ServerConfig {
    /// Config with every optional setting defaulted
    pub fn new(router_id: IpAddr) -> Self {
        Self {
            router_id,
            cluster_as: file::Defaults::cluster_as(),
            neighbor_as: file::Defaults::neighbor_as(),
            neighbors: vec![],
            neighbors_v6: vec![],
            extended_nexthop: false,
            pod_ips: HashMap::new(),
            node_ips: HashMap::new(),
            node_name: String::new(),
            announce_cluster_ip: false,
            nat_gw_mode: false,
            gateway_name: None,
            external_interface: file::Defaults::external_interface(),
            sync_interval: file::Defaults::sync_interval(),
            announce_interval: file::Defaults::announce_interval(),
        }
    }

    fn from_spec(spec: file::ServerConfigSpec) -> Result<Self> {
        if spec.nat_gw_mode && spec.gateway_name.as_deref().unwrap_or("").is_empty() {
            return Err(invalid("nat_gw_mode requires gateway_name".to_string()));
        }
        Ok(Self {
            router_id: spec.router_id,
            cluster_as: spec.cluster_as,
            neighbor_as: spec.neighbor_as,
            neighbors: spec.neighbors,
            neighbors_v6: spec.neighbors_v6,
            extended_nexthop: spec.extended_nexthop,
            pod_ips: by_family("pod_ips", &spec.pod_ips)?,
            node_ips: by_family("node_ips", &spec.node_ips)?,
            node_name: spec.node_name,
            announce_cluster_ip: spec.announce_cluster_ip,
            nat_gw_mode: spec.nat_gw_mode,
            gateway_name: spec.gateway_name,
            external_interface: spec.external_interface,
            sync_interval: spec.sync_interval,
            announce_interval: spec.announce_interval,
        })
    }

    /// Neighbors that receive paths of this family
    ///
    /// With extended next hop every neighbor gets every family, otherwise
    /// only the neighbors of the matching family do. A neighbor listed under
    /// the wrong family is a configuration error.
    pub fn neighbors_for(&self, family: Family) -> std::result::Result<Vec<IpAddr>, Error> {
        if let Some(addr) = self.neighbors.iter().find(|n| !n.is_ipv4()) {
            return Err(Error::Config(format!(
                "IPv4 neighbor {} is not an IPv4 address",
                addr
            )));
        }
        if let Some(addr) = self.neighbors_v6.iter().find(|n| !n.is_ipv6()) {
            return Err(Error::Config(format!(
                "IPv6 neighbor {} is not an IPv6 address",
                addr
            )));
        }
        let neighbors = if self.extended_nexthop {
            self.neighbors
                .iter()
                .chain(self.neighbors_v6.iter())
                .cloned()
                .unique()
                .collect()
        } else if family.is_ipv4() {
            self.neighbors.clone()
        } else {
            self.neighbors_v6.clone()
        };
        Ok(neighbors)
    }

    pub fn global(&self) -> GlobalConfig {
        GlobalConfig {
            asn: self.cluster_as,
            router_id: self.router_id,
        }
    }

    /// Neighbor sessions to configure on the speaker
    ///
    /// A neighbor negotiates its own family, plus IPv4 unicast over an IPv6
    /// session (and the reverse) when extended next hop is enabled.
    pub fn peers(&self) -> std::result::Result<Vec<PeerConfig>, Error> {
        let mut peers: Vec<PeerConfig> = Vec::new();
        for family in Family::ALL.iter().cloned() {
            for address in self.neighbors_for(family)? {
                match peers.iter_mut().find(|p| p.address == address) {
                    Some(peer) => peer.families.push(family),
                    None => peers.push(PeerConfig {
                        address,
                        peer_as: self.neighbor_as,
                        families: vec![family],
                    }),
                }
            }
        }
        Ok(peers)
    }

    pub fn pod_ip(&self, family: Family) -> Option<IpAddr> {
        self.pod_ips.get(&family).cloned()
    }

    pub fn node_ip(&self, family: Family) -> Option<IpAddr> {
        self.node_ips.get(&family).cloned()
    }

    pub fn sync_period(&self) -> Duration {
        Duration::from_secs(u64::from(self.sync_interval))
    }

    pub fn announce_period(&self) -> Duration {
        Duration::from_secs(u64::from(self.announce_interval))
    }
}

fn invalid(reason: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, reason)
}

/// At most one address per family
fn by_family(key: &str, addrs: &[IpAddr]) -> Result<HashMap<Family, IpAddr>> {
    let mut map = HashMap::with_capacity(addrs.len());
    for addr in addrs {
        if let Some(existing) = map.insert(Family::for_addr(*addr), *addr) {
            return Err(invalid(format!(
                "{} has more than one {} address: {}, {}",
                key,
                Family::for_addr(*addr),
                existing,
                addr
            )));
        }
    }
    Ok(map)
}
