use std::fs::File;
use std::io::{self, Read};
use std::net::IpAddr;

use serde::Deserialize;
use toml;

pub(super) struct Defaults {}

impl Defaults {
    pub(super) fn cluster_as() -> u32 {
        65000
    }

    pub(super) fn neighbor_as() -> u32 {
        65001
    }

    pub(super) fn external_interface() -> String {
        "net1".to_string()
    }

    pub(super) fn sync_interval() -> u16 {
        30
    }

    pub(super) fn announce_interval() -> u16 {
        5
    }
}

/// Config (toml) representation of the speaker config
#[derive(Debug, Deserialize)]
pub(super) struct ServerConfigSpec {
    // Router-ID, also the next hop of last resort
    pub(super) router_id: IpAddr,
    #[serde(default = "Defaults::cluster_as")]
    pub(super) cluster_as: u32,
    #[serde(default = "Defaults::neighbor_as")]
    pub(super) neighbor_as: u32,
    #[serde(default = "Vec::new")]
    pub(super) neighbors: Vec<IpAddr>,
    #[serde(default = "Vec::new")]
    pub(super) neighbors_v6: Vec<IpAddr>,
    // Send both families to every neighbor (RFC 8950)
    #[serde(default)]
    pub(super) extended_nexthop: bool,
    // Addresses of the pod running the speaker, one per family
    #[serde(default = "Vec::new")]
    pub(super) pod_ips: Vec<IpAddr>,
    // Next hops to use instead of a pod IP, one per family
    #[serde(default = "Vec::new")]
    pub(super) node_ips: Vec<IpAddr>,
    #[serde(default)]
    pub(super) node_name: String,
    #[serde(default)]
    pub(super) announce_cluster_ip: bool,
    // Only announce the EIPs of `gateway_name`
    #[serde(default)]
    pub(super) nat_gw_mode: bool,
    pub(super) gateway_name: Option<String>,
    // Link used for routes learned from neighbors
    #[serde(default = "Defaults::external_interface")]
    pub(super) external_interface: String,
    // Seconds between kernel route table replays
    #[serde(default = "Defaults::sync_interval")]
    pub(super) sync_interval: u16,
    // Seconds between announcement reconcile passes
    #[serde(default = "Defaults::announce_interval")]
    pub(super) announce_interval: u16,
}

impl ServerConfigSpec {
    pub(super) fn from_file(path: &str) -> io::Result<Self> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        Self::from_str(&contents)
    }

    pub(super) fn from_str(contents: &str) -> io::Result<Self> {
        toml::from_str(contents).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
    }
}
