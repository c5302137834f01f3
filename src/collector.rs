//! Build the set of prefixes this speaker should announce

use std::collections::HashMap;

use log::{debug, trace, warn};

use crate::cluster::{
    AnnouncePolicy, ClusterError, ClusterState, ElasticIp, Pod, Selector, Service, Subnet,
    VPC_NAT_GW_LABEL,
};
use crate::config::ServerConfig;
use crate::rib::RouteMap;
use crate::utils::{host_network, parse_addr, split_routes};

/// Collect expected routes from a cluster snapshot
///
/// Objects that can't be parsed are logged and skipped, only a failure to
/// list a kind of object fails the collection.
pub fn collect_expected(
    cluster: &dyn ClusterState,
    config: &ServerConfig,
) -> Result<RouteMap, ClusterError> {
    let mut expected = RouteMap::new();

    if config.nat_gw_mode {
        let gateway = config.gateway_name.as_deref().unwrap_or_default();
        let selector = Selector::matching(VPC_NAT_GW_LABEL, gateway);
        let eips = cluster.elastic_ips(&selector)?;
        collect_elastic_ips(&mut expected, &eips);
        debug!("Expected routes for NAT gateway {}: {}", gateway, expected);
        return Ok(expected);
    }

    let subnets = cluster.subnets()?;
    let pods = cluster.pods()?;
    collect_subnets(&mut expected, &subnets);
    let subnet_policies: HashMap<&str, Option<AnnouncePolicy>> = subnets
        .iter()
        .map(|s| (s.metadata.name.as_str(), s.metadata.policy()))
        .collect();
    collect_pods(&mut expected, &pods, &subnet_policies, &config.node_name);

    if config.announce_cluster_ip {
        let services = cluster.services()?;
        collect_services(&mut expected, &services);
    }

    let eips = cluster.elastic_ips(&Selector::everything())?;
    collect_elastic_ips(&mut expected, &eips);

    debug!("Expected routes: {}", expected);
    Ok(expected)
}

fn collect_subnets(expected: &mut RouteMap, subnets: &[Subnet]) {
    for subnet in subnets {
        if !subnet.ready || subnet.metadata.policy() != Some(AnnouncePolicy::Cluster) {
            continue;
        }
        for route in split_routes(&subnet.cidr_block) {
            match route {
                Ok(network) => {
                    trace!("Subnet {} expects {}", subnet.metadata.name, network);
                    expected.insert(network);
                }
                Err(err) => warn!("Skipping CIDR of subnet {}: {}", subnet.metadata.name, err),
            }
        }
    }
}

fn collect_pods(
    expected: &mut RouteMap,
    pods: &[Pod],
    subnet_policies: &HashMap<&str, Option<AnnouncePolicy>>,
    node_name: &str,
) {
    for pod in pods.iter().filter(|p| p.is_alive() && !p.host_network) {
        let pod_policy = pod.metadata.policy();
        let networks = pod.networks();
        if networks.is_empty() {
            if announced_here(pod, pod_policy, node_name) {
                for ip in &pod.pod_ips {
                    add_host_route(expected, &pod.metadata.key(), ip);
                }
            }
            continue;
        }
        for network in networks {
            let policy = pod_policy.or_else(|| {
                network
                    .subnet
                    .as_deref()
                    .and_then(|name| subnet_policies.get(name).cloned().flatten())
            });
            if !announced_here(pod, policy, node_name) {
                continue;
            }
            for ip in network.ip_address.split(',').filter(|s| !s.trim().is_empty()) {
                add_host_route(expected, &pod.metadata.key(), ip);
            }
        }
    }
}

fn announced_here(pod: &Pod, policy: Option<AnnouncePolicy>, node_name: &str) -> bool {
    match policy {
        Some(AnnouncePolicy::Cluster) => true,
        Some(AnnouncePolicy::Local) => pod.node_name == node_name,
        None => false,
    }
}

fn collect_services(expected: &mut RouteMap, services: &[Service]) {
    for svc in services {
        if svc.metadata.policy().is_none() || !svc.is_cluster_ip() {
            continue;
        }
        for ip in svc.addresses() {
            add_host_route(expected, &svc.metadata.key(), ip);
        }
    }
}

fn collect_elastic_ips(expected: &mut RouteMap, eips: &[ElasticIp]) {
    for eip in eips {
        if !eip.ready || eip.metadata.policy().is_none() {
            continue;
        }
        if !eip.v4_ip.is_empty() {
            add_host_route(expected, &eip.metadata.name, &eip.v4_ip);
        }
        if !eip.v6_ip.is_empty() {
            add_host_route(expected, &eip.metadata.name, &eip.v6_ip);
        }
    }
}

fn add_host_route(expected: &mut RouteMap, owner: &str, ip: &str) {
    match parse_addr(ip) {
        Ok(addr) => {
            let network = host_network(addr);
            trace!("{} expects {}", owner, network);
            expected.insert(network);
        }
        Err(err) => warn!("Skipping address of {}: {}", owner, err),
    }
}
