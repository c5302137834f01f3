use std::net::IpAddr;

use log::debug;

use crate::config::ServerConfig;
use crate::kernel::KernelRoutes;
use crate::rib::Family;

/// Next hop to announce to a neighbor
///
/// The source address of the kernel route towards the neighbor, or the
/// router ID when there is none. When that turns out to be this speaker's
/// pod address (not running with host networking) the configured node
/// address of the same family is used instead.
pub async fn resolve_next_hop(
    kernel: &dyn KernelRoutes,
    config: &ServerConfig,
    neighbor: IpAddr,
) -> IpAddr {
    let next_hop = match kernel.route_get(neighbor).await {
        Ok(route) => route.src.unwrap_or(config.router_id),
        Err(err) => {
            debug!("No route to neighbor {}, using router-id: {}", neighbor, err);
            config.router_id
        }
    };

    let family = Family::for_addr(next_hop);
    match (config.pod_ip(family), config.node_ip(family)) {
        (Some(pod_ip), Some(node_ip)) if pod_ip == next_hop => {
            debug!(
                "Next hop {} for {} is the pod address, using node address {}",
                next_hop, neighbor, node_ip
            );
            node_ip
        }
        _ => next_hop,
    }
}
