use std::fmt;

use ipnetwork::IpNetwork;
use log::{debug, info, warn};

use super::RouteSyncer;
use crate::error::Error;
use crate::kernel::{
    select_best_address, KernelError, KernelRoute, RouteFilter, RouteKind, RTPROT_BGP,
};
use crate::rib::{parse_path, Family};
use crate::speaker::Path;

/// What a best-path update did to the desired route table
#[derive(Clone, Debug, PartialEq)]
pub enum Injection {
    /// Route stored and synced to the kernel
    Injected(IpNetwork),
    /// Route removed from the table and the kernel
    Withdrawn(IpNetwork),
    /// A route owned by someone else already exists
    Skipped(IpNetwork),
    /// Not a route to sync (locally originated or not IP unicast)
    Ignored,
}

impl fmt::Display for Injection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Injection::Injected(dst) => write!(f, "Injected {}", dst),
            Injection::Withdrawn(dst) => write!(f, "Withdrawn {}", dst),
            Injection::Skipped(dst) => write!(f, "Skipped {}", dst),
            Injection::Ignored => write!(f, "Ignored"),
        }
    }
}

impl RouteSyncer {
    /// Apply a best-path update from the speaker
    pub async fn inject(&self, path: &Path) -> Result<Injection, Error> {
        let neighbor = match path.neighbor {
            Some(neighbor) if path.family.is_ip_unicast() => neighbor,
            _ => return Ok(Injection::Ignored),
        };

        if path.is_withdraw {
            let dst = path.network()?;
            info!("Removing route {} learned from {}", dst, neighbor);
            self.del_injected_route(&dst).await;
            self.delete_by_destination(&dst).await?;
            return Ok(Injection::Withdrawn(dst));
        }

        let parsed = parse_path(path)?;
        let dst = parsed.destination;
        if self.has_foreign_route(&dst).await {
            info!("Skipping injection of {}: destination has a non-BGP route", dst);
            return Ok(Injection::Skipped(dst));
        }

        let link = self.kernel.link_by_name(&self.external_interface).await?;
        let addrs = self
            .kernel
            .addr_list(&link, Family::for_network(&dst))
            .await?;
        let src = select_best_address(&addrs).ok_or_else(|| {
            KernelError::Other(format!(
                "No {} addresses on {}",
                Family::for_network(&dst),
                link.name
            ))
        })?;

        let route = KernelRoute {
            link_index: link.index,
            src: Some(src),
            dst,
            gw: Some(parsed.next_hop),
            protocol: RTPROT_BGP,
            kind: RouteKind::Unicast,
        };
        info!(
            "Injecting route {} via {} from {}",
            dst, parsed.next_hop, neighbor
        );
        self.add_injected_route(route, Some(neighbor)).await;

        let report = self.sync_local_route_table().await;
        if !report.failed.is_empty() {
            warn!(
                "Route sync after injecting {} finished with failures: {}",
                dst, report
            );
        }
        Ok(Injection::Injected(dst))
    }

    /// Delete the routes to `dst` owned by this agent, leaving the rest alone
    async fn delete_by_destination(&self, dst: &IpNetwork) -> Result<(), KernelError> {
        let filter = RouteFilter::dst(*dst).with_protocol(RTPROT_BGP);
        for route in self.kernel.route_list(filter).await? {
            debug!("Deleting {}", route);
            self.kernel.route_del(&route).await?;
        }
        Ok(())
    }

    /// Is there a route to `dst` not owned by this agent?
    /// A failed lookup doesn't block injection.
    async fn has_foreign_route(&self, dst: &IpNetwork) -> bool {
        match self.kernel.route_list(RouteFilter::dst(*dst)).await {
            Ok(routes) => routes.iter().any(|r| {
                let foreign = !r.is_bgp();
                if foreign {
                    debug!("Found existing route {}", r);
                }
                foreign
            }),
            Err(err) => {
                warn!("Failed to list routes for {}: {}", dst, err);
                false
            }
        }
    }
}
