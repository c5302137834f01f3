//! Keep the speaker's self-originated routes equal to the expected routes

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use ipnetwork::IpNetwork;
use log::{debug, error, info, trace, warn};
use tokio::sync::watch;
use tokio::time::interval;

use crate::cluster::ClusterState;
use crate::collector::collect_expected;
use crate::config::ServerConfig;
use crate::error::Error;
use crate::kernel::{KernelRoutes, RouteKind};
use crate::nexthop::resolve_next_hop;
use crate::rib::{build_path, route_diff, Family, PrefixSet, RouteMap};
use crate::speaker::{BgpSpeaker, SpeakerError, TableType};
use crate::utils::normalize_network;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FamilyReport {
    pub added: usize,
    pub deleted: usize,
    pub failed: usize,
}

/// Outcome of a reconcile pass, per reconciled family
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReconcileReport {
    pub families: Vec<(Family, FamilyReport)>,
}

impl ReconcileReport {
    pub fn get(&self, family: Family) -> Option<&FamilyReport> {
        self.families
            .iter()
            .find(|(f, _)| *f == family)
            .map(|(_, report)| report)
    }

    /// Number of add and delete requests issued
    pub fn changes(&self) -> usize {
        self.families
            .iter()
            .map(|(_, r)| r.added + r.deleted + r.failed)
            .sum()
    }
}

impl fmt::Display for ReconcileReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "<ReconcileReport")?;
        for (family, report) in &self.families {
            write!(
                f,
                " [{}: added={} deleted={} failed={}]",
                family, report.added, report.deleted, report.failed
            )?;
        }
        write!(f, ">")
    }
}

pub struct Reconciler {
    speaker: Arc<dyn BgpSpeaker>,
    kernel: Arc<dyn KernelRoutes>,
    cluster: Arc<dyn ClusterState>,
    config: Arc<ServerConfig>,
}

impl Reconciler {
    pub fn new(
        speaker: Arc<dyn BgpSpeaker>,
        kernel: Arc<dyn KernelRoutes>,
        cluster: Arc<dyn ClusterState>,
        config: Arc<ServerConfig>,
    ) -> Self {
        Self {
            speaker,
            kernel,
            cluster,
            config,
        }
    }

    /// Collect expected routes from the cluster and reconcile them
    pub async fn reconcile(&self) -> Result<ReconcileReport, Error> {
        let expected = collect_expected(&*self.cluster, &self.config)?;
        self.reconcile_routes(&expected).await
    }

    /// Add missing and withdraw stale announcements, family by family
    ///
    /// Families without neighbors are skipped. An empty expected set still
    /// gets reconciled so stale routes are withdrawn. Failing to add or
    /// delete a route is logged and retried on the next pass.
    pub async fn reconcile_routes(&self, expected: &RouteMap) -> Result<ReconcileReport, Error> {
        let mut report = ReconcileReport::default();
        let empty = PrefixSet::new();
        for family in Family::ALL.iter().cloned() {
            let neighbors = self.config.neighbors_for(family)?;
            if neighbors.is_empty() {
                trace!("No {} neighbors, skipping", family);
                continue;
            }
            let announced = match self.announced_routes(family).await {
                Ok(announced) => announced,
                Err(err) => {
                    error!("Failed to list announced {} routes: {}", family, err);
                    continue;
                }
            };
            let diff = route_diff(expected.get(family).unwrap_or(&empty), &announced);
            debug!(
                "{}: {} expected, {} announced, {} to add, {} to delete",
                family,
                expected.get(family).map(|s| s.len()).unwrap_or(0),
                announced.len(),
                diff.to_add.len(),
                diff.to_delete.len(),
            );

            let mut next_hops = Vec::with_capacity(neighbors.len());
            for neighbor in neighbors {
                let next_hop = resolve_next_hop(&*self.kernel, &self.config, neighbor).await;
                next_hops.push((neighbor, next_hop));
            }

            let mut family_report = FamilyReport::default();
            for prefix in &diff.to_add {
                if self.add_route(prefix, &next_hops).await {
                    family_report.added += 1;
                } else {
                    family_report.failed += 1;
                }
            }
            for prefix in &diff.to_delete {
                if self.delete_route(prefix, &next_hops).await {
                    family_report.deleted += 1;
                } else {
                    family_report.failed += 1;
                }
            }
            report.families.push((family, family_report));
        }
        Ok(report)
    }

    /// Prefixes in the speaker's global RIB originated by this node
    ///
    /// A destination is self-originated when one of its paths has as next
    /// hop the router ID, a configured pod or node address, or an address
    /// local to this host.
    pub async fn announced_routes(&self, family: Family) -> Result<PrefixSet, SpeakerError> {
        let destinations = self.speaker.list_path(family, TableType::Global).await?;
        let mut announced = PrefixSet::new();
        for destination in destinations {
            for path in &destination.paths {
                let next_hop = match path.next_hop().and_then(|nh| nh.addr().ok()) {
                    Some(next_hop) => next_hop,
                    None => continue,
                };
                if self.is_local_next_hop(next_hop).await {
                    announced.insert(normalize_network(destination.prefix));
                    break;
                }
            }
        }
        Ok(announced)
    }

    async fn is_local_next_hop(&self, next_hop: IpAddr) -> bool {
        let config = &self.config;
        if next_hop == config.router_id
            || config.node_ips.values().any(|ip| *ip == next_hop)
            || config.pod_ips.values().any(|ip| *ip == next_hop)
        {
            return true;
        }
        match self.kernel.route_get(next_hop).await {
            Ok(route) => route.kind == RouteKind::Local,
            Err(err) => {
                trace!("Route lookup for next hop {} failed: {}", next_hop, err);
                false
            }
        }
    }

    /// Announce a prefix to every neighbor, true if all succeeded
    async fn add_route(&self, prefix: &IpNetwork, next_hops: &[(IpAddr, IpAddr)]) -> bool {
        let mut ok = true;
        for (neighbor, next_hop) in next_hops {
            let path = build_path(prefix, *next_hop, Some(*neighbor));
            trace!("Adding {} for {}", path, neighbor);
            if let Err(err) = self.speaker.add_path(path).await {
                warn!("Failed to announce {} to {}: {}", prefix, neighbor, err);
                ok = false;
            }
        }
        if ok {
            info!("Announced {}", prefix);
        }
        ok
    }

    /// Withdraw a prefix from every neighbor, true if all succeeded
    async fn delete_route(&self, prefix: &IpNetwork, next_hops: &[(IpAddr, IpAddr)]) -> bool {
        let mut ok = true;
        for (neighbor, next_hop) in next_hops {
            let path = build_path(prefix, *next_hop, Some(*neighbor));
            trace!("Deleting {} for {}", path, neighbor);
            if let Err(err) = self.speaker.delete_path(path).await {
                warn!("Failed to withdraw {} from {}: {}", prefix, neighbor, err);
                ok = false;
            }
        }
        if ok {
            info!("Withdrew {}", prefix);
        }
        ok
    }

    /// Reconcile every `period` until shutdown is signalled
    pub async fn run(self: Arc<Self>, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(period);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.reconcile().await {
                        Ok(report) if report.changes() > 0 => info!("{}", report),
                        Ok(report) => trace!("{}", report),
                        Err(err) => error!("Reconcile failed: {}", err),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Shutting down announcement reconciler");
                        return;
                    }
                }
            }
        }
    }
}
