mod injector;

pub use injector::Injection;

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ipnetwork::IpNetwork;
use log::{debug, info, trace, warn};
use tokio::sync::{watch, Mutex};
use tokio::time::{interval_at, Instant};

use crate::kernel::{KernelRoute, KernelRoutes};
use crate::utils::{format_list, format_time_as_elapsed};

/// A route this agent wants in the kernel
#[derive(Clone, Debug)]
pub struct DesiredRoute {
    pub route: KernelRoute,
    /// Neighbor the best path came from
    pub neighbor: Option<IpAddr>,
    pub learned: DateTime<Utc>,
}

impl fmt::Display for DesiredRoute {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "<DesiredRoute {} from={} age={}>",
            self.route,
            self.neighbor
                .map(|n| n.to_string())
                .unwrap_or_else(|| "local".to_string()),
            format_time_as_elapsed(self.learned),
        )
    }
}

/// Outcome of replaying the desired routes into the kernel
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReplayReport {
    pub replaced: Vec<IpNetwork>,
    pub failed: Vec<IpNetwork>,
}

impl fmt::Display for ReplayReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "<ReplayReport replaced={} failed={}>",
            self.replaced.len(),
            format_list(&self.failed),
        )
    }
}

/// Keeps the kernel in line with the routes learned from neighbors
///
/// The desired table holds at most one route per destination. Every entry
/// is re-asserted on each sync, repairing routes removed or changed by
/// someone else.
pub struct RouteSyncer {
    kernel: Arc<dyn KernelRoutes>,
    external_interface: String,
    table: Mutex<HashMap<IpNetwork, DesiredRoute>>,
}

impl RouteSyncer {
    pub fn new(kernel: Arc<dyn KernelRoutes>, external_interface: &str) -> Self {
        Self {
            kernel,
            external_interface: external_interface.to_string(),
            table: Mutex::new(HashMap::new()),
        }
    }

    /// Store (or replace) the desired route for a destination
    pub async fn add_injected_route(&self, route: KernelRoute, neighbor: Option<IpAddr>) {
        let dst = route.dst;
        let entry = DesiredRoute {
            route,
            neighbor,
            learned: Utc::now(),
        };
        info!("Adding route for destination {}", dst);
        self.table.lock().await.insert(dst, entry);
    }

    /// Forget the desired route for a destination, if any
    pub async fn del_injected_route(&self, dst: &IpNetwork) -> Option<DesiredRoute> {
        let removed = self.table.lock().await.remove(dst);
        if removed.is_some() {
            info!("Removing route for destination {}", dst);
        }
        removed
    }

    pub async fn get(&self, dst: &IpNetwork) -> Option<DesiredRoute> {
        self.table.lock().await.get(dst).cloned()
    }

    /// Desired routes, sorted by destination
    pub async fn routes(&self) -> Vec<DesiredRoute> {
        let mut routes: Vec<_> = self.table.lock().await.values().cloned().collect();
        routes.sort_by_key(|r| r.route.dst);
        routes
    }

    pub async fn len(&self) -> usize {
        self.table.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.table.lock().await.is_empty()
    }

    /// Replace every desired route in the kernel
    ///
    /// The table lock is taken per entry and held across its kernel call,
    /// so a concurrent withdrawal can't be undone by a stale replay.
    /// A failing entry doesn't stop the others.
    pub async fn sync_local_route_table(&self) -> ReplayReport {
        let mut destinations: Vec<IpNetwork> = self.table.lock().await.keys().cloned().collect();
        destinations.sort();
        debug!("Syncing {} routes to the kernel", destinations.len());

        let mut report = ReplayReport::default();
        for dst in destinations {
            let table = self.table.lock().await;
            // Withdrawn since the destinations were listed
            let entry = match table.get(&dst) {
                Some(entry) => entry,
                None => continue,
            };
            trace!("Syncing {}", entry);
            match self.kernel.route_replace(&entry.route).await {
                Ok(()) => report.replaced.push(dst),
                Err(err) => {
                    warn!("Route {} could not be replaced: {}", entry.route, err);
                    report.failed.push(dst);
                }
            }
        }
        report
    }

    /// Replay the table every `period` until shutdown is signalled
    pub async fn run(self: Arc<Self>, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval_at(Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.sync_local_route_table().await;
                    if !report.failed.is_empty() {
                        warn!("Route sync finished with failures: {}", report);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Shutting down local route synchronization");
                        return;
                    }
                }
            }
        }
    }
}
