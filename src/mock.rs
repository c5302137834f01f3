//! In-memory speaker, kernel and cluster used by tests

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::StreamExt;
use ipnetwork::IpNetwork;
use tokio::sync::Notify;

use crate::cluster::{
    ClusterError, ClusterState, ElasticIp, Pod, Selector, Service, SnapshotCluster, Subnet,
};
use crate::kernel::{
    KernelError, KernelRoute, KernelRoutes, Link, LinkAddress, RouteFilter, RouteKind,
    RT_SCOPE_UNIVERSE,
};
use crate::rib::{build_path, Family};
use crate::speaker::{
    BgpSpeaker, Destination, GlobalConfig, Path, PathStream, PeerConfig, SpeakerError, TableType,
};

/// Speaker keeping originated paths in a single table
pub struct MockSpeaker {
    rib: Mutex<Vec<Destination>>,
    added: Mutex<Vec<Path>>,
    deleted: Mutex<Vec<Path>>,
    fail_add: Mutex<HashSet<IpNetwork>>,
    global: Mutex<Option<GlobalConfig>>,
    peers: Mutex<Vec<PeerConfig>>,
    /// Sender of the current best-path subscription
    updates: Mutex<Option<mpsc::UnboundedSender<Path>>>,
    /// Updates sent while nobody is subscribed
    pending: Mutex<Vec<Path>>,
    watch_failures: Mutex<usize>,
    subscriptions: Mutex<usize>,
}

impl MockSpeaker {
    pub fn new() -> Self {
        Self {
            rib: Mutex::new(vec![]),
            added: Mutex::new(vec![]),
            deleted: Mutex::new(vec![]),
            fail_add: Mutex::new(HashSet::new()),
            global: Mutex::new(None),
            peers: Mutex::new(vec![]),
            updates: Mutex::new(None),
            pending: Mutex::new(vec![]),
            watch_failures: Mutex::new(0),
            subscriptions: Mutex::new(0),
        }
    }

    pub fn global(&self) -> Option<GlobalConfig> {
        self.global.lock().unwrap().clone()
    }

    pub fn peers(&self) -> Vec<PeerConfig> {
        self.peers.lock().unwrap().clone()
    }

    /// Seed the RIB with a path
    pub fn announce(&self, prefix: &str, next_hop: &str) {
        let prefix: IpNetwork = prefix.parse().unwrap();
        let path = build_path(&prefix, next_hop.parse().unwrap(), None);
        self.insert(path);
    }

    pub fn fail_add_for(&self, prefix: &str) {
        self.fail_add.lock().unwrap().insert(prefix.parse().unwrap());
    }

    pub fn added(&self) -> Vec<Path> {
        self.added.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<Path> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.added.lock().unwrap().clear();
        self.deleted.lock().unwrap().clear();
    }

    /// Push a best-path update to the watcher
    /// Held until the next subscription when nobody is watching
    pub fn send_best_path(&self, path: Path) {
        let path = match self.updates.lock().unwrap().as_ref() {
            Some(tx) => match tx.unbounded_send(path) {
                Ok(()) => return,
                Err(err) => err.into_inner(),
            },
            None => path,
        };
        self.pending.lock().unwrap().push(path);
    }

    /// End the current best-path stream
    pub fn close_watch(&self) {
        self.updates.lock().unwrap().take();
    }

    /// Refuse the next best-path subscription
    pub fn fail_next_watch(&self) {
        *self.watch_failures.lock().unwrap() += 1;
    }

    /// Number of best-path subscription attempts
    pub fn subscriptions(&self) -> usize {
        *self.subscriptions.lock().unwrap()
    }

    fn insert(&self, path: Path) {
        let prefix = path.network().unwrap();
        let mut rib = self.rib.lock().unwrap();
        match rib.iter_mut().find(|d| d.prefix == prefix) {
            Some(dest) => dest.paths.push(path),
            None => rib.push(Destination {
                prefix,
                paths: vec![path],
            }),
        }
    }
}

fn next_hop_of(path: &Path) -> Option<IpAddr> {
    path.next_hop().and_then(|nh| nh.addr().ok())
}

#[async_trait]
impl BgpSpeaker for MockSpeaker {
    async fn start_bgp(&self, global: &GlobalConfig) -> Result<(), SpeakerError> {
        *self.global.lock().unwrap() = Some(global.clone());
        Ok(())
    }

    async fn add_peer(&self, peer: &PeerConfig) -> Result<(), SpeakerError> {
        self.peers.lock().unwrap().push(peer.clone());
        Ok(())
    }

    async fn list_path(
        &self,
        family: Family,
        _table: TableType,
    ) -> Result<Vec<Destination>, SpeakerError> {
        Ok(self
            .rib
            .lock()
            .unwrap()
            .iter()
            .filter(|d| Family::for_network(&d.prefix) == family)
            .cloned()
            .collect())
    }

    async fn add_path(&self, path: Path) -> Result<(), SpeakerError> {
        let prefix = path.network().unwrap();
        self.added.lock().unwrap().push(path.clone());
        if self.fail_add.lock().unwrap().contains(&prefix) {
            return Err(SpeakerError::Rejected(format!("add {}", prefix)));
        }
        self.insert(path);
        Ok(())
    }

    async fn delete_path(&self, path: Path) -> Result<(), SpeakerError> {
        let prefix = path.network().unwrap();
        let next_hop = next_hop_of(&path);
        self.deleted.lock().unwrap().push(path);
        let mut rib = self.rib.lock().unwrap();
        for dest in rib.iter_mut().filter(|d| d.prefix == prefix) {
            dest.paths.retain(|p| next_hop_of(p) != next_hop);
        }
        rib.retain(|d| !d.paths.is_empty());
        Ok(())
    }

    async fn watch_best_paths(&self) -> Result<PathStream, SpeakerError> {
        *self.subscriptions.lock().unwrap() += 1;
        {
            let mut failures = self.watch_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(SpeakerError::Transport("watch refused".to_string()));
            }
        }
        let (tx, rx) = mpsc::unbounded();
        for path in self.pending.lock().unwrap().drain(..) {
            tx.unbounded_send(path).unwrap();
        }
        *self.updates.lock().unwrap() = Some(tx);
        Ok(rx.boxed())
    }
}

/// Kernel with a single routing table
pub struct MockKernel {
    routes: Mutex<Vec<KernelRoute>>,
    lookups: Mutex<HashMap<IpAddr, KernelRoute>>,
    links: Mutex<Vec<(Link, Vec<LinkAddress>)>>,
    fail_replace: Mutex<HashSet<IpNetwork>>,
    replace_gate: Mutex<Option<Arc<Notify>>>,
    replaced: Mutex<Vec<KernelRoute>>,
    deleted: Mutex<Vec<KernelRoute>>,
}

impl MockKernel {
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(vec![]),
            lookups: Mutex::new(HashMap::new()),
            links: Mutex::new(vec![]),
            fail_replace: Mutex::new(HashSet::new()),
            replace_gate: Mutex::new(None),
            replaced: Mutex::new(vec![]),
            deleted: Mutex::new(vec![]),
        }
    }

    /// Answer `route_get(dst)` with this route
    pub fn set_route_get(&self, dst: IpAddr, route: KernelRoute) {
        self.lookups.lock().unwrap().insert(dst, route);
    }

    /// Make `addr` a local address of this host
    pub fn set_local(&self, addr: IpAddr) {
        let route = KernelRoute {
            link_index: 1,
            src: Some(addr),
            dst: crate::utils::host_network(addr),
            gw: None,
            protocol: 2,
            kind: RouteKind::Local,
        };
        self.set_route_get(addr, route);
    }

    pub fn add_route(&self, route: KernelRoute) {
        self.routes.lock().unwrap().push(route);
    }

    pub fn add_link(&self, name: &str, index: u32, addrs: &[&str]) {
        let link = Link {
            index,
            name: name.to_string(),
        };
        let addrs = addrs
            .iter()
            .map(|a| LinkAddress {
                addr: a.parse().unwrap(),
                scope: RT_SCOPE_UNIVERSE,
            })
            .collect();
        self.links.lock().unwrap().push((link, addrs));
    }

    pub fn fail_replace_for(&self, dst: &str) {
        self.fail_replace.lock().unwrap().insert(dst.parse().unwrap());
    }

    /// Park the next `route_replace` until the returned gate is notified
    pub fn hold_next_replace(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.replace_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn routes(&self) -> Vec<KernelRoute> {
        self.routes.lock().unwrap().clone()
    }

    pub fn replaced(&self) -> Vec<KernelRoute> {
        self.replaced.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<KernelRoute> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn mutations(&self) -> usize {
        self.replaced.lock().unwrap().len() + self.deleted.lock().unwrap().len()
    }
}

#[async_trait]
impl KernelRoutes for MockKernel {
    async fn route_list(&self, filter: RouteFilter) -> Result<Vec<KernelRoute>, KernelError> {
        Ok(self
            .routes
            .lock()
            .unwrap()
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    async fn route_get(&self, dst: IpAddr) -> Result<KernelRoute, KernelError> {
        self.lookups
            .lock()
            .unwrap()
            .get(&dst)
            .cloned()
            .ok_or(KernelError::NoRoute(dst))
    }

    async fn route_replace(&self, route: &KernelRoute) -> Result<(), KernelError> {
        let gate = self.replace_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.replaced.lock().unwrap().push(route.clone());
        if self.fail_replace.lock().unwrap().contains(&route.dst) {
            return Err(KernelError::Other(format!("replace {} failed", route.dst)));
        }
        let mut routes = self.routes.lock().unwrap();
        routes.retain(|r| !(r.dst == route.dst && r.protocol == route.protocol));
        routes.push(route.clone());
        Ok(())
    }

    async fn route_del(&self, route: &KernelRoute) -> Result<(), KernelError> {
        self.deleted.lock().unwrap().push(route.clone());
        self.routes.lock().unwrap().retain(|r| r != route);
        Ok(())
    }

    async fn link_by_name(&self, name: &str) -> Result<Link, KernelError> {
        self.links
            .lock()
            .unwrap()
            .iter()
            .find(|(link, _)| link.name == name)
            .map(|(link, _)| link.clone())
            .ok_or_else(|| KernelError::LinkNotFound(name.to_string()))
    }

    async fn addr_list(
        &self,
        link: &Link,
        family: Family,
    ) -> Result<Vec<LinkAddress>, KernelError> {
        Ok(self
            .links
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _)| l.index == link.index)
            .flat_map(|(_, addrs)| addrs.iter())
            .filter(|a| family.contains(a.addr))
            .cloned()
            .collect())
    }
}

/// Cluster whose pods can't be listed
pub struct BrokenCluster(pub SnapshotCluster);

impl ClusterState for BrokenCluster {
    fn subnets(&self) -> Result<Vec<Subnet>, ClusterError> {
        self.0.subnets()
    }

    fn pods(&self) -> Result<Vec<Pod>, ClusterError> {
        Err(ClusterError::List("pods", "connection refused".to_string()))
    }

    fn services(&self) -> Result<Vec<Service>, ClusterError> {
        self.0.services()
    }

    fn elastic_ips(&self, selector: &Selector) -> Result<Vec<ElasticIp>, ClusterError> {
        self.0.elastic_ips(selector)
    }
}
