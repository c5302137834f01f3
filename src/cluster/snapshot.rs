use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use log::debug;
use serde::Deserialize;

use super::{ClusterError, ClusterState, ElasticIp, Pod, Selector, Service, Subnet};

/// Cluster objects loaded from a JSON document
///
/// ```json
/// {
///   "subnets": [{"metadata": {"name": "ovn-default"}, "cidrBlock": "10.16.0.0/16", "ready": true}],
///   "pods": [],
///   "services": [],
///   "elasticIps": []
/// }
/// ```
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SnapshotCluster {
    pub subnets: Vec<Subnet>,
    pub pods: Vec<Pod>,
    pub services: Vec<Service>,
    pub elastic_ips: Vec<ElasticIp>,
}

impl SnapshotCluster {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ClusterError> {
        let file = File::open(path.as_ref())?;
        let snapshot: SnapshotCluster = serde_json::from_reader(BufReader::new(file))?;
        debug!(
            "Loaded snapshot {}: subnets={} pods={} services={} eips={}",
            path.as_ref().display(),
            snapshot.subnets.len(),
            snapshot.pods.len(),
            snapshot.services.len(),
            snapshot.elastic_ips.len(),
        );
        Ok(snapshot)
    }

    pub fn from_json(json: &str) -> Result<Self, ClusterError> {
        Ok(serde_json::from_str(json)?)
    }
}

impl ClusterState for SnapshotCluster {
    fn subnets(&self) -> Result<Vec<Subnet>, ClusterError> {
        Ok(self.subnets.clone())
    }

    fn pods(&self) -> Result<Vec<Pod>, ClusterError> {
        Ok(self.pods.clone())
    }

    fn services(&self) -> Result<Vec<Service>, ClusterError> {
        Ok(self.services.clone())
    }

    fn elastic_ips(&self, selector: &Selector) -> Result<Vec<ElasticIp>, ClusterError> {
        Ok(self
            .elastic_ips
            .iter()
            .filter(|eip| selector.matches(&eip.metadata.labels))
            .cloned()
            .collect())
    }
}
