//! Point-in-time views of the cluster objects that drive announcements

mod snapshot;

pub use snapshot::SnapshotCluster;

use std::collections::{BTreeMap, HashMap};
use std::error;
use std::fmt;
use std::io;

use serde::Deserialize;

pub const BGP_ANNOTATION: &str = "ovn.kubernetes.io/bgp";
pub const VPC_NAT_GW_LABEL: &str = "ovn.kubernetes.io/vpc-nat-gw-name";

const IP_ADDRESS_SUFFIX: &str = ".kubernetes.io/ip_address";
const LOGICAL_SWITCH_SUFFIX: &str = ".kubernetes.io/logical_switch";

/// Where a prefix is announced from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnnouncePolicy {
    /// Announced by every speaker
    Cluster,
    /// Announced only by the speaker on the node hosting the pod
    Local,
}

impl AnnouncePolicy {
    /// Parse the bgp annotation value, anything unknown is "not opted in"
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "true" | "cluster" => Some(AnnouncePolicy::Cluster),
            "local" => Some(AnnouncePolicy::Local),
            _ => None,
        }
    }

    pub fn from_annotations(annotations: &HashMap<String, String>) -> Option<Self> {
        annotations
            .get(BGP_ANNOTATION)
            .and_then(|v| AnnouncePolicy::parse(v))
    }
}

impl fmt::Display for AnnouncePolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AnnouncePolicy::Cluster => write!(f, "cluster"),
            AnnouncePolicy::Local => write!(f, "local"),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
    pub labels: HashMap<String, String>,
    pub annotations: HashMap<String, String>,
}

impl ObjectMeta {
    /// namespace/name, or just name for cluster scoped objects
    pub fn key(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.namespace, self.name)
        }
    }

    pub fn policy(&self) -> Option<AnnouncePolicy> {
        AnnouncePolicy::from_annotations(&self.annotations)
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Subnet {
    pub metadata: ObjectMeta,
    /// Comma separated for dual stack, E.g. "10.16.0.0/16,fd00:10:16::/64"
    pub cidr_block: String,
    pub ready: bool,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl Default for PodPhase {
    fn default() -> Self {
        PodPhase::Pending
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
pub enum RestartPolicy {
    Always,
    OnFailure,
    Never,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        RestartPolicy::Always
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Pod {
    pub metadata: ObjectMeta,
    pub phase: PodPhase,
    pub restart_policy: RestartPolicy,
    /// Status reason, E.g. "Evicted"
    pub reason: String,
    pub host_network: bool,
    pub node_name: String,
    #[serde(rename = "podIPs")]
    pub pod_ips: Vec<String>,
}

/// Addresses a pod holds on one attached network
#[derive(Clone, Debug, PartialEq)]
pub struct PodNetwork {
    pub provider: String,
    /// Comma separated for dual stack
    pub ip_address: String,
    pub subnet: Option<String>,
}

impl Pod {
    /// Dead pods are never announced
    pub fn is_alive(&self) -> bool {
        match self.phase {
            PodPhase::Succeeded => self.restart_policy == RestartPolicy::Always,
            PodPhase::Failed => {
                self.restart_policy != RestartPolicy::Never && self.reason != "Evicted"
            }
            _ => true,
        }
    }

    /// Networks declared through `<provider>.kubernetes.io/ip_address` annotations,
    /// sorted by provider
    pub fn networks(&self) -> Vec<PodNetwork> {
        let annotations = &self.metadata.annotations;
        let by_provider: BTreeMap<&str, &String> = annotations
            .iter()
            .filter_map(|(key, value)| {
                key.strip_suffix(IP_ADDRESS_SUFFIX)
                    .filter(|provider| !provider.is_empty())
                    .map(|provider| (provider, value))
            })
            .collect();
        by_provider
            .into_iter()
            .map(|(provider, ip_address)| PodNetwork {
                provider: provider.to_string(),
                ip_address: ip_address.clone(),
                subnet: annotations
                    .get(&format!("{}{}", provider, LOGICAL_SWITCH_SUFFIX))
                    .cloned(),
            })
            .collect()
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
pub enum ServiceType {
    ClusterIP,
    NodePort,
    LoadBalancer,
    ExternalName,
}

impl Default for ServiceType {
    fn default() -> Self {
        ServiceType::ClusterIP
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Service {
    pub metadata: ObjectMeta,
    #[serde(rename = "type")]
    pub service_type: ServiceType,
    #[serde(rename = "clusterIP")]
    pub cluster_ip: String,
    /// Dual stack addresses, first one equals `cluster_ip`
    #[serde(rename = "clusterIPs")]
    pub cluster_ips: Vec<String>,
}

impl Service {
    /// ClusterIP type with an allocated (non headless) address
    pub fn is_cluster_ip(&self) -> bool {
        self.service_type == ServiceType::ClusterIP
            && !self.cluster_ip.is_empty()
            && self.cluster_ip != "None"
    }

    /// All allocated cluster addresses
    pub fn addresses(&self) -> Vec<&str> {
        if self.cluster_ips.is_empty() {
            vec![self.cluster_ip.as_str()]
        } else {
            self.cluster_ips.iter().map(String::as_str).collect()
        }
    }
}

/// Elastic (egress) IP of a VPC NAT gateway
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ElasticIp {
    pub metadata: ObjectMeta,
    pub v4_ip: String,
    pub v6_ip: String,
    pub ready: bool,
}

/// Label equality selector, an empty selector matches everything
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Selector(BTreeMap<String, String>);

impl Selector {
    pub fn everything() -> Self {
        Self::default()
    }

    pub fn matching(key: &str, value: &str) -> Self {
        let mut labels = BTreeMap::new();
        labels.insert(key.to_string(), value.to_string());
        Self(labels)
    }

    pub fn matches(&self, labels: &HashMap<String, String>) -> bool {
        self.0
            .iter()
            .all(|(key, value)| labels.get(key).map(|v| v == value).unwrap_or(false))
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "<everything>");
        }
        let terms: Vec<String> = self.0.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        write!(f, "{}", terms.join(","))
    }
}

#[derive(Debug)]
pub enum ClusterError {
    /// Listing a kind of object failed. [kind, reason]
    List(&'static str, String),
    Io(io::Error),
    /// Snapshot could not be decoded. [reason]
    Decode(String),
}

impl fmt::Display for ClusterError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Cluster Error: ")?;
        use ClusterError::*;
        match self {
            List(kind, r) => write!(f, "Failed to list {} [{}]", kind, r),
            Io(err) => write!(f, "{}", err),
            Decode(r) => write!(f, "Invalid snapshot [{}]", r),
        }
    }
}

impl error::Error for ClusterError {}

impl From<io::Error> for ClusterError {
    fn from(error: io::Error) -> Self {
        ClusterError::Io(error)
    }
}

impl From<serde_json::Error> for ClusterError {
    fn from(error: serde_json::Error) -> Self {
        ClusterError::Decode(error.to_string())
    }
}

/// Read access to cluster objects (informer caches or a snapshot)
pub trait ClusterState: Send + Sync {
    fn subnets(&self) -> Result<Vec<Subnet>, ClusterError>;

    fn pods(&self) -> Result<Vec<Pod>, ClusterError>;

    fn services(&self) -> Result<Vec<Service>, ClusterError>;

    fn elastic_ips(&self, selector: &Selector) -> Result<Vec<ElasticIp>, ClusterError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pod(phase: PodPhase, restart_policy: RestartPolicy, reason: &str) -> Pod {
        Pod {
            phase,
            restart_policy,
            reason: reason.to_string(),
            ..Pod::default()
        }
    }

    #[test]
    fn test_pod_liveness() {
        use PodPhase::*;
        use RestartPolicy::*;
        assert!(pod(Running, Never, "").is_alive());
        assert!(pod(Pending, Always, "").is_alive());
        assert!(pod(Succeeded, Always, "").is_alive());
        assert!(!pod(Succeeded, OnFailure, "").is_alive());
        assert!(!pod(Succeeded, Never, "").is_alive());
        assert!(!pod(Failed, Never, "").is_alive());
        assert!(pod(Failed, OnFailure, "").is_alive());
        assert!(!pod(Failed, Always, "Evicted").is_alive());
    }

    #[test]
    fn test_announce_policy() {
        assert_eq!(AnnouncePolicy::parse("true"), Some(AnnouncePolicy::Cluster));
        assert_eq!(AnnouncePolicy::parse("cluster"), Some(AnnouncePolicy::Cluster));
        assert_eq!(AnnouncePolicy::parse("local"), Some(AnnouncePolicy::Local));
        assert_eq!(AnnouncePolicy::parse("false"), None);
        assert_eq!(AnnouncePolicy::parse(""), None);
    }

    #[test]
    fn test_pod_networks() {
        let mut pod = Pod::default();
        let annotations = &mut pod.metadata.annotations;
        annotations.insert(
            "ovn.kubernetes.io/ip_address".into(),
            "10.16.0.5,fd00:10:16::5".into(),
        );
        annotations.insert("ovn.kubernetes.io/logical_switch".into(), "ovn-default".into());
        annotations.insert(
            "attach.default.ovn.kubernetes.io/ip_address".into(),
            "172.17.0.5".into(),
        );
        annotations.insert(BGP_ANNOTATION.into(), "true".into());

        let networks = pod.networks();
        assert_eq!(networks.len(), 2);
        assert_eq!(networks[0].provider, "attach.default.ovn");
        assert_eq!(networks[0].subnet, None);
        assert_eq!(networks[1].provider, "ovn");
        assert_eq!(networks[1].subnet.as_deref(), Some("ovn-default"));
    }

    #[test]
    fn test_service_cluster_ip() {
        let mut svc = Service {
            cluster_ip: "10.96.0.10".into(),
            ..Service::default()
        };
        assert!(svc.is_cluster_ip());
        assert_eq!(svc.addresses(), vec!["10.96.0.10"]);

        svc.cluster_ips = vec!["10.96.0.10".into(), "fd00:96::10".into()];
        assert_eq!(svc.addresses().len(), 2);

        svc.cluster_ip = "None".into();
        assert!(!svc.is_cluster_ip());
        svc.cluster_ip = "".into();
        assert!(!svc.is_cluster_ip());
        svc.cluster_ip = "10.96.0.10".into();
        svc.service_type = ServiceType::NodePort;
        assert!(!svc.is_cluster_ip());
    }

    #[test]
    fn test_selector() {
        let mut labels = HashMap::new();
        labels.insert(VPC_NAT_GW_LABEL.to_string(), "gw1".to_string());
        assert!(Selector::everything().matches(&labels));
        assert!(Selector::matching(VPC_NAT_GW_LABEL, "gw1").matches(&labels));
        assert!(!Selector::matching(VPC_NAT_GW_LABEL, "gw2").matches(&labels));
        assert!(!Selector::matching("other", "gw1").matches(&labels));
    }
}
