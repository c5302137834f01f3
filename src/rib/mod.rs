pub mod attributes;
pub mod families;
mod parse;

pub use attributes::{build_path, NextHop};
pub use families::Family;
pub use parse::{parse_path, ParsedPath};

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use ipnetwork::IpNetwork;

use crate::utils::normalize_network;

/// Prefixes for a single address family
pub type PrefixSet = BTreeSet<IpNetwork>;

/// Prefixes keyed by address family
/// Used for both the routes we expect to announce and the routes
/// currently announced by the speaker. Rebuilt every reconcile pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RouteMap(HashMap<Family, PrefixSet>);

impl RouteMap {
    pub fn new() -> Self {
        Self(HashMap::with_capacity(2))
    }

    /// Insert a prefix into the bucket of its own address family
    pub fn insert(&mut self, network: IpNetwork) -> bool {
        let network = normalize_network(network);
        self.0
            .entry(Family::for_network(&network))
            .or_insert_with(PrefixSet::new)
            .insert(network)
    }

    pub fn get(&self, family: Family) -> Option<&PrefixSet> {
        self.0.get(&family)
    }

    /// Sorted prefixes for a family, empty if the family has none
    pub fn prefixes(&self, family: Family) -> Vec<IpNetwork> {
        self.get(family)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, network: &IpNetwork) -> bool {
        self.0
            .get(&Family::for_network(network))
            .map(|set| set.contains(network))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.0.values().map(|set| set.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Extend<IpNetwork> for RouteMap {
    fn extend<T: IntoIterator<Item = IpNetwork>>(&mut self, iter: T) {
        for network in iter {
            self.insert(network);
        }
    }
}

impl std::iter::FromIterator<IpNetwork> for RouteMap {
    fn from_iter<T: IntoIterator<Item = IpNetwork>>(iter: T) -> Self {
        let mut map = RouteMap::new();
        map.extend(iter);
        map
    }
}

impl fmt::Display for RouteMap {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "<RouteMap ipv4={} ipv6={}>",
            self.get(Family::IPV4_UNICAST).map(|s| s.len()).unwrap_or(0),
            self.get(Family::IPV6_UNICAST).map(|s| s.len()).unwrap_or(0),
        )
    }
}

/// Routes to add and remove so the announced set matches the expected set
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RouteDiff {
    pub to_add: Vec<IpNetwork>,
    pub to_delete: Vec<IpNetwork>,
}

impl RouteDiff {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_delete.is_empty()
    }
}

/// Compute `expected - announced` (to add) and `announced - expected` (to delete)
/// Output is sorted, since both inputs are ordered sets
pub fn route_diff(expected: &PrefixSet, announced: &PrefixSet) -> RouteDiff {
    RouteDiff {
        to_add: expected.difference(announced).cloned().collect(),
        to_delete: announced.difference(expected).cloned().collect(),
    }
}
