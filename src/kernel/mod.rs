//! Interface to the kernel routing table
//!
//! Routes are modelled after rtnetlink messages. Implementations wrap a
//! netlink socket; tests use an in-memory table.

use std::error;
use std::fmt;
use std::io;
use std::net::IpAddr;

use async_trait::async_trait;
use ipnetwork::IpNetwork;

use crate::rib::Family;

/// Route installed by the kernel
pub const RTPROT_KERNEL: u8 = 2;
/// Routes learned through BGP, owned by this agent
pub const RTPROT_BGP: u8 = 186;

pub const RT_SCOPE_UNIVERSE: u8 = 0;
pub const RT_SCOPE_SITE: u8 = 200;
pub const RT_SCOPE_LINK: u8 = 253;
pub const RT_SCOPE_HOST: u8 = 254;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteKind {
    Unicast,
    Local,
    Broadcast,
    Unreachable,
    Blackhole,
    Other(u8),
}

#[derive(Clone, Debug, PartialEq)]
pub struct KernelRoute {
    pub link_index: u32,
    pub src: Option<IpAddr>,
    pub dst: IpNetwork,
    pub gw: Option<IpAddr>,
    pub protocol: u8,
    pub kind: RouteKind,
}

impl KernelRoute {
    /// Is this route owned by this agent
    pub fn is_bgp(&self) -> bool {
        self.protocol == RTPROT_BGP
    }
}

impl fmt::Display for KernelRoute {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "<KernelRoute {}", self.dst)?;
        if let Some(gw) = self.gw {
            write!(f, " via {}", gw)?;
        }
        if let Some(src) = self.src {
            write!(f, " src {}", src)?;
        }
        write!(f, " dev {} proto {}>", self.link_index, self.protocol)
    }
}

/// Match routes by destination and/or protocol, `None` matches anything
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RouteFilter {
    pub dst: Option<IpNetwork>,
    pub protocol: Option<u8>,
}

impl RouteFilter {
    pub fn dst(dst: IpNetwork) -> Self {
        Self {
            dst: Some(dst),
            protocol: None,
        }
    }

    pub fn with_protocol(mut self, protocol: u8) -> Self {
        self.protocol = Some(protocol);
        self
    }

    pub fn matches(&self, route: &KernelRoute) -> bool {
        self.dst.map(|dst| dst == route.dst).unwrap_or(true)
            && self.protocol.map(|p| p == route.protocol).unwrap_or(true)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Link {
    pub index: u32,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LinkAddress {
    pub addr: IpAddr,
    pub scope: u8,
}

#[derive(Debug)]
pub enum KernelError {
    /// No link with this name
    LinkNotFound(String),
    /// No route towards this address
    NoRoute(IpAddr),
    /// Netlink request failed
    Io(io::Error),
    /// Some other issue happened. [reason]
    Other(String),
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Kernel Error: ")?;
        use KernelError::*;
        match self {
            LinkNotFound(name) => write!(f, "Link not found [{}]", name),
            NoRoute(addr) => write!(f, "No route to {}", addr),
            Io(err) => write!(f, "{}", err),
            Other(r) => write!(f, "{}", r),
        }
    }
}

impl error::Error for KernelError {}

impl From<io::Error> for KernelError {
    fn from(error: io::Error) -> Self {
        KernelError::Io(error)
    }
}

/// Capability to read and mutate the kernel routing table
#[async_trait]
pub trait KernelRoutes: Send + Sync {
    /// List routes (all families) matching the filter
    async fn route_list(&self, filter: RouteFilter) -> Result<Vec<KernelRoute>, KernelError>;

    /// Route the kernel would use to reach `dst`
    async fn route_get(&self, dst: IpAddr) -> Result<KernelRoute, KernelError>;

    /// Create or replace the route for its destination
    async fn route_replace(&self, route: &KernelRoute) -> Result<(), KernelError>;

    async fn route_del(&self, route: &KernelRoute) -> Result<(), KernelError>;

    async fn link_by_name(&self, name: &str) -> Result<Link, KernelError>;

    async fn addr_list(&self, link: &Link, family: Family)
        -> Result<Vec<LinkAddress>, KernelError>;
}

/// Pick the address with the widest scope (universe < site < link < host)
/// The first address wins among equally scoped ones
pub fn select_best_address(addrs: &[LinkAddress]) -> Option<IpAddr> {
    addrs.iter().min_by_key(|a| a.scope).map(|a| a.addr)
}
