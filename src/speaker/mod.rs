//! Interface to the BGP speaker process
//!
//! The speaker owns BGP sessions and its RIB. This crate only asks it to
//! list, add and delete paths, and subscribes to its best-path updates.

use std::error;
use std::fmt;
use std::net::IpAddr;

use async_trait::async_trait;
use bgp_rs::{NLRIEncoding, PathAttribute};
use futures::stream::BoxStream;
use ipnetwork::IpNetwork;

use crate::rib::{Family, NextHop};
use crate::utils::{network_from_prefix, ParseError};

/// RIB table to query on the speaker
/// Self-originated paths are only ever looked up in the global RIB
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum TableType {
    Global,
}

impl fmt::Display for TableType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TableType::Global => write!(f, "Global"),
        }
    }
}

/// Speaker-wide BGP settings
#[derive(Clone, Debug, PartialEq)]
pub struct GlobalConfig {
    pub asn: u32,
    pub router_id: IpAddr,
}

impl fmt::Display for GlobalConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "<Global AS{} router-id={}>", self.asn, self.router_id)
    }
}

/// A BGP neighbor and the families negotiated with it
#[derive(Clone, Debug, PartialEq)]
pub struct PeerConfig {
    pub address: IpAddr,
    pub peer_as: u32,
    pub families: Vec<Family>,
}

impl fmt::Display for PeerConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "<Peer {} AS{} [{}]>",
            self.address,
            self.peer_as,
            self.families
                .iter()
                .map(|f| f.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

/// A single BGP path, either submitted to or received from the speaker
#[derive(Clone, Debug)]
pub struct Path {
    pub family: Family,
    pub nlri: NLRIEncoding,
    pub attributes: Vec<PathAttribute>,
    /// Neighbor the path was learned from (received paths),
    /// or the neighbor it was built for (submitted paths)
    pub neighbor: Option<IpAddr>,
    pub is_withdraw: bool,
}

impl Path {
    /// Destination prefix carried in the NLRI
    pub fn network(&self) -> Result<IpNetwork, ParseError> {
        match &self.nlri {
            NLRIEncoding::IP(prefix) => network_from_prefix(prefix),
            nlri => Err(ParseError::new(format!("Unsupported NLRI: {:?}", nlri))),
        }
    }

    /// First next hop carrying attribute, if any
    pub fn next_hop(&self) -> Option<NextHop<'_>> {
        NextHop::from_attributes(&self.attributes)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let prefix = self
            .network()
            .map(|n| n.to_string())
            .unwrap_or_else(|_| "?".to_string());
        let next_hop = self
            .next_hop()
            .and_then(|nh| nh.addr().ok())
            .map(|nh| nh.to_string())
            .unwrap_or_else(|| "?".to_string());
        write!(
            f,
            "<Path {} {} via {}{}>",
            self.family,
            prefix,
            next_hop,
            if self.is_withdraw { " withdraw" } else { "" },
        )
    }
}

/// A RIB destination and all of its known paths
#[derive(Clone, Debug)]
pub struct Destination {
    pub prefix: IpNetwork,
    pub paths: Vec<Path>,
}

/// Stream of best-path updates
/// Each item is an announcement or a withdrawal (`Path::is_withdraw`)
pub type PathStream = BoxStream<'static, Path>;

#[derive(Debug)]
pub enum SpeakerError {
    /// Speaker could not be reached. [reason]
    Transport(String),
    /// Speaker refused the request. [reason]
    Rejected(String),
    /// Some other issue happened. [reason]
    Other(String),
}

impl fmt::Display for SpeakerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Speaker Error: ")?;
        use SpeakerError::*;
        match self {
            Transport(r) => write!(f, "Transport error [{}]", r),
            Rejected(r) => write!(f, "Request rejected [{}]", r),
            Other(r) => write!(f, "{}", r),
        }
    }
}

impl error::Error for SpeakerError {}

/// Capability of the BGP speaker this agent drives
#[async_trait]
pub trait BgpSpeaker: Send + Sync {
    /// Start the BGP instance with the local AS and router ID
    async fn start_bgp(&self, global: &GlobalConfig) -> Result<(), SpeakerError>;

    /// Configure a neighbor session
    async fn add_peer(&self, peer: &PeerConfig) -> Result<(), SpeakerError>;

    /// List destinations (with all paths) in a RIB table for a family
    async fn list_path(
        &self,
        family: Family,
        table: TableType,
    ) -> Result<Vec<Destination>, SpeakerError>;

    /// Originate a path
    async fn add_path(&self, path: Path) -> Result<(), SpeakerError>;

    /// Withdraw a previously originated path
    async fn delete_path(&self, path: Path) -> Result<(), SpeakerError>;

    /// Subscribe to best-path changes
    async fn watch_best_paths(&self) -> Result<PathStream, SpeakerError>;
}
