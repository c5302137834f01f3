pub mod cluster;
pub mod collector;
pub mod config;
pub mod controller;
pub mod error;
pub mod kernel;
#[cfg(test)]
mod mock;
pub mod nexthop;
pub mod reconciler;
pub mod rib;
pub mod speaker;
pub mod syncer;
pub mod utils;

pub use config::ServerConfig;
pub use controller::Controller;
pub use error::Error;
