//! Master Core - Foundation for the elastic training master
//!
//! Provides node/resource types, error handling, configuration and the
//! training-speed monitor shared by the master subsystems.

pub mod config;
pub mod error;
pub mod log;
pub mod monitor;
pub mod node;

pub use config::{AutoscaleConfig, MasterConfig, ServerConfig, TaskConfig};
pub use error::{Error, Result};
pub use monitor::{unix_timestamp, NodeUsageStore, PerfMonitor, UsageSample};
pub use node::{Node, NodeGroupResource, NodeId, NodeResource, NodeType};
