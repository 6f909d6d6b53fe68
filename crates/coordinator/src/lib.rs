//! Master coordination server for elastic distributed training
//!
//! This crate provides the master-side RPC surface that manages:
//! - **Task dispatch**: shard-task pull/report, retry and recovery
//! - **Progress**: global-step reports feeding the speed monitor
//! - **Autoscaling**: sample- and time-driven scale triggers
//! - **Rendezvous**: rank assignment and sync proxies
//! - **PS lifecycle**: cluster versions and PS relaunch queries

pub mod elastic_ps;
pub mod http_api;
pub mod messages;
pub mod metrics;
pub mod node_manager;
pub mod rendezvous;
pub mod server;
pub mod servicer;

pub use elastic_ps::ElasticPsService;
pub use metrics::{DebugMetricCollector, MetricCollector};
pub use node_manager::{JobNodeManager, NodeManager};
pub use rendezvous::{RendezvousDialect, RendezvousService, StaticRendezvousServer};
pub use server::MasterServer;
pub use servicer::MasterServicer;
