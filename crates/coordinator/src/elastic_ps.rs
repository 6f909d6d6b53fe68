//! Versioned worker/PS state for elastic parameter-server training
//!
//! Workers and parameter servers agree on a cluster version before a PS
//! relaunch; the master stores each side's view keyed by node id and
//! version type.

use dashmap::DashMap;

use master_core::node::NodeId;

/// Cluster version bookkeeping for the elastic PS protocol
#[derive(Debug, Default)]
pub struct ElasticPsService {
    worker_versions: DashMap<(NodeId, String), i64>,
    ps_versions: DashMap<(NodeId, String), i64>,
}

impl ElasticPsService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_worker_version(&self, version_type: &str, task_id: NodeId) -> i64 {
        self.worker_versions
            .get(&(task_id, version_type.to_string()))
            .map(|v| *v)
            .unwrap_or(0)
    }

    pub fn update_worker_version(&self, task_id: NodeId, version_type: &str, version: i64) {
        self.worker_versions
            .insert((task_id, version_type.to_string()), version);
    }

    pub fn get_ps_version(&self, version_type: &str, task_id: NodeId) -> i64 {
        self.ps_versions
            .get(&(task_id, version_type.to_string()))
            .map(|v| *v)
            .unwrap_or(0)
    }

    pub fn update_ps_version(&self, task_id: NodeId, version_type: &str, version: i64) {
        self.ps_versions
            .insert((task_id, version_type.to_string()), version);
    }
}
