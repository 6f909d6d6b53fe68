//! Training speed monitoring
//!
//! Collects global-step reports from workers, derives steps-per-second
//! samples and tracks which workers are actively training.

use std::collections::{HashMap, HashSet, VecDeque};

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::node::{NodeId, NodeType};

/// Maximum speed samples kept in the sliding window
const MAX_SPEED_SAMPLES: usize = 60;

/// Maximum usage records kept per node
const MAX_USAGE_RECORDS: usize = 120;

#[derive(Default)]
struct PerfState {
    last_record: Option<(u64, u64)>,
    completed_global_step: u64,
    speed_samples: VecDeque<f64>,
    running_workers: HashSet<(NodeType, NodeId)>,
    worker_eval_start: HashMap<NodeId, u64>,
    worker_eval_secs: HashMap<NodeId, u64>,
}

/// Monitors the training speed reported by workers
#[derive(Default)]
pub struct PerfMonitor {
    state: RwLock<PerfState>,
}

impl PerfMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a `(global_step, timestamp)` report and derive a speed sample
    pub fn collect_global_step(&self, step: u64, timestamp: u64) {
        let mut state = self.state.write();
        if let Some((last_step, last_ts)) = state.last_record {
            if timestamp > last_ts && step >= last_step {
                let speed = (step - last_step) as f64 / (timestamp - last_ts) as f64;
                state.speed_samples.push_back(speed);
                if state.speed_samples.len() > MAX_SPEED_SAMPLES {
                    state.speed_samples.pop_front();
                }
            }
        }
        state.last_record = Some((step, timestamp));
        state.completed_global_step = state.completed_global_step.max(step);
    }

    /// The latest completed global step
    pub fn completed_global_step(&self) -> u64 {
        self.state.read().completed_global_step
    }

    /// Number of speed samples collected since the last reset
    pub fn sample_count(&self) -> usize {
        self.state.read().speed_samples.len()
    }

    /// Average steps-per-second over the sample window
    pub fn running_speed(&self) -> f64 {
        let state = self.state.read();
        if state.speed_samples.is_empty() {
            return 0.0;
        }
        state.speed_samples.iter().sum::<f64>() / state.speed_samples.len() as f64
    }

    pub fn add_running_worker(&self, node_type: NodeType, node_id: NodeId) {
        self.state.write().running_workers.insert((node_type, node_id));
    }

    pub fn remove_running_worker(&self, node_type: NodeType, node_id: NodeId) {
        self.state.write().running_workers.remove(&(node_type, node_id));
    }

    pub fn running_workers(&self) -> Vec<(NodeType, NodeId)> {
        self.state.read().running_workers.iter().copied().collect()
    }

    /// Drop the speed window and the running-worker set.
    ///
    /// Called when workers leave training to evaluate so stale samples do
    /// not feed the next scaling decision.
    pub fn reset_running_perf_monitor(&self) {
        let mut state = self.state.write();
        state.speed_samples.clear();
        state.last_record = None;
        state.running_workers.clear();
    }

    /// Stamp the time a worker entered evaluation
    pub fn set_worker_start_eval_time(&self, node_id: NodeId) {
        let now = unix_timestamp();
        self.state.write().worker_eval_start.insert(node_id, now);
    }

    /// Fold a finished evaluation into the worker's accumulated eval time
    pub fn update_worker_eval_time(&self, node_id: NodeId) {
        let now = unix_timestamp();
        let mut state = self.state.write();
        if let Some(start) = state.worker_eval_start.remove(&node_id) {
            let elapsed = now.saturating_sub(start);
            *state.worker_eval_secs.entry(node_id).or_insert(0) += elapsed;
        }
    }

    /// Seconds the worker has spent evaluating so far
    pub fn worker_eval_secs(&self, node_id: NodeId) -> u64 {
        self.state
            .read()
            .worker_eval_secs
            .get(&node_id)
            .copied()
            .unwrap_or(0)
    }
}

/// Per-node resource usage reported through `report_used_resource`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UsageSample {
    /// CPU cores in use
    pub cpu: f64,

    /// Memory in use, MiB
    pub memory: u64,
}

/// Bounded history of usage samples per node name
#[derive(Debug, Default)]
pub struct NodeUsageStore {
    records: DashMap<String, VecDeque<UsageSample>>,
}

impl NodeUsageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, node_name: &str, cpu: f64, memory: u64) {
        let mut history = self.records.entry(node_name.to_string()).or_default();
        history.push_back(UsageSample { cpu, memory });
        if history.len() > MAX_USAGE_RECORDS {
            history.pop_front();
        }
    }

    /// Highest memory sample across the named nodes, or all nodes when empty
    pub fn peak_memory(&self, node_names: &[String]) -> u64 {
        self.records
            .iter()
            .filter(|entry| node_names.is_empty() || node_names.contains(entry.key()))
            .flat_map(|entry| entry.value().iter().map(|s| s.memory).collect::<Vec<_>>())
            .max()
            .unwrap_or(0)
    }

    /// Highest CPU sample across all nodes
    pub fn peak_cpu(&self) -> f64 {
        self.records
            .iter()
            .flat_map(|entry| entry.value().iter().map(|s| s.cpu).collect::<Vec<_>>())
            .fold(0.0, f64::max)
    }

    pub fn node_count(&self) -> usize {
        self.records.len()
    }
}

/// Get current unix timestamp in seconds
pub fn unix_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
