//! Resource optimizer capability and its two implementations
//!
//! `LocalOptimizer` derives plans from locally observed step rates and
//! reported node usage. `BrainOptimizer` delegates to an external
//! recommender. Both degrade to an empty plan instead of failing.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use master_core::monitor::{NodeUsageStore, PerfMonitor};
use master_core::node::{NodeGroupResource, NodeResource, NodeType};

use crate::limits;
use crate::plan::ResourcePlan;

/// Coarse phase of the job lifecycle governing which plan is requested
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobOptStage {
    Create,
    WorkerInitial,
    PsInitial,
    /// Normal training; `worker_sampled` is set after the first worker
    /// plan request in this stage
    Running { worker_sampled: bool },
}

/// Which worker-tuning phase a plan request targets
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OptimizeWorkerPhase {
    Initial,
    Sample,
    Stable,
}

/// Tuning hints passed along with a plan request
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanConfig {
    pub worker_optimize_phase: Option<OptimizeWorkerPhase>,
}

impl PlanConfig {
    pub fn for_phase(phase: OptimizeWorkerPhase) -> Self {
        Self {
            worker_optimize_phase: Some(phase),
        }
    }
}

/// Capability to propose resource plans for a job
pub trait ResourceOptimizer: Send + Sync {
    /// Propose a plan for the given stage; empty when there is no
    /// recommendation
    fn generate_opt_plan(&self, stage: JobOptStage, config: &PlanConfig) -> ResourcePlan;

    /// Propose a plan to relaunch OOM-terminated nodes; empty when there
    /// is no recommendation
    fn generate_oom_recovery_plan(&self, node_names: &[String], stage: JobOptStage)
        -> ResourcePlan;

    fn update_job_uuid(&self, job_uuid: &str);
}

/// Optimizer that only looks at what this master observed itself
pub struct LocalOptimizer {
    job_uuid: Mutex<String>,
    perf_monitor: Arc<PerfMonitor>,
    usage_store: Arc<NodeUsageStore>,
}

impl LocalOptimizer {
    pub fn new(
        job_uuid: impl Into<String>,
        perf_monitor: Arc<PerfMonitor>,
        usage_store: Arc<NodeUsageStore>,
    ) -> Self {
        Self {
            job_uuid: Mutex::new(job_uuid.into()),
            perf_monitor,
            usage_store,
        }
    }

    /// Worker sizing from observed usage peaks; empty without data
    fn worker_plan(&self) -> ResourcePlan {
        let peak_memory = self.usage_store.peak_memory(&[]);
        if peak_memory == 0 {
            return ResourcePlan::new();
        }
        let memory = grow_memory(peak_memory);
        let cpu = self.usage_store.peak_cpu().ceil().max(limits::MIN_VALID_CPU);

        let speed = self.perf_monitor.running_speed();
        let running = self.perf_monitor.running_workers().len() as u64;
        // Keep the count while speed is unknown; otherwise probe one more
        // worker than is currently running.
        let count = if speed > 0.0 { running + 1 } else { 0 };

        let mut plan = ResourcePlan::new();
        plan.add_group(
            NodeType::Worker,
            NodeGroupResource::new(count, NodeResource::new(cpu, memory)),
        );
        plan
    }

    /// PS sizing from observed usage peaks; empty without data
    fn ps_plan(&self) -> ResourcePlan {
        let peak_memory = self.usage_store.peak_memory(&[]);
        if peak_memory == 0 {
            return ResourcePlan::new();
        }
        let mut plan = ResourcePlan::new();
        plan.add_group(
            NodeType::Ps,
            NodeGroupResource::new(0, NodeResource::new(0.0, grow_memory(peak_memory))),
        );
        plan
    }
}

impl ResourceOptimizer for LocalOptimizer {
    fn generate_opt_plan(&self, stage: JobOptStage, _config: &PlanConfig) -> ResourcePlan {
        match stage {
            // Nothing observed before the job starts.
            JobOptStage::Create => ResourcePlan::new(),
            JobOptStage::WorkerInitial => self.worker_plan(),
            JobOptStage::PsInitial | JobOptStage::Running { .. } => self.ps_plan(),
        }
    }

    fn generate_oom_recovery_plan(
        &self,
        node_names: &[String],
        stage: JobOptStage,
    ) -> ResourcePlan {
        let peak = self.usage_store.peak_memory(node_names);
        if peak == 0 {
            return ResourcePlan::new();
        }
        let node_type = match stage {
            JobOptStage::PsInitial => NodeType::Ps,
            _ => NodeType::Worker,
        };
        let mut plan = ResourcePlan::new();
        plan.add_group(
            node_type,
            NodeGroupResource::new(0, NodeResource::new(0.0, grow_memory(peak))),
        );
        info!(
            nodes = ?node_names,
            memory = grow_memory(peak),
            "Local OOM recovery plan from observed peak usage"
        );
        plan
    }

    fn update_job_uuid(&self, job_uuid: &str) {
        *self.job_uuid.lock() = job_uuid.to_string();
    }
}

fn grow_memory(memory: u64) -> u64 {
    ((memory as f64) * limits::INCREMENTAL_MEMORY_FACTOR) as u64
}

/// Client of the external plan recommender
pub trait BrainClient: Send + Sync {
    fn fetch_opt_plan(
        &self,
        job_uuid: &str,
        stage: JobOptStage,
        config: &PlanConfig,
    ) -> master_core::Result<ResourcePlan>;

    fn fetch_oom_recovery_plan(
        &self,
        job_uuid: &str,
        node_names: &[String],
        stage: JobOptStage,
    ) -> master_core::Result<ResourcePlan>;
}

/// Optimizer backed by the external recommender service
pub struct BrainOptimizer {
    job_uuid: Mutex<String>,
    client: Arc<dyn BrainClient>,
}

impl BrainOptimizer {
    pub fn new(job_uuid: impl Into<String>, client: Arc<dyn BrainClient>) -> Self {
        Self {
            job_uuid: Mutex::new(job_uuid.into()),
            client,
        }
    }
}

impl ResourceOptimizer for BrainOptimizer {
    fn generate_opt_plan(&self, stage: JobOptStage, config: &PlanConfig) -> ResourcePlan {
        let job_uuid = self.job_uuid.lock().clone();
        match self.client.fetch_opt_plan(&job_uuid, stage, config) {
            Ok(plan) => plan,
            Err(e) => {
                warn!(error = %e, ?stage, "Recommender unavailable, using an empty plan");
                ResourcePlan::new()
            }
        }
    }

    fn generate_oom_recovery_plan(
        &self,
        node_names: &[String],
        stage: JobOptStage,
    ) -> ResourcePlan {
        let job_uuid = self.job_uuid.lock().clone();
        match self
            .client
            .fetch_oom_recovery_plan(&job_uuid, node_names, stage)
        {
            Ok(plan) => plan,
            Err(e) => {
                warn!(error = %e, ?stage, "Recommender unavailable, using an empty plan");
                ResourcePlan::new()
            }
        }
    }

    fn update_job_uuid(&self, job_uuid: &str) {
        *self.job_uuid.lock() = job_uuid.to_string();
    }
}
