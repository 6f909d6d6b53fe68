//! Job-level resource configuration and the staged resource optimizer

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

use master_core::config::AutoscaleConfig;
use master_core::node::{Node, NodeGroupResource, NodeId, NodeType};

use crate::limits;
use crate::optimizer::{JobOptStage, OptimizeWorkerPhase, PlanConfig, ResourceOptimizer};
use crate::plan::ResourcePlan;

/// Resource configuration of a job, one group per node type
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobResource {
    pub node_group_resources: HashMap<NodeType, NodeGroupResource>,
}

impl JobResource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node_group_resource(&mut self, node_type: NodeType, group: NodeGroupResource) {
        self.node_group_resources.insert(node_type, group);
    }

    pub fn get_node_group_resource(&self, node_type: NodeType) -> Option<&NodeGroupResource> {
        self.node_group_resources.get(&node_type)
    }

    /// Overwrite a group's count/cpu/memory, creating the group when
    /// missing; zero values keep what is already configured
    pub fn update_node_group_resource(
        &mut self,
        node_type: NodeType,
        count: u64,
        cpu: f64,
        memory: u64,
    ) {
        self.node_group_resources
            .entry(node_type)
            .or_default()
            .update(count, cpu, memory);
    }

    pub fn node_types(&self) -> Vec<NodeType> {
        self.node_group_resources.keys().copied().collect()
    }

    fn group_node_num(&self, node_type: NodeType) -> u64 {
        self.node_group_resources
            .get(&node_type)
            .map(|g| g.count)
            .unwrap_or(0)
    }

    pub fn worker_num(&self) -> u64 {
        self.group_node_num(NodeType::Worker)
    }

    pub fn ps_num(&self) -> u64 {
        self.group_node_num(NodeType::Ps)
    }

    pub fn evaluator_num(&self) -> u64 {
        self.group_node_num(NodeType::Evaluator)
    }

    pub fn chief_num(&self) -> u64 {
        self.group_node_num(NodeType::Chief)
    }

    /// Seed the initial node graph from the configured groups
    pub fn init_job_node_meta(
        &self,
        relaunch_on_failure: u32,
        service_fn: impl Fn(NodeType, NodeId) -> String,
        name_fn: impl Fn(NodeType, NodeId) -> String,
    ) -> HashMap<NodeType, HashMap<NodeId, Node>> {
        let mut job_nodes = HashMap::new();
        for (node_type, group) in &self.node_group_resources {
            let mut group_nodes = HashMap::new();
            for id in 0..group.count {
                let mut node = Node::new(*node_type, id, name_fn(*node_type, id))
                    .with_config_resource(group.node_resource.clone())
                    .with_service_addr(service_fn(*node_type, id));
                node.max_relaunch_count = relaunch_on_failure;
                group_nodes.insert(id, node);
            }
            job_nodes.insert(*node_type, group_nodes);
        }
        job_nodes
    }
}

struct OptimizerState {
    worker_resource: NodeGroupResource,
    ps_resource: NodeGroupResource,
    original_worker_resource: NodeGroupResource,
    original_ps_resource: NodeGroupResource,
    stage: JobOptStage,
}

/// Generates resource configuration for a job across lifecycle stages.
///
/// The stage machine walks `Create → WorkerInitial → PsInitial → Running`;
/// user-declared values always win over optimizer proposals.
pub struct JobResourceOptimizer {
    state: Mutex<OptimizerState>,
    resource_optimizer: Arc<dyn ResourceOptimizer>,
    auto_worker_enabled: bool,
    auto_ps_enabled: bool,
}

impl JobResourceOptimizer {
    pub fn new(
        worker_resource: NodeGroupResource,
        ps_resource: NodeGroupResource,
        resource_optimizer: Arc<dyn ResourceOptimizer>,
        config: &AutoscaleConfig,
    ) -> Self {
        Self {
            state: Mutex::new(OptimizerState {
                original_worker_resource: worker_resource.clone(),
                original_ps_resource: ps_resource.clone(),
                worker_resource,
                ps_resource,
                stage: JobOptStage::Create,
            }),
            resource_optimizer,
            auto_worker_enabled: config.auto_worker_enabled,
            auto_ps_enabled: config.auto_ps_enabled,
        }
    }

    pub fn update_job_uuid(&self, job_uuid: &str) {
        self.resource_optimizer.update_job_uuid(job_uuid);
    }

    pub fn stage(&self) -> JobOptStage {
        self.state.lock().stage
    }

    pub fn worker_resource(&self) -> NodeGroupResource {
        self.state.lock().worker_resource.clone()
    }

    pub fn ps_resource(&self) -> NodeGroupResource {
        self.state.lock().ps_resource.clone()
    }

    /// Adjust the declared node groups before the job launches and move to
    /// `WorkerInitial`
    pub fn init_job_resource(&self, job_resource: &mut JobResource) {
        let mut state = self.state.lock();
        let mut plan = self
            .resource_optimizer
            .generate_opt_plan(state.stage, &PlanConfig::default());
        if plan.empty() {
            info!("Use the default plan to start the job");
            plan = ResourcePlan::default_plan();
        }
        state.stage = JobOptStage::WorkerInitial;

        if self.auto_worker_enabled {
            if let Some(worker) = plan.node_group_resources.get(&NodeType::Worker) {
                let (count, cpu, memory) = filter_by_original(
                    &state.original_worker_resource,
                    worker.count,
                    worker.node_resource.cpu,
                    worker.node_resource.memory,
                );
                state.worker_resource.update(count, cpu, memory);
            }
        }
        if self.auto_ps_enabled {
            if let Some(ps) = plan.node_group_resources.get(&NodeType::Ps) {
                let (count, cpu, memory) = filter_by_original(
                    &state.original_ps_resource,
                    ps.count,
                    ps.node_resource.cpu,
                    ps.node_resource.memory,
                );
                state.ps_resource.update(count, cpu, memory);
            }
        }

        job_resource.update_node_group_resource(
            NodeType::Worker,
            state.worker_resource.count,
            state.worker_resource.node_resource.cpu,
            state.worker_resource.node_resource.memory,
        );
        job_resource.update_node_group_resource(
            NodeType::Ps,
            state.ps_resource.count,
            state.ps_resource.node_resource.cpu,
            state.ps_resource.node_resource.memory,
        );

        // An evaluator with no usable declaration inherits the worker's.
        if let Some(evaluator) = job_resource.node_group_resources.get_mut(&NodeType::Evaluator) {
            if evaluator.node_resource.cpu < limits::MIN_VALID_CPU {
                evaluator.node_resource.cpu = state.worker_resource.node_resource.cpu;
            }
            if evaluator.node_resource.memory < limits::MIN_VALID_MEMORY {
                evaluator.node_resource.memory = state.worker_resource.node_resource.memory;
            }
        }
    }

    /// Cycle the stage machine and return the next verified plan, if any
    pub fn get_job_resource_plan(&self) -> Option<ResourcePlan> {
        let mut state = self.state.lock();
        let mut plan = match state.stage {
            JobOptStage::Create => return None,
            JobOptStage::WorkerInitial => {
                let plan = self.worker_plan_at_phase(OptimizeWorkerPhase::Initial);
                state.stage = JobOptStage::PsInitial;
                plan
            }
            JobOptStage::PsInitial => {
                let plan = self.ps_plan(state.stage);
                state.stage = JobOptStage::Running {
                    worker_sampled: false,
                };
                plan
            }
            JobOptStage::Running { worker_sampled } => {
                let plan = self.ps_plan(state.stage);
                if plan.empty() {
                    let phase = if worker_sampled {
                        OptimizeWorkerPhase::Stable
                    } else {
                        state.stage = JobOptStage::Running {
                            worker_sampled: true,
                        };
                        OptimizeWorkerPhase::Sample
                    };
                    self.worker_plan_at_phase(phase)
                } else {
                    plan
                }
            }
        };
        if plan.empty() {
            return None;
        }

        if plan.node_group_resources.contains_key(&NodeType::Worker) {
            verify_optimized_group_resource(&mut state, &mut plan, NodeType::Worker);
        }
        if plan.node_group_resources.contains_key(&NodeType::Ps) {
            verify_optimized_group_resource(&mut state, &mut plan, NodeType::Ps);
        }
        plan.adjust_plan_by_context();
        Some(plan)
    }

    /// Raise the worker memory after an OOM termination.
    ///
    /// The node's configured memory never decreases.
    pub fn adjust_oom_worker_resource(&self, node: &mut Node) {
        let mut state = self.state.lock();
        if self.auto_worker_enabled && state.stage == JobOptStage::WorkerInitial {
            let plan = self
                .resource_optimizer
                .generate_oom_recovery_plan(&[node.name.clone()], JobOptStage::Create);
            if let Some(worker) = plan.node_group_resources.get(&NodeType::Worker) {
                state.worker_resource.node_resource.memory = state
                    .worker_resource
                    .node_resource
                    .memory
                    .max(worker.node_resource.memory);
            }
        } else {
            let plan = self.worker_plan_at_phase(OptimizeWorkerPhase::Initial);
            if let Some(worker) = plan.node_group_resources.get(&NodeType::Worker) {
                let (count, cpu, memory) = (
                    worker.count,
                    worker.node_resource.cpu,
                    worker.node_resource.memory,
                );
                state.worker_resource.update(count, cpu, memory);
            }
        }
        let grown = (node.config_resource.memory as f64 * limits::INCREMENTAL_MEMORY_FACTOR) as u64;
        node.config_resource.memory = state
            .worker_resource
            .node_resource
            .memory
            .max(grown)
            .max(state.original_worker_resource.node_resource.memory);
        info!(
            node = %node.name,
            memory = node.config_resource.memory,
            "Incremented the memory of an OOM worker"
        );
    }

    /// Adjust PS resources after an OOM termination.
    ///
    /// Either a full PS re-plan is returned, or the node memory is raised
    /// in place and the returned plan is empty. Never both.
    pub fn adjust_oom_ps_resource(&self, node: &mut Node, training_started: bool) -> ResourcePlan {
        let mut state = self.state.lock();
        let plan = self
            .resource_optimizer
            .generate_oom_recovery_plan(&[node.name.clone()], JobOptStage::PsInitial);
        if let Some(ps) = plan.node_group_resources.get(&NodeType::Ps).cloned() {
            if !training_started && ps.count > 0 && ps.node_resource.memory < limits::MAX_MEMORY {
                let mut plan = plan;
                verify_optimized_group_resource(&mut state, &mut plan, NodeType::Ps);
                plan.adjust_plan_by_context();
                return plan;
            }
            state.ps_resource.node_resource.memory = state
                .ps_resource
                .node_resource
                .memory
                .max(ps.node_resource.memory);
        }
        let grown = (node.config_resource.memory as f64 * limits::INCREMENTAL_MEMORY_FACTOR) as u64;
        node.config_resource.memory = state
            .ps_resource
            .node_resource
            .memory
            .max(grown)
            .max(state.original_ps_resource.node_resource.memory);
        info!(
            node = %node.name,
            memory = node.config_resource.memory,
            "Incremented the memory of an OOM parameter server"
        );
        ResourcePlan::new()
    }

    fn worker_plan_at_phase(&self, phase: OptimizeWorkerPhase) -> ResourcePlan {
        let plan = self.resource_optimizer.generate_opt_plan(
            JobOptStage::WorkerInitial,
            &PlanConfig::for_phase(phase),
        );
        if plan.empty() {
            info!(?phase, "No plan to adjust the worker group");
        }
        plan
    }

    fn ps_plan(&self, stage: JobOptStage) -> ResourcePlan {
        self.resource_optimizer
            .generate_opt_plan(stage, &PlanConfig::default())
    }
}

/// Normalize an optimized group against the user declaration and record
/// the result as the live group resource
fn verify_optimized_group_resource(
    state: &mut OptimizerState,
    plan: &mut ResourcePlan,
    node_type: NodeType,
) {
    let Some(group) = plan.node_group_resources.get_mut(&node_type) else {
        return;
    };
    let (count, cpu, memory) = match node_type {
        NodeType::Worker => {
            let filtered = filter_by_original(
                &state.original_worker_resource,
                group.count,
                group.node_resource.cpu,
                group.node_resource.memory,
            );
            state.worker_resource.count = filtered.0;
            state.worker_resource.node_resource.cpu = filtered.1;
            state.worker_resource.node_resource.memory = filtered.2;
            filtered
        }
        NodeType::Ps => {
            let filtered = filter_by_original(
                &state.original_ps_resource,
                group.count,
                group.node_resource.cpu,
                group.node_resource.memory,
            );
            state.ps_resource.count = filtered.0.min(limits::MAX_PS_NUM);
            state.ps_resource.node_resource.cpu = filtered.1;
            state.ps_resource.node_resource.memory = filtered.2;
            filtered
        }
        _ => return,
    };
    group.count = count;
    group.node_resource.cpu = cpu;
    group.node_resource.memory = memory;
}

/// Abandon optimized values wherever the user pinned the resource
fn filter_by_original(
    original: &NodeGroupResource,
    count: u64,
    cpu: f64,
    memory: u64,
) -> (u64, f64, u64) {
    let count = if original.count > 0 {
        original.count
    } else {
        count
    };
    let memory = if original.node_resource.memory >= limits::MIN_VALID_MEMORY {
        original.node_resource.memory
    } else {
        memory
    };
    let cpu = if original.node_resource.cpu >= limits::MIN_VALID_CPU {
        original.node_resource.cpu
    } else {
        cpu
    };
    (count, cpu, memory)
}
