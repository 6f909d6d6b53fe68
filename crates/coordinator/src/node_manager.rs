//! Node lifecycle collaborator
//!
//! The servicer only depends on the `NodeManager` contract; the default
//! implementation keeps the node graph in memory and applies optimizer
//! plans when autoscaling kicks in.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use autoscale::job::{JobResource, JobResourceOptimizer};
use master_core::monitor::NodeUsageStore;
use master_core::node::{Node, NodeId, NodeType};

/// Contract the servicer holds against the node subsystem
pub trait NodeManager: Send + Sync {
    /// Workers currently running
    fn get_running_workers(&self) -> Vec<Node>;

    /// Running training nodes (workers, chief, evaluators)
    fn get_running_nodes(&self) -> Vec<Node>;

    /// All running nodes of every type
    fn get_all_running_nodes(&self) -> Vec<Node>;

    /// Kick off autoscaling
    fn start_auto_scale(&self);

    /// Record the reported usage of one node (memory in MiB)
    fn update_node_resource_usage(&self, node_type: NodeType, node_id: NodeId, cpu: f64, memory: u64);

    /// A parameter server announced it is ready for relaunch
    fn post_ps_ready(&self);

    /// The PS cluster workers should connect to next
    fn get_next_cluster_ps(&self) -> Vec<Node>;

    /// Whether the next PS cluster is fully ready
    fn ready_for_new_ps_cluster(&self) -> bool;
}

/// In-memory node manager driven by the job resource optimizer
pub struct JobNodeManager {
    nodes: Mutex<HashMap<NodeType, HashMap<NodeId, Node>>>,
    usage_store: Arc<NodeUsageStore>,
    job_optimizer: Arc<JobResourceOptimizer>,
    ps_ready: AtomicBool,
    autoscale_started: AtomicBool,
}

impl JobNodeManager {
    pub fn new(
        job_resource: &JobResource,
        job_optimizer: Arc<JobResourceOptimizer>,
        usage_store: Arc<NodeUsageStore>,
    ) -> Self {
        let nodes = job_resource.init_job_node_meta(
            3,
            |node_type, id| format!("{}-{}:2222", node_type, id),
            |node_type, id| format!("{}-{}", node_type, id),
        );
        Self {
            nodes: Mutex::new(nodes),
            usage_store,
            job_optimizer,
            ps_ready: AtomicBool::new(false),
            autoscale_started: AtomicBool::new(false),
        }
    }

    fn nodes_of_types(&self, types: &[NodeType]) -> Vec<Node> {
        let nodes = self.nodes.lock();
        types
            .iter()
            .filter_map(|t| nodes.get(t))
            .flat_map(|group| group.values().cloned())
            .collect()
    }

    /// Resize and retune node groups to the plan
    fn apply_plan(&self, plan: autoscale::ResourcePlan) {
        let mut nodes = self.nodes.lock();
        for (node_type, group) in plan.node_group_resources {
            let group_nodes = nodes.entry(node_type).or_default();
            for node in group_nodes.values_mut() {
                node.config_resource.update(
                    group.node_resource.cpu,
                    group.node_resource.memory,
                );
            }
            let current = group_nodes.len() as u64;
            if group.count == 0 || group.count == current {
                continue;
            }
            if group.count > current {
                for id in current..group.count {
                    let node = Node::new(node_type, id, format!("{}-{}", node_type, id))
                        .with_config_resource(group.node_resource.clone())
                        .with_service_addr(format!("{}-{}:2222", node_type, id));
                    group_nodes.insert(id, node);
                }
            } else {
                let drop_ids: Vec<_> = group_nodes
                    .keys()
                    .copied()
                    .filter(|id| *id >= group.count)
                    .collect();
                for id in drop_ids {
                    group_nodes.remove(&id);
                }
            }
            info!(
                node_type = %node_type,
                count = group.count,
                "Scaled node group to the plan"
            );
        }
    }

    pub fn node_count(&self, node_type: NodeType) -> usize {
        self.nodes
            .lock()
            .get(&node_type)
            .map(|g| g.len())
            .unwrap_or(0)
    }
}

impl NodeManager for JobNodeManager {
    fn get_running_workers(&self) -> Vec<Node> {
        self.nodes_of_types(&[NodeType::Worker, NodeType::Chief])
    }

    fn get_running_nodes(&self) -> Vec<Node> {
        self.nodes_of_types(&[NodeType::Worker, NodeType::Chief, NodeType::Evaluator])
    }

    fn get_all_running_nodes(&self) -> Vec<Node> {
        self.nodes_of_types(&[
            NodeType::Worker,
            NodeType::Chief,
            NodeType::Evaluator,
            NodeType::Ps,
        ])
    }

    fn start_auto_scale(&self) {
        if self.autoscale_started.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Starting job autoscaling");
        match self.job_optimizer.get_job_resource_plan() {
            Some(plan) => self.apply_plan(plan),
            None => info!("No resource plan, keeping the current node groups"),
        }
    }

    fn update_node_resource_usage(
        &self,
        node_type: NodeType,
        node_id: NodeId,
        cpu: f64,
        memory: u64,
    ) {
        let mut nodes = self.nodes.lock();
        let Some(node) = nodes.get_mut(&node_type).and_then(|g| g.get_mut(&node_id)) else {
            warn!(node = %format!("{}-{}", node_type, node_id), "Usage report for unknown node");
            return;
        };
        node.used_resource.cpu = cpu;
        node.used_resource.memory = memory;
        self.usage_store.record(&node.name, cpu, memory);
    }

    fn post_ps_ready(&self) {
        self.ps_ready.store(true, Ordering::SeqCst);
    }

    fn get_next_cluster_ps(&self) -> Vec<Node> {
        self.nodes_of_types(&[NodeType::Ps])
    }

    fn ready_for_new_ps_cluster(&self) -> bool {
        self.ps_ready.load(Ordering::SeqCst)
    }
}
