//! Resource plans proposed by optimizers

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use master_core::node::{NodeGroupResource, NodeResource, NodeType};

use crate::limits;

/// A recommendation of group- and node-level resource targets.
///
/// Plans are value types; an empty plan means "no change".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourcePlan {
    /// Target resources per node group
    pub node_group_resources: HashMap<NodeType, NodeGroupResource>,

    /// Target resources for individual nodes, keyed by node name
    pub node_resources: HashMap<String, NodeResource>,
}

impl ResourcePlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when the plan carries no recommendation at all
    pub fn empty(&self) -> bool {
        self.node_group_resources.is_empty() && self.node_resources.is_empty()
    }

    pub fn add_group(&mut self, node_type: NodeType, group: NodeGroupResource) -> &mut Self {
        self.node_group_resources.insert(node_type, group);
        self
    }

    /// The plan used to start a job when the optimizer has nothing to say
    pub fn default_plan() -> Self {
        let mut plan = Self::new();
        plan.add_group(
            NodeType::Worker,
            NodeGroupResource::new(
                limits::DEFAULT_WORKER_NUM,
                NodeResource::new(limits::DEFAULT_WORKER_CPU, limits::DEFAULT_WORKER_MEMORY),
            ),
        );
        plan.add_group(
            NodeType::Ps,
            NodeGroupResource::new(
                limits::DEFAULT_PS_NUM,
                NodeResource::new(limits::DEFAULT_PS_CPU, limits::DEFAULT_PS_MEMORY),
            ),
        );
        plan
    }

    /// Clamp proposed counts and resources to the global policy
    pub fn adjust_plan_by_context(&mut self) {
        for (node_type, group) in self.node_group_resources.iter_mut() {
            match node_type {
                NodeType::Worker => group.count = group.count.min(limits::MAX_WORKER_NUM),
                NodeType::Ps => group.count = group.count.min(limits::MAX_PS_NUM),
                _ => {}
            }
            group.node_resource.cpu = group.node_resource.cpu.min(limits::MAX_CPU_CORES);
            group.node_resource.memory = group.node_resource.memory.min(limits::MAX_MEMORY);
        }
        for resource in self.node_resources.values_mut() {
            resource.cpu = resource.cpu.min(limits::MAX_CPU_CORES);
            resource.memory = resource.memory.min(limits::MAX_MEMORY);
        }
    }
}
