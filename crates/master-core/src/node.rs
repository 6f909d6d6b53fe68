//! Node and resource type definitions for the elastic training master

use serde::{Deserialize, Serialize};
use std::fmt;

/// Node identifier within a node group
pub type NodeId = u64;

/// Node type enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// Training worker
    Worker,

    /// Parameter server
    Ps,

    /// Model evaluator
    Evaluator,

    /// Chief worker (rank 0)
    Chief,

    /// The master itself
    Master,
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeType::Worker => "worker",
            NodeType::Ps => "ps",
            NodeType::Evaluator => "evaluator",
            NodeType::Chief => "chief",
            NodeType::Master => "master",
        };
        f.write_str(name)
    }
}

/// Compute resources of a single node
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NodeResource {
    /// CPU cores
    pub cpu: f64,

    /// Memory in MiB
    pub memory: u64,

    /// GPU card type, if any
    pub gpu_type: Option<String>,

    /// Number of GPU cards
    pub gpu_num: u64,
}

impl NodeResource {
    /// Create a CPU/memory resource
    pub fn new(cpu: f64, memory: u64) -> Self {
        Self {
            cpu,
            memory,
            gpu_type: None,
            gpu_num: 0,
        }
    }

    /// Overwrite cpu/memory with non-zero values, keeping current ones otherwise
    pub fn update(&mut self, cpu: f64, memory: u64) {
        if cpu > 0.0 {
            self.cpu = cpu;
        }
        if memory > 0 {
            self.memory = memory;
        }
    }
}

/// Resource declaration for a group of same-typed nodes
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NodeGroupResource {
    /// Number of nodes in the group
    pub count: u64,

    /// Per-node resources
    pub node_resource: NodeResource,

    /// Scheduling priority class, if any
    pub priority: Option<String>,
}

impl NodeGroupResource {
    pub fn new(count: u64, node_resource: NodeResource) -> Self {
        Self {
            count,
            node_resource,
            priority: None,
        }
    }

    /// Overwrite count/cpu/memory with non-zero values, keeping current ones otherwise
    pub fn update(&mut self, count: u64, cpu: f64, memory: u64) {
        if count > 0 {
            self.count = count;
        }
        self.node_resource.update(cpu, memory);
    }
}

/// A node tracked by the master
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Node type
    pub node_type: NodeType,

    /// Node identifier within the group
    pub node_id: NodeId,

    /// Node name (usually the pod name)
    pub name: String,

    /// Resources the node was launched with
    pub config_resource: NodeResource,

    /// Most recently reported usage
    pub used_resource: NodeResource,

    /// Service address workers use to reach this node
    pub service_addr: String,

    /// Maximum relaunches before giving up on the node
    pub max_relaunch_count: u32,

    /// Relaunches so far
    pub relaunch_count: u32,
}

impl Node {
    pub fn new(node_type: NodeType, node_id: NodeId, name: String) -> Self {
        Self {
            node_type,
            node_id,
            name,
            config_resource: NodeResource::default(),
            used_resource: NodeResource::default(),
            service_addr: String::new(),
            max_relaunch_count: 0,
            relaunch_count: 0,
        }
    }

    pub fn with_config_resource(mut self, resource: NodeResource) -> Self {
        self.config_resource = resource;
        self
    }

    pub fn with_service_addr(mut self, addr: String) -> Self {
        self.service_addr = addr;
        self
    }
}
