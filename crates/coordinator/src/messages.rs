//! Request and response messages of the master RPC surface
//!
//! Names are semantic, mirroring what workers and the master exchange;
//! the transport is JSON over HTTP.

use serde::{Deserialize, Serialize};

use data_shard::dataset::{Shard, Task, TaskType};
use master_core::node::{Node, NodeId, NodeType};

/// Empty acknowledgement body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Empty {}

/// Worker pulling its next task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    pub worker_type: NodeType,
    pub worker_id: NodeId,
    pub dataset_name: String,
}

/// Shard carried inside a task message
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShardMessage {
    pub name: String,
    pub start: u64,
    pub end: u64,
    #[serde(default)]
    pub indices: Vec<u64>,
}

/// Task handed to a worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMessage {
    pub task_id: i64,
    pub task_type: TaskType,
    pub shard: ShardMessage,
    pub model_version: i64,
}

impl TaskMessage {
    /// A task carrying no work
    pub fn empty(model_version: i64) -> Self {
        Self {
            task_id: -1,
            task_type: TaskType::None,
            shard: ShardMessage::default(),
            model_version,
        }
    }

    /// The sentinel telling a worker to ask again later
    pub fn wait(model_version: i64) -> Self {
        Self {
            task_type: TaskType::Wait,
            ..Self::empty(model_version)
        }
    }

    pub fn from_task(task: &Task, model_version: i64) -> Self {
        Self {
            task_id: task.task_id,
            task_type: task.task_type,
            shard: ShardMessage::from_shard(&task.shard),
            model_version,
        }
    }
}

impl ShardMessage {
    pub fn from_shard(shard: &Shard) -> Self {
        Self {
            name: shard.name.clone(),
            start: shard.start,
            end: shard.end,
            indices: shard.record_indices.clone(),
        }
    }
}

/// Worker reporting the outcome of a task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub dataset_name: String,
    pub task_id: i64,
    /// Non-empty when the task failed
    #[serde(default)]
    pub err_message: String,
}

/// Rank-0 worker declaring the dataset geometry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetShardParams {
    pub batch_size: u64,
    #[serde(default)]
    pub num_minibatches_per_shard: u64,
    pub dataset_size: i64,
    pub shuffle: bool,
    pub num_epochs: u32,
    pub dataset_name: String,
    pub storage_type: String,
    pub task_type: TaskType,
}

/// Progress report of the global training step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalStepRecord {
    pub global_step: u64,
    pub timestamp: u64,
}

/// Per-node resource usage report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsedResourceRequest {
    pub node_type: NodeType,
    pub node_id: NodeId,
    pub cpu: f64,
    pub memory_bytes: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TensorStats {
    pub variable_count: u64,
    pub total_variable_size: u64,
    pub max_variable_size: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpStats {
    pub op_count: u64,
    pub update_op_count: u64,
    pub input_fetch_dur: u64,
    pub flops: u64,
}

/// One-shot model structure metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetricReport {
    pub tensor_stats: TensorStats,
    pub op_stats: OpStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardCheckpointRequest {
    pub dataset_name: String,
}

/// Serialized shard checkpoint, empty when none exists
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardCheckpointMessage {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportShardCheckpointResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetEpochRequest {
    pub dataset_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetEpochResponse {
    pub epoch: u32,
}

/// Rendezvous synchronization request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRequest {
    pub rendezvous_id: u64,
    pub worker_host: String,
    pub worker_local_process_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommRankRequest {
    pub worker_host: String,
    pub worker_local_process_id: u64,
}

/// Rank assignment; which fields are meaningful depends on the dialect
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommRankResponse {
    pub dialect: String,
    pub rank_id: u64,
    pub local_rank: u64,
    pub local_size: u64,
    pub cross_rank: u64,
    pub cross_size: u64,
    pub rendezvous_port: u16,
    pub master_addr: String,
    pub master_port: u16,
    pub world_size: u64,
    pub rendezvous_id: u64,
}

/// Coarse training-loop state of one worker process
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TrainingLoopStatus {
    Start,
    End,
    Pending,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingLoopStatusReport {
    pub status: TrainingLoopStatus,
    pub worker_host: String,
    pub worker_local_process_id: u64,
    pub ddp_server_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrestopReport {
    pub worker_host: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetClusterVersionRequest {
    pub task_type: NodeType,
    pub task_id: NodeId,
    pub version_type: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterVersionResponse {
    pub version: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateClusterVersionRequest {
    pub task_type: NodeType,
    pub task_id: NodeId,
    pub version_type: String,
    pub version: i64,
}

/// Materialized node view returned by the queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeMeta {
    pub node_type: NodeType,
    pub addr: String,
    pub cpu: f64,
    pub memory: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_type: Option<String>,
    #[serde(default)]
    pub gpu_num: u64,
}

impl NodeMeta {
    pub fn from_node(node: &Node) -> Self {
        Self {
            node_type: node.node_type,
            addr: node.service_addr.clone(),
            cpu: node.config_resource.cpu,
            memory: node.config_resource.memory,
            gpu_type: node.config_resource.gpu_type.clone(),
            gpu_num: node.config_resource.gpu_num,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryPsNodesResponse {
    pub ps_nodes: Vec<NodeMeta>,
    pub new_ps_ready: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunningNodesResponse {
    pub nodes: Vec<NodeMeta>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingStatusResponse {
    pub status: TrainingLoopStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_message_from_task() {
        let task = Task::new(
            7,
            TaskType::Training,
            Shard {
                name: "train".to_string(),
                start: 100,
                end: 200,
                record_indices: vec![],
            },
        );
        let msg = TaskMessage::from_task(&task, 3);

        assert_eq!(msg.task_id, 7);
        assert_eq!(msg.shard.start, 100);
        assert_eq!(msg.model_version, 3);
    }

    #[test]
    fn test_wait_message_carries_no_shard() {
        let msg = TaskMessage::wait(0);
        assert_eq!(msg.task_id, -1);
        assert_eq!(msg.task_type, TaskType::Wait);
        assert_eq!(msg.shard.end, 0);
    }

    #[test]
    fn test_task_result_default_error_message() {
        let result: TaskResult =
            serde_json::from_str(r#"{"dataset_name": "train", "task_id": 1}"#).unwrap();
        assert!(result.err_message.is_empty());
    }
}
