//! Shard-progress checkpointing
//!
//! The checkpoint is a JSON document a worker can fetch and report back so
//! dataset progress survives master restarts.

use serde::{Deserialize, Serialize};

use master_core::{Error, Result};

use crate::dataset::{Shard, Task, TaskType};
use crate::splitter::SplitterState;

/// Serialized form of one queued task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskState {
    pub task_id: i64,
    pub task_type: TaskType,
    pub shard: Shard,
}

impl TaskState {
    pub fn from_task(task: &Task) -> Self {
        Self {
            task_id: task.task_id,
            task_type: task.task_type,
            shard: task.shard.clone(),
        }
    }

    pub fn to_task(&self) -> Task {
        Task::new(self.task_id, self.task_type, self.shard.clone())
    }
}

/// Round-trippable snapshot of a dataset's queue state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetShardCheckpoint {
    pub dataset_name: String,
    pub todo: Vec<TaskState>,
    pub doing: Vec<TaskState>,
    pub epoch: u32,
    pub splitter_state: SplitterState,
}

impl DatasetShardCheckpoint {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| Error::CheckpointRestore {
            reason: e.to_string(),
        })
    }
}
