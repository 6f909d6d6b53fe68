//! Per-dataset shard queues and task lifecycle
//!
//! A dataset owns three collections: `todo` (pending tasks in dispatch
//! order), `doing` (in-flight tasks keyed by id, insertion-ordered) and
//! `done` (completed ids). Tasks only ever live in one of them.

use std::collections::{HashSet, VecDeque};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use master_core::monitor::unix_timestamp;
use master_core::node::{NodeId, NodeType};

use crate::checkpoint::{DatasetShardCheckpoint, TaskState};
use crate::splitter::DatasetSplitter;

/// Kind of work a task carries
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Training,
    Evaluation,
    Prediction,
    /// Sentinel telling a worker to wait for more work
    Wait,
    None,
}

/// A contiguous subrange of a dataset, the unit of data-parallel work.
/// Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Shard {
    /// Source dataset or table name
    pub name: String,

    /// First record index (inclusive)
    pub start: u64,

    /// Last record index (exclusive)
    pub end: u64,

    /// Explicit record indices for table storage; empty for text
    #[serde(default)]
    pub record_indices: Vec<u64>,
}

/// An assignment of a shard to one worker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    /// Dense, monotonic id within the dataset; -1 for pseudo-tasks
    pub task_id: i64,

    pub task_type: TaskType,

    pub shard: Shard,
}

impl Task {
    pub fn new(task_id: i64, task_type: TaskType, shard: Shard) -> Self {
        Self {
            task_id,
            task_type,
            shard,
        }
    }

    /// A shard-less pseudo-task of the given type
    pub fn pseudo(task_type: TaskType) -> Self {
        Self {
            task_id: -1,
            task_type,
            shard: Shard {
                name: String::new(),
                start: 0,
                end: 0,
                record_indices: Vec::new(),
            },
        }
    }
}

/// A task currently assigned to a worker
#[derive(Debug, Clone)]
pub struct DoingTask {
    pub task: Task,
    pub node_type: NodeType,
    pub node_id: NodeId,
    pub start_time: u64,
}

/// Shard queues and counters for one dataset
pub struct DatasetManager {
    task_type: TaskType,
    batch_size: u64,
    splitter: DatasetSplitter,
    todo: VecDeque<Task>,
    doing: IndexMap<i64, DoingTask>,
    done: HashSet<i64>,
    next_task_id: i64,
    completed_step: u64,
    latest_task_end_time: u64,
}

impl DatasetManager {
    pub fn new(task_type: TaskType, batch_size: u64, splitter: DatasetSplitter) -> Self {
        Self {
            task_type,
            batch_size,
            splitter,
            todo: VecDeque::new(),
            doing: IndexMap::new(),
            done: HashSet::new(),
            next_task_id: 0,
            completed_step: 0,
            latest_task_end_time: 0,
        }
    }

    /// Pop the next pending task and move it to `doing`.
    ///
    /// Refills `todo` from the splitter's next epoch when it runs dry.
    pub fn get_task(&mut self, node_type: NodeType, node_id: NodeId) -> Option<Task> {
        if self.todo.is_empty() {
            self.fill_todo_from_next_epoch();
        }
        let task = self.todo.pop_front()?;
        self.doing.insert(
            task.task_id,
            DoingTask {
                task: task.clone(),
                node_type,
                node_id,
                start_time: unix_timestamp(),
            },
        );
        Some(task)
    }

    fn fill_todo_from_next_epoch(&mut self) {
        let Some(shards) = self.splitter.next_epoch_shards() else {
            return;
        };
        for shard in shards {
            let task = Task::new(self.next_task_id, self.task_type, shard);
            self.next_task_id += 1;
            self.todo.push_back(task);
        }
        tracing::info!(
            epoch = self.splitter.epoch(),
            pending = self.todo.len(),
            "Started new epoch of shard tasks"
        );
    }

    /// Resolve an in-flight task.
    ///
    /// Unknown ids (including already-completed tasks) are a no-op
    /// returning `None`. Failed tasks go back to the head of `todo` so
    /// they are retried before fresh shards.
    pub fn report_task_status(&mut self, task_id: i64, success: bool) -> Option<DoingTask> {
        let doing_task = self.doing.shift_remove(&task_id)?;
        if success {
            self.done.insert(task_id);
            if doing_task.task.task_type == TaskType::Training {
                self.completed_step += 1;
            }
            self.latest_task_end_time = unix_timestamp();
        } else {
            self.todo.push_front(doing_task.task.clone());
        }
        Some(doing_task)
    }

    /// True once the splitter is exhausted and no task is pending or in
    /// flight
    pub fn completed(&self) -> bool {
        self.splitter.exhausted() && self.todo.is_empty() && self.doing.is_empty()
    }

    pub fn task_type(&self) -> TaskType {
        self.task_type
    }

    pub fn batch_size(&self) -> u64 {
        self.batch_size
    }

    pub fn epoch(&self) -> u32 {
        self.splitter.epoch()
    }

    pub fn completed_step(&self) -> u64 {
        self.completed_step
    }

    pub fn latest_task_end_time(&self) -> u64 {
        self.latest_task_end_time
    }

    pub fn todo_len(&self) -> usize {
        self.todo.len()
    }

    /// Snapshot of the in-flight map, for iteration without the manager
    /// lock
    pub fn doing_snapshot(&self) -> Vec<(i64, DoingTask)> {
        self.doing
            .iter()
            .map(|(id, task)| (*id, task.clone()))
            .collect()
    }

    /// Ids of in-flight tasks assigned to the given worker
    pub fn doing_task_ids_of(&self, node_type: NodeType, node_id: NodeId) -> Vec<i64> {
        self.doing
            .iter()
            .filter(|(_, t)| t.node_type == node_type && t.node_id == node_id)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Serialize queue state for a shard checkpoint
    pub fn checkpoint(&self, dataset_name: &str) -> DatasetShardCheckpoint {
        DatasetShardCheckpoint {
            dataset_name: dataset_name.to_string(),
            todo: self.todo.iter().map(TaskState::from_task).collect(),
            doing: self
                .doing
                .values()
                .map(|d| TaskState::from_task(&d.task))
                .collect(),
            epoch: self.splitter.epoch(),
            splitter_state: self.splitter.state(),
        }
    }

    /// Rebuild queue state from a shard checkpoint.
    ///
    /// In-flight tasks go to the head of `todo` since their assignment is
    /// lost with the workers that held them.
    pub fn restore_checkpoint(&mut self, checkpoint: &DatasetShardCheckpoint) {
        self.todo.clear();
        self.doing.clear();
        for state in checkpoint.doing.iter().chain(checkpoint.todo.iter()) {
            self.todo.push_back(state.to_task());
        }
        let max_id = self.todo.iter().map(|t| t.task_id).max().unwrap_or(-1);
        self.next_task_id = self.next_task_id.max(max_id + 1);
        self.splitter.restore_state(&checkpoint.splitter_state);
    }
}
