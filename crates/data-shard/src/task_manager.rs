//! Task creation, dispatch and lifecycle tracking
//!
//! One coarse mutex guards the dataset registry and the per-worker task
//! start times; timeout callbacks always run outside of it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use master_core::config::TaskConfig;
use master_core::monitor::{unix_timestamp, PerfMonitor};
use master_core::node::{NodeId, NodeType};
use master_core::{Error, Result};

use crate::checkpoint::DatasetShardCheckpoint;
use crate::dataset::{DatasetManager, Task, TaskType};
use crate::splitter::DatasetSplitter;

/// Callback fired with the worker id when one of its evaluation tasks
/// times out
pub type TaskTimeoutCallback = Box<dyn Fn(NodeId) + Send + Sync>;

struct TaskManagerState {
    datasets: IndexMap<String, DatasetManager>,
    worker_start_task_time: HashMap<NodeId, u64>,
}

/// Creates and dispatches tasks and keeps track of their lifecycle
pub struct TaskManager {
    task_process_timeout: u64,
    sweep_interval: Duration,
    state: Mutex<TaskManagerState>,
    timeout_callbacks: Mutex<Vec<TaskTimeoutCallback>>,
    perf_monitor: Arc<PerfMonitor>,
    shutdown_tx: broadcast::Sender<()>,
}

impl TaskManager {
    pub fn new(config: &TaskConfig, perf_monitor: Arc<PerfMonitor>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        info!(
            timeout_secs = config.task_process_timeout_secs,
            "Task manager initialized"
        );
        Self {
            task_process_timeout: config.task_process_timeout_secs,
            sweep_interval: Duration::from_secs(config.sweep_interval_secs),
            state: Mutex::new(TaskManagerState {
                datasets: IndexMap::new(),
                worker_start_task_time: HashMap::new(),
            }),
            timeout_callbacks: Mutex::new(Vec::new()),
            perf_monitor,
            shutdown_tx,
        }
    }

    /// Publish a dataset. Idempotent on the name; non-positive sizes are
    /// rejected.
    pub fn new_dataset(
        &self,
        batch_size: u64,
        dataset_size: i64,
        dataset_name: &str,
        splitter: DatasetSplitter,
        task_type: TaskType,
    ) {
        info!(
            dataset = dataset_name,
            ?task_type,
            batch_size,
            dataset_size,
            "New dataset"
        );
        let mut state = self.state.lock();
        if state.datasets.contains_key(dataset_name) {
            info!(
                dataset = dataset_name,
                "Shards already initialized, ignoring shard parameters"
            );
            return;
        }
        if dataset_size <= 0 {
            error!(
                dataset = dataset_name,
                dataset_size, "No shards because the dataset size is not positive"
            );
            return;
        }
        state.datasets.insert(
            dataset_name.to_string(),
            DatasetManager::new(task_type, batch_size, splitter),
        );
    }

    /// Return the next task of the dataset, or `None` when no shard is
    /// currently schedulable
    pub fn get_dataset_task(
        &self,
        node_type: NodeType,
        node_id: NodeId,
        dataset_name: &str,
    ) -> Option<Task> {
        let mut state = self.state.lock();
        let dataset = state.datasets.get_mut(dataset_name)?;
        let task = dataset.get_task(node_type, node_id);
        if let Some(task) = &task {
            if task.task_type == TaskType::Evaluation && node_type == NodeType::Worker {
                // All workers stop training to evaluate in parallel, so
                // stale speed samples must not feed scaling decisions.
                info!("Reset the speed monitor, a worker starts evaluation");
                self.perf_monitor.reset_running_perf_monitor();
                self.perf_monitor.set_worker_start_eval_time(node_id);
            }
            if task.task_type == TaskType::Training {
                self.perf_monitor.add_running_worker(node_type, node_id);
                self.perf_monitor.update_worker_eval_time(node_id);
            }
        }
        state.worker_start_task_time.insert(node_id, unix_timestamp());
        task
    }

    /// Report the outcome of an in-flight task.
    ///
    /// Returns the resolved task and the worker that held it on success;
    /// `None` for unknown or already-finished task ids.
    pub fn report_dataset_task(
        &self,
        dataset_name: &str,
        task_id: i64,
        success: bool,
    ) -> Result<Option<(Task, NodeId)>> {
        let mut state = self.state.lock();
        let dataset = state
            .datasets
            .get_mut(dataset_name)
            .ok_or_else(|| Error::DatasetNotFound {
                dataset: dataset_name.to_string(),
            })?;
        match dataset.report_task_status(task_id, success) {
            Some(doing_task) if success => {
                let node_id = doing_task.node_id;
                state.worker_start_task_time.insert(node_id, unix_timestamp());
                Ok(Some((doing_task.task, node_id)))
            }
            _ => Ok(None),
        }
    }

    /// Requeue every in-flight task a dead worker held
    pub fn recover_tasks(&self, node_type: NodeType, node_id: NodeId) {
        let mut state = self.state.lock();
        for (name, dataset) in state.datasets.iter_mut() {
            let ids = dataset.doing_task_ids_of(node_type, node_id);
            if ids.is_empty() {
                continue;
            }
            for id in &ids {
                dataset.report_task_status(*id, false);
            }
            info!(
                dataset = %name,
                tasks = ?ids,
                node = %format!("{}-{}", node_type, node_id),
                "Recovered tasks of a dead worker"
            );
        }
    }

    /// True when every dataset stopped finishing tasks for longer than the
    /// process timeout
    pub fn task_hanged(&self) -> bool {
        let state = self.state.lock();
        if state.datasets.is_empty() {
            return false;
        }
        let now = unix_timestamp();
        state.datasets.values().all(|ds| {
            let end_time = ds.latest_task_end_time();
            end_time > 0 && now.saturating_sub(end_time) > self.task_process_timeout
        })
    }

    pub fn is_dataset_initialized(&self) -> bool {
        !self.state.lock().datasets.is_empty()
    }

    /// True once at least one dataset exists and all of them are completed
    pub fn finished(&self) -> bool {
        let state = self.state.lock();
        !state.datasets.is_empty() && state.datasets.values().all(|ds| ds.completed())
    }

    /// The training has started once any dataset completed a step
    pub fn training_started(&self) -> bool {
        let state = self.state.lock();
        state.datasets.values().any(|ds| ds.completed_step() > 0)
    }

    /// Whether the named dataset exists, and whether it is completed
    pub fn dataset_completed(&self, dataset_name: &str) -> Option<bool> {
        let state = self.state.lock();
        state.datasets.get(dataset_name).map(|ds| ds.completed())
    }

    /// Completed training steps of the named dataset
    pub fn dataset_completed_step(&self, dataset_name: &str) -> Option<u64> {
        let state = self.state.lock();
        state
            .datasets
            .get(dataset_name)
            .map(|ds| ds.completed_step())
    }

    pub fn get_dataset_epoch(&self, dataset_name: &str) -> u32 {
        let state = self.state.lock();
        match state.datasets.get(dataset_name) {
            Some(ds) => ds.epoch(),
            None => {
                error!(dataset = dataset_name, "No such dataset");
                0
            }
        }
    }

    pub fn reset_worker_start_task_time(&self, worker_id: NodeId) {
        self.state
            .lock()
            .worker_start_task_time
            .insert(worker_id, unix_timestamp());
    }

    pub fn set_task_timeout_callback(&self, callback: impl Fn(NodeId) + Send + Sync + 'static) {
        self.timeout_callbacks.lock().push(Box::new(callback));
    }

    pub fn get_dataset_checkpoint(&self, dataset_name: &str) -> Option<DatasetShardCheckpoint> {
        let state = self.state.lock();
        state
            .datasets
            .get(dataset_name)
            .map(|ds| ds.checkpoint(dataset_name))
    }

    /// Restore a dataset from a serialized checkpoint. Failures are logged
    /// and leave the current state untouched.
    pub fn restore_dataset_from_checkpoint(&self, content: &str) -> bool {
        let checkpoint = match DatasetShardCheckpoint::from_json(content) {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                error!(error = %e, "Failed to parse the shard checkpoint");
                return false;
            }
        };
        let mut state = self.state.lock();
        let Some(dataset) = state.datasets.get_mut(&checkpoint.dataset_name) else {
            error!(
                dataset = %checkpoint.dataset_name,
                "No dataset for the shard checkpoint"
            );
            return false;
        };
        dataset.restore_checkpoint(&checkpoint);
        info!(
            dataset = %checkpoint.dataset_name,
            shards = checkpoint.todo.len() + checkpoint.doing.len(),
            "Restored dataset from checkpoint"
        );
        true
    }

    /// Start the timeout sweeper when a process timeout is configured
    pub fn start(self: &Arc<Self>) {
        if self.task_process_timeout == 0 {
            return;
        }
        let manager = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            info!("Start the loop to monitor timeout tasks");
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(manager.sweep_interval) => {
                        manager.check_and_reassign_timeout_tasks();
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Timeout-task sweeper shutting down");
                        break;
                    }
                }
            }
        });
    }

    /// Stop the timeout sweeper
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }

    fn invoke_task_timeout_callbacks(&self, worker_id: NodeId) {
        for callback in self.timeout_callbacks.lock().iter() {
            callback(worker_id);
        }
    }

    /// One sweep over all datasets.
    ///
    /// At most one timed-out task per dataset is requeued per sweep so a
    /// slow evaluation round does not flood `todo`.
    pub fn check_and_reassign_timeout_tasks(&self) {
        let (snapshots, start_times) = {
            let state = self.state.lock();
            let snapshots: Vec<_> = state
                .datasets
                .iter()
                .map(|(name, ds)| (name.clone(), ds.doing_snapshot()))
                .collect();
            (snapshots, state.worker_start_task_time.clone())
        };

        let mut timed_out_workers = Vec::new();
        for (dataset_name, doing) in snapshots {
            let now = unix_timestamp();
            for (task_id, doing_task) in doing {
                let start = start_times.get(&doing_task.node_id).copied().unwrap_or(now);
                if doing_task.task.task_type == TaskType::Evaluation
                    && now.saturating_sub(start) > self.task_process_timeout
                {
                    warn!(
                        task = task_id,
                        node = %format!("{}-{}", doing_task.node_type, doing_task.node_id),
                        dataset = %dataset_name,
                        "Task timed out, requeueing"
                    );
                    let mut state = self.state.lock();
                    if let Some(dataset) = state.datasets.get_mut(&dataset_name) {
                        dataset.report_task_status(task_id, false);
                    }
                    timed_out_workers.push(doing_task.node_id);
                    break;
                }
            }
        }

        for worker_id in timed_out_workers {
            self.invoke_task_timeout_callbacks(worker_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::splitter::StorageType;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn new_manager(timeout_secs: u64) -> TaskManager {
        let config = TaskConfig {
            task_process_timeout_secs: timeout_secs,
            sweep_interval_secs: 30,
        };
        TaskManager::new(&config, Arc::new(PerfMonitor::new()))
    }

    fn splitter(size: u64) -> DatasetSplitter {
        DatasetSplitter::new("train", size, 100, 1, false, StorageType::Text).with_seed(1)
    }

    #[test]
    fn test_new_dataset_is_idempotent() {
        let manager = new_manager(0);
        manager.new_dataset(32, 320, "train", splitter(320), TaskType::Training);
        // Consume one task, then try to re-publish with a different geometry.
        manager.get_dataset_task(NodeType::Worker, 0, "train").unwrap();
        manager.new_dataset(32, 1000, "train", splitter(1000), TaskType::Training);

        let next = manager.get_dataset_task(NodeType::Worker, 0, "train").unwrap();
        assert_eq!(next.task_id, 1);
    }

    #[test]
    fn test_new_dataset_rejects_non_positive_size() {
        let manager = new_manager(0);
        manager.new_dataset(32, 0, "train", splitter(320), TaskType::Training);
        assert!(!manager.is_dataset_initialized());
    }

    #[test]
    fn test_report_unknown_dataset_is_error() {
        let manager = new_manager(0);
        let err = manager.report_dataset_task("missing", 0, true).unwrap_err();
        assert!(matches!(err, Error::DatasetNotFound { .. }));
    }

    #[test]
    fn test_dispatch_report_and_finish() {
        let manager = new_manager(0);
        manager.new_dataset(32, 320, "train", splitter(320), TaskType::Training);
        assert!(!manager.finished());

        let mut ids = Vec::new();
        while let Some(task) = manager.get_dataset_task(NodeType::Worker, 0, "train") {
            ids.push(task.task_id);
        }
        assert_eq!(ids, vec![0, 1, 2, 3]);

        for id in ids {
            let resolved = manager.report_dataset_task("train", id, true).unwrap();
            assert!(resolved.is_some());
        }
        assert!(manager.finished());
        assert!(manager.training_started());
    }

    #[test]
    fn test_recover_tasks_requeues_doing() {
        let manager = new_manager(0);
        manager.new_dataset(32, 320, "train", splitter(320), TaskType::Training);

        let a = manager.get_dataset_task(NodeType::Worker, 3, "train").unwrap();
        let b = manager.get_dataset_task(NodeType::Worker, 3, "train").unwrap();
        manager.get_dataset_task(NodeType::Worker, 4, "train").unwrap();

        manager.recover_tasks(NodeType::Worker, 3);

        // The dead worker's tasks come back before fresh shards.
        let redispatched = manager.get_dataset_task(NodeType::Worker, 4, "train").unwrap();
        assert!([a.task_id, b.task_id].contains(&redispatched.task_id));
    }

    #[test]
    fn test_timeout_sweep_requeues_one_task_and_fires_callback() {
        let manager = Arc::new(new_manager(0));
        manager.new_dataset(32, 320, "eval", splitter(320), TaskType::Evaluation);

        let fired = Arc::new(AtomicU64::new(0));
        let fired_clone = fired.clone();
        manager.set_task_timeout_callback(move |worker_id| {
            fired_clone.store(worker_id + 1, Ordering::SeqCst);
        });

        manager.get_dataset_task(NodeType::Worker, 7, "eval").unwrap();
        manager.get_dataset_task(NodeType::Worker, 7, "eval").unwrap();

        // Zero timeout: any in-flight evaluation work is overdue after a
        // second, but only the first task of the dataset is requeued per
        // sweep.
        std::thread::sleep(std::time::Duration::from_millis(1200));
        manager.check_and_reassign_timeout_tasks();

        assert_eq!(fired.load(Ordering::SeqCst), 8);
        let requeued = manager.get_dataset_task(NodeType::Worker, 9, "eval").unwrap();
        assert_eq!(requeued.task_id, 0);
    }

    #[test]
    fn test_task_hanged_requires_datasets() {
        let manager = new_manager(10);
        assert!(!manager.task_hanged());

        manager.new_dataset(32, 320, "train", splitter(320), TaskType::Training);
        // No task has finished yet, so the job is not hanged.
        assert!(!manager.task_hanged());
    }

    #[test]
    fn test_checkpoint_round_trip_preserves_progress() {
        let manager = new_manager(0);
        manager.new_dataset(32, 320, "train", splitter(320), TaskType::Training);

        let doing = manager.get_dataset_task(NodeType::Worker, 0, "train").unwrap();
        let checkpoint = manager.get_dataset_checkpoint("train").unwrap();
        let json = checkpoint.to_json().unwrap();

        assert!(manager.restore_dataset_from_checkpoint(&json));

        // The in-flight task is dispatchable again, ahead of fresh shards.
        let first = manager.get_dataset_task(NodeType::Worker, 1, "train").unwrap();
        assert_eq!(first.task_id, doing.task_id);
        assert_eq!(manager.get_dataset_epoch("train"), checkpoint.epoch);
    }

    #[test]
    fn test_restore_garbage_checkpoint_returns_false() {
        let manager = new_manager(0);
        assert!(!manager.restore_dataset_from_checkpoint("{broken"));
    }
}
