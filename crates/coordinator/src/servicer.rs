//! Master RPC dispatch surface
//!
//! Mediates every worker-to-master interaction. The servicer's own mutex
//! only guards its model version, training start time and autoscale
//! latch; collaborators carry their own locking.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use data_shard::dataset::TaskType;
use data_shard::splitter::{DatasetSplitter, StorageType};
use data_shard::TaskManager;
use master_core::config::AutoscaleConfig;
use master_core::monitor::{unix_timestamp, PerfMonitor};
use master_core::node::NodeType;
use master_core::{Error, Result};

use crate::elastic_ps::ElasticPsService;
use crate::messages::*;
use crate::metrics::MetricCollector;
use crate::node_manager::NodeManager;
use crate::rendezvous::{RendezvousDialect, RendezvousService};

/// Shards default to one hundred minibatches when workers do not say
/// otherwise
const DEFAULT_NUM_MINIBATCHES_PER_SHARD: u64 = 100;

struct ServicerState {
    version: i64,
    start_training_time: Option<u64>,
    start_autoscale: bool,
}

/// Master service implementation
pub struct MasterServicer {
    task_manager: Arc<TaskManager>,
    node_manager: Arc<dyn NodeManager>,
    perf_monitor: Arc<PerfMonitor>,
    rendezvous_server: Option<Arc<dyn RendezvousService>>,
    metric_collector: Option<Arc<dyn MetricCollector>>,
    elastic_ps_service: Option<Arc<ElasticPsService>>,
    autoscale_config: AutoscaleConfig,
    state: Mutex<ServicerState>,
}

impl MasterServicer {
    pub fn new(
        task_manager: Arc<TaskManager>,
        node_manager: Arc<dyn NodeManager>,
        perf_monitor: Arc<PerfMonitor>,
        autoscale_config: AutoscaleConfig,
    ) -> Self {
        Self {
            task_manager,
            node_manager,
            perf_monitor,
            rendezvous_server: None,
            metric_collector: None,
            elastic_ps_service: None,
            autoscale_config,
            state: Mutex::new(ServicerState {
                version: 0,
                start_training_time: None,
                start_autoscale: false,
            }),
        }
    }

    pub fn with_rendezvous_server(mut self, server: Arc<dyn RendezvousService>) -> Self {
        self.rendezvous_server = Some(server);
        self
    }

    pub fn with_metric_collector(mut self, collector: Arc<dyn MetricCollector>) -> Self {
        self.metric_collector = Some(collector);
        self
    }

    pub fn with_elastic_ps_service(mut self, service: Arc<ElasticPsService>) -> Self {
        self.elastic_ps_service = Some(service);
        self
    }

    pub fn get_model_version(&self) -> i64 {
        self.state.lock().version
    }

    pub fn task_manager(&self) -> &Arc<TaskManager> {
        &self.task_manager
    }

    /// Worker pulls its next shard-task.
    ///
    /// An unknown dataset yields an empty task. When the dataset is not
    /// complete but no shard is schedulable, the worker is told to WAIT,
    /// unless a rendezvous server is active and more than one worker is
    /// still running.
    pub fn get_task(&self, request: TaskRequest) -> TaskMessage {
        let version = {
            let mut state = self.state.lock();
            if state.start_training_time.is_none() {
                state.start_training_time = Some(unix_timestamp());
            }
            state.version
        };

        if self
            .task_manager
            .dataset_completed(&request.dataset_name)
            .is_none()
        {
            return TaskMessage::empty(version);
        }

        let task = self.task_manager.get_dataset_task(
            request.worker_type,
            request.worker_id,
            &request.dataset_name,
        );
        let mut res = match task {
            Some(task) => TaskMessage::from_task(&task, version),
            None => TaskMessage::empty(version),
        };

        if res.task_id < 0 {
            let completed = self
                .task_manager
                .dataset_completed(&request.dataset_name)
                .unwrap_or(true);
            if !completed {
                if self.rendezvous_server.is_some() {
                    // With a rendezvous in play only the last running
                    // worker keeps polling; the others exit.
                    if self.node_manager.get_running_workers().len() == 1 {
                        res = TaskMessage::wait(version);
                    }
                } else {
                    res = TaskMessage::wait(version);
                }
            }
        }

        {
            let _state = self.state.lock();
            self.task_manager
                .reset_worker_start_task_time(request.worker_id);
        }
        res
    }

    /// Worker reports success or failure of a task
    pub fn report_task_result(&self, request: TaskResult) -> Result<Empty> {
        let success = request.err_message.is_empty();
        if !success {
            warn!(error = %request.err_message, "Worker reported a task error");
        }
        let resolved =
            self.task_manager
                .report_dataset_task(&request.dataset_name, request.task_id, success)?;

        self.check_start_auto_scale_without_training();

        if let Some((task, _)) = resolved {
            if self.metric_collector.is_some() && task.task_type == TaskType::Prediction {
                self.collect_runtime_stats();
                self.check_start_auto_scale_worker();
            }
        }
        Ok(Empty {})
    }

    /// Rank-0 worker declares the dataset geometry
    pub fn report_dataset_shard_params(&self, request: DatasetShardParams) -> Result<Empty> {
        if request.batch_size == 0 {
            return Err(Error::InvalidArgument {
                message: "batch_size must be positive".to_string(),
            });
        }
        let num_minibatches = if request.num_minibatches_per_shard > 0 {
            request.num_minibatches_per_shard
        } else {
            DEFAULT_NUM_MINIBATCHES_PER_SHARD
        };
        let shard_size = request.batch_size * num_minibatches;
        let splitter = DatasetSplitter::new(
            request.dataset_name.clone(),
            request.dataset_size.max(0) as u64,
            shard_size,
            request.num_epochs.max(1),
            request.shuffle,
            StorageType::parse(&request.storage_type),
        );
        self.task_manager.new_dataset(
            request.batch_size,
            request.dataset_size,
            &request.dataset_name,
            splitter,
            request.task_type,
        );
        if let Some(collector) = &self.metric_collector {
            collector.collect_dataset_metric(
                &request.dataset_name,
                request.dataset_size,
                &request.storage_type,
            );
            if request.task_type == TaskType::Training {
                collector.collect_training_hyper_params(request.num_epochs, request.batch_size);
            }
        }
        Ok(Empty {})
    }

    pub fn reset_sync(&self, request: SyncRequest) -> Result<SyncResponse> {
        let server = self.rendezvous_server()?;
        Ok(SyncResponse {
            success: server.reset_sync(
                &request.worker_host,
                request.worker_local_process_id,
                request.rendezvous_id,
            ),
        })
    }

    pub fn barrier_sync(&self, request: SyncRequest) -> Result<SyncResponse> {
        let server = self.rendezvous_server()?;
        Ok(SyncResponse {
            success: server.barrier_sync(
                &request.worker_host,
                request.worker_local_process_id,
                request.rendezvous_id,
            ),
        })
    }

    /// Resolve a worker process's communication rank
    pub fn get_comm_rank(&self, request: CommRankRequest) -> Result<CommRankResponse> {
        let server = self.rendezvous_server()?;
        let mut res = CommRankResponse::default();
        if let Some(info) =
            server.get_worker_host_rank(&request.worker_host, request.worker_local_process_id)
        {
            res.dialect = info.dialect.as_str().to_string();
            res.rank_id = info.rank_id;
            res.local_rank = info.local_rank;
            res.local_size = info.local_size;
            match info.dialect {
                RendezvousDialect::Horovod => {
                    res.cross_rank = info.cross_rank;
                    res.cross_size = info.cross_size;
                    res.rendezvous_port = server.get_rendezvous_port();
                }
                RendezvousDialect::Ddp => {
                    res.master_addr = info.master_addr;
                    res.master_port = info.master_port;
                }
            }
        }
        res.world_size = server.get_size() as u64;
        res.rendezvous_id = server.get_rendezvous_id();
        Ok(res)
    }

    pub fn report_training_loop_status(&self, request: TrainingLoopStatusReport) -> Result<Empty> {
        let Some(server) = &self.rendezvous_server else {
            warn!("The rendezvous server does not exist");
            return Ok(Empty {});
        };
        info!(
            host = %request.worker_host,
            process = request.worker_local_process_id,
            ddp_port = request.ddp_server_port,
            "Training loop status report"
        );
        match request.status {
            TrainingLoopStatus::Start => server.add_process(
                &request.worker_host,
                request.worker_local_process_id,
                request.ddp_server_port,
            ),
            TrainingLoopStatus::End => {
                server.remove_process(&request.worker_host, request.worker_local_process_id)
            }
            TrainingLoopStatus::Pending => {}
        }
        Ok(Empty {})
    }

    pub fn report_prestop(&self, request: PrestopReport) -> Result<Empty> {
        let server = self.rendezvous_server()?;
        server.report_prestop(&request.worker_host);
        Ok(Empty {})
    }

    pub fn ready_for_ps_relaunch(&self) -> Result<Empty> {
        self.node_manager.post_ps_ready();
        Ok(Empty {})
    }

    pub fn get_shard_checkpoint(&self, request: ShardCheckpointRequest) -> Result<ShardCheckpointMessage> {
        let content = match self.task_manager.get_dataset_checkpoint(&request.dataset_name) {
            Some(checkpoint) => checkpoint.to_json()?,
            None => String::new(),
        };
        Ok(ShardCheckpointMessage { content })
    }

    pub fn report_shard_checkpoint(
        &self,
        request: ShardCheckpointMessage,
    ) -> ReportShardCheckpointResponse {
        ReportShardCheckpointResponse {
            success: self
                .task_manager
                .restore_dataset_from_checkpoint(&request.content),
        }
    }

    pub fn report_used_resource(&self, request: UsedResourceRequest) -> Empty {
        let memory_mib = request.memory_bytes / (1024 * 1024);
        self.node_manager.update_node_resource_usage(
            request.node_type,
            request.node_id,
            request.cpu,
            memory_mib,
        );
        Empty {}
    }

    pub fn get_dataset_epoch(&self, request: DatasetEpochRequest) -> DatasetEpochResponse {
        DatasetEpochResponse {
            epoch: self.task_manager.get_dataset_epoch(&request.dataset_name),
        }
    }

    pub fn report_model_metric(&self, request: ModelMetricReport) -> Empty {
        if let Some(collector) = &self.metric_collector {
            collector.collect_model_metric(&request.tensor_stats, &request.op_stats);
        }
        Empty {}
    }

    /// Worker pushes `(step, timestamp)`; enough samples trigger
    /// autoscaling
    pub fn report_global_step(&self, request: GlobalStepRecord) -> Empty {
        self.perf_monitor
            .collect_global_step(request.global_step, request.timestamp);
        self.collect_runtime_stats();
        self.check_start_auto_scale_worker();
        Empty {}
    }

    pub fn get_cluster_version(&self, request: GetClusterVersionRequest) -> ClusterVersionResponse {
        let Some(service) = &self.elastic_ps_service else {
            return ClusterVersionResponse::default();
        };
        let version = match request.task_type {
            NodeType::Worker => service.get_worker_version(&request.version_type, request.task_id),
            NodeType::Ps => service.get_ps_version(&request.version_type, request.task_id),
            _ => 0,
        };
        ClusterVersionResponse { version }
    }

    pub fn update_cluster_version(&self, request: UpdateClusterVersionRequest) -> Empty {
        let Some(service) = &self.elastic_ps_service else {
            return Empty {};
        };
        match request.task_type {
            NodeType::Worker => service.update_worker_version(
                request.task_id,
                &request.version_type,
                request.version,
            ),
            NodeType::Ps => {
                service.update_ps_version(request.task_id, &request.version_type, request.version)
            }
            _ => {}
        }
        Empty {}
    }

    pub fn query_ps_nodes(&self) -> QueryPsNodesResponse {
        let ps_nodes = self
            .node_manager
            .get_next_cluster_ps()
            .iter()
            .map(NodeMeta::from_node)
            .collect();
        QueryPsNodesResponse {
            ps_nodes,
            new_ps_ready: self.node_manager.ready_for_new_ps_cluster(),
        }
    }

    pub fn query_running_nodes(&self) -> RunningNodesResponse {
        RunningNodesResponse {
            nodes: self
                .node_manager
                .get_all_running_nodes()
                .iter()
                .map(NodeMeta::from_node)
                .collect(),
        }
    }

    pub fn query_training_status(&self) -> TrainingStatusResponse {
        TrainingStatusResponse {
            status: if self.task_manager.training_started() {
                TrainingLoopStatus::Start
            } else {
                TrainingLoopStatus::Pending
            },
        }
    }

    fn rendezvous_server(&self) -> Result<&Arc<dyn RendezvousService>> {
        self.rendezvous_server
            .as_ref()
            .ok_or_else(|| Error::Unavailable {
                component: "rendezvous server".to_string(),
            })
    }

    fn collect_runtime_stats(&self) {
        if let Some(collector) = &self.metric_collector {
            let nodes = self.node_manager.get_running_nodes();
            collector.collect_runtime_stats(&self.perf_monitor, &nodes);
        }
    }

    /// Fire autoscaling once enough speed samples have accumulated
    fn check_start_auto_scale_worker(&self) {
        let sample_count = self.perf_monitor.sample_count();
        let should_start = {
            let mut state = self.state.lock();
            if !state.start_autoscale
                && sample_count >= self.autoscale_config.sample_count_to_adjust_worker
            {
                state.start_autoscale = true;
                true
            } else {
                false
            }
        };
        if should_start {
            info!(samples = sample_count, "Start autoscale");
            self.node_manager.start_auto_scale();
        }
    }

    /// Fire autoscaling once for jobs that never complete a global step
    fn check_start_auto_scale_without_training(&self) {
        let should_start = {
            let mut state = self.state.lock();
            if state.start_autoscale || self.perf_monitor.completed_global_step() != 0 {
                false
            } else {
                match state.start_training_time {
                    Some(start)
                        if unix_timestamp().saturating_sub(start)
                            > self.autoscale_config.seconds_to_autoscale_worker =>
                    {
                        state.start_autoscale = true;
                        true
                    }
                    _ => false,
                }
            }
        };
        if should_start {
            info!("Start autoscale for non-training jobs");
            self.node_manager.start_auto_scale();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use master_core::config::TaskConfig;
    use master_core::node::{Node, NodeId};
    use parking_lot::Mutex as PlMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::rendezvous::StaticRendezvousServer;

    #[derive(Default)]
    struct StubNodeManager {
        running_workers: PlMutex<Vec<Node>>,
        autoscale_calls: AtomicUsize,
        last_usage: PlMutex<Option<(NodeType, NodeId, f64, u64)>>,
    }

    impl StubNodeManager {
        fn with_workers(count: u64) -> Self {
            let manager = Self::default();
            let mut workers = manager.running_workers.lock();
            for id in 0..count {
                workers.push(Node::new(NodeType::Worker, id, format!("worker-{}", id)));
            }
            drop(workers);
            manager
        }
    }

    impl NodeManager for StubNodeManager {
        fn get_running_workers(&self) -> Vec<Node> {
            self.running_workers.lock().clone()
        }

        fn get_running_nodes(&self) -> Vec<Node> {
            self.running_workers.lock().clone()
        }

        fn get_all_running_nodes(&self) -> Vec<Node> {
            self.running_workers.lock().clone()
        }

        fn start_auto_scale(&self) {
            self.autoscale_calls.fetch_add(1, Ordering::SeqCst);
        }

        fn update_node_resource_usage(
            &self,
            node_type: NodeType,
            node_id: NodeId,
            cpu: f64,
            memory: u64,
        ) {
            *self.last_usage.lock() = Some((node_type, node_id, cpu, memory));
        }

        fn post_ps_ready(&self) {}

        fn get_next_cluster_ps(&self) -> Vec<Node> {
            Vec::new()
        }

        fn ready_for_new_ps_cluster(&self) -> bool {
            false
        }
    }

    fn servicer_with(node_manager: Arc<StubNodeManager>) -> MasterServicer {
        let perf_monitor = Arc::new(PerfMonitor::new());
        let task_manager = Arc::new(TaskManager::new(
            &TaskConfig {
                task_process_timeout_secs: 0,
                sweep_interval_secs: 30,
            },
            perf_monitor.clone(),
        ));
        MasterServicer::new(
            task_manager,
            node_manager,
            perf_monitor,
            AutoscaleConfig::default(),
        )
    }

    fn shard_params(name: &str, size: i64) -> DatasetShardParams {
        DatasetShardParams {
            batch_size: 32,
            num_minibatches_per_shard: 0,
            dataset_size: size,
            shuffle: false,
            num_epochs: 1,
            dataset_name: name.to_string(),
            storage_type: "text".to_string(),
            task_type: TaskType::Training,
        }
    }

    fn pull(servicer: &MasterServicer, worker_id: NodeId) -> TaskMessage {
        servicer.get_task(TaskRequest {
            worker_type: NodeType::Worker,
            worker_id,
            dataset_name: "train".to_string(),
        })
    }

    #[test]
    fn test_get_task_unknown_dataset_returns_empty() {
        let servicer = servicer_with(Arc::new(StubNodeManager::default()));
        let res = pull(&servicer, 0);
        assert_eq!(res.task_type, TaskType::None);
        assert_eq!(res.task_id, -1);
    }

    #[test]
    fn test_dispatch_wait_and_finish() {
        let servicer = servicer_with(Arc::new(StubNodeManager::default()));
        // Default minibatch count keeps one shard per 3200 records, so a
        // 320-record dataset with shard hint below produces 4 shards.
        let mut params = shard_params("train", 320);
        params.num_minibatches_per_shard = 3;
        // shard_size = 96 -> shards [0,96) [96,192) [192,288) [288,320)
        servicer.report_dataset_shard_params(params).unwrap();

        let mut ids = Vec::new();
        for worker in 0..4 {
            let res = pull(&servicer, worker);
            assert_eq!(res.task_type, TaskType::Training);
            ids.push(res.task_id);
        }

        // No rendezvous server: an incomplete dataset yields WAIT.
        assert_eq!(pull(&servicer, 4).task_type, TaskType::Wait);

        for id in ids {
            servicer
                .report_task_result(TaskResult {
                    dataset_name: "train".to_string(),
                    task_id: id,
                    err_message: String::new(),
                })
                .unwrap();
        }

        assert_eq!(pull(&servicer, 5).task_type, TaskType::None);
        assert!(servicer.task_manager().finished());
    }

    #[test]
    fn test_failed_task_is_redispatched_first() {
        let servicer = servicer_with(Arc::new(StubNodeManager::default()));
        servicer
            .report_dataset_shard_params(shard_params("train", 6400))
            .unwrap();

        let first = pull(&servicer, 1);
        servicer
            .report_task_result(TaskResult {
                dataset_name: "train".to_string(),
                task_id: first.task_id,
                err_message: "worker died".to_string(),
            })
            .unwrap();

        let retried = pull(&servicer, 2);
        assert_eq!(retried.task_id, first.task_id);
        assert_eq!(retried.shard.start, first.shard.start);
    }

    #[test]
    fn test_report_unknown_dataset_is_error() {
        let servicer = servicer_with(Arc::new(StubNodeManager::default()));
        let err = servicer
            .report_task_result(TaskResult {
                dataset_name: "missing".to_string(),
                task_id: 0,
                err_message: String::new(),
            })
            .unwrap_err();
        assert!(matches!(err, Error::DatasetNotFound { .. }));
    }

    #[test]
    fn test_wait_with_rendezvous_only_for_last_worker() {
        let node_manager = Arc::new(StubNodeManager::with_workers(2));
        let rendezvous = Arc::new(StaticRendezvousServer::new(RendezvousDialect::Ddp, 29400));
        let servicer =
            servicer_with(node_manager.clone()).with_rendezvous_server(rendezvous.clone());
        let mut params = shard_params("train", 320);
        params.num_minibatches_per_shard = 10;
        servicer.report_dataset_shard_params(params).unwrap();

        // Drain the single shard; the dataset stays incomplete.
        pull(&servicer, 0);

        // Two workers running: no WAIT, the caller should exit.
        assert_eq!(pull(&servicer, 1).task_type, TaskType::None);

        node_manager.running_workers.lock().pop();
        assert_eq!(pull(&servicer, 1).task_type, TaskType::Wait);
    }

    #[test]
    fn test_autoscale_fires_once_with_enough_samples() {
        let node_manager = Arc::new(StubNodeManager::default());
        let servicer = servicer_with(node_manager.clone());

        for i in 0..8u64 {
            servicer.report_global_step(GlobalStepRecord {
                global_step: i * 100,
                timestamp: 1000 + i * 10,
            });
        }

        assert_eq!(node_manager.autoscale_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_autoscale_without_training_after_grace_period() {
        let node_manager = Arc::new(StubNodeManager::default());
        let perf_monitor = Arc::new(PerfMonitor::new());
        let task_manager = Arc::new(TaskManager::new(
            &TaskConfig {
                task_process_timeout_secs: 0,
                sweep_interval_secs: 30,
            },
            perf_monitor.clone(),
        ));
        let servicer = MasterServicer::new(
            task_manager,
            node_manager.clone(),
            perf_monitor,
            AutoscaleConfig {
                seconds_to_autoscale_worker: 0,
                ..AutoscaleConfig::default()
            },
        );
        servicer
            .report_dataset_shard_params(shard_params("train", 6400))
            .unwrap();

        let task = pull(&servicer, 0);
        std::thread::sleep(std::time::Duration::from_millis(1200));
        servicer
            .report_task_result(TaskResult {
                dataset_name: "train".to_string(),
                task_id: task.task_id,
                err_message: String::new(),
            })
            .unwrap();

        assert_eq!(node_manager.autoscale_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_report_used_resource_converts_to_mib() {
        let node_manager = Arc::new(StubNodeManager::default());
        let servicer = servicer_with(node_manager.clone());

        servicer.report_used_resource(UsedResourceRequest {
            node_type: NodeType::Worker,
            node_id: 3,
            cpu: 1.5,
            memory_bytes: 512 * 1024 * 1024,
        });

        let usage = (*node_manager.last_usage.lock()).unwrap();
        assert_eq!(usage, (NodeType::Worker, 3, 1.5, 512));
    }

    #[test]
    fn test_comm_rank_uses_ddp_fields() {
        let rendezvous = Arc::new(StaticRendezvousServer::new(RendezvousDialect::Ddp, 29400));
        rendezvous.add_process("host-a", 0, 40001);
        rendezvous.add_process("host-b", 0, 40002);
        let servicer = servicer_with(Arc::new(StubNodeManager::default()))
            .with_rendezvous_server(rendezvous);

        let res = servicer
            .get_comm_rank(CommRankRequest {
                worker_host: "host-b".to_string(),
                worker_local_process_id: 0,
            })
            .unwrap();

        assert_eq!(res.dialect, "DDP");
        assert_eq!(res.rank_id, 1);
        assert_eq!(res.master_addr, "host-a");
        assert_eq!(res.master_port, 40001);
        assert_eq!(res.world_size, 2);
        assert_eq!(res.rendezvous_port, 0);
    }

    #[test]
    fn test_rendezvous_proxies_require_server() {
        let servicer = servicer_with(Arc::new(StubNodeManager::default()));
        let err = servicer
            .get_comm_rank(CommRankRequest {
                worker_host: "host-a".to_string(),
                worker_local_process_id: 0,
            })
            .unwrap_err();
        assert!(matches!(err, Error::Unavailable { .. }));
    }

    #[test]
    fn test_cluster_version_routing() {
        let servicer = servicer_with(Arc::new(StubNodeManager::default()))
            .with_elastic_ps_service(Arc::new(ElasticPsService::new()));

        servicer.update_cluster_version(UpdateClusterVersionRequest {
            task_type: NodeType::Worker,
            task_id: 2,
            version_type: "global".to_string(),
            version: 9,
        });

        let res = servicer.get_cluster_version(GetClusterVersionRequest {
            task_type: NodeType::Worker,
            task_id: 2,
            version_type: "global".to_string(),
        });
        assert_eq!(res.version, 9);

        let res = servicer.get_cluster_version(GetClusterVersionRequest {
            task_type: NodeType::Ps,
            task_id: 2,
            version_type: "global".to_string(),
        });
        assert_eq!(res.version, 0);
    }

    #[test]
    fn test_shard_checkpoint_round_trip() {
        let servicer = servicer_with(Arc::new(StubNodeManager::default()));
        servicer
            .report_dataset_shard_params(shard_params("train", 6400))
            .unwrap();
        pull(&servicer, 0);

        let checkpoint = servicer
            .get_shard_checkpoint(ShardCheckpointRequest {
                dataset_name: "train".to_string(),
            })
            .unwrap();
        assert!(!checkpoint.content.is_empty());

        let res = servicer.report_shard_checkpoint(checkpoint);
        assert!(res.success);
    }

    #[test]
    fn test_query_training_status() {
        let servicer = servicer_with(Arc::new(StubNodeManager::default()));
        servicer
            .report_dataset_shard_params(shard_params("train", 6400))
            .unwrap();
        assert_eq!(
            servicer.query_training_status().status,
            TrainingLoopStatus::Pending
        );

        let task = pull(&servicer, 0);
        servicer
            .report_task_result(TaskResult {
                dataset_name: "train".to_string(),
                task_id: task.task_id,
                err_message: String::new(),
            })
            .unwrap();
        assert_eq!(
            servicer.query_training_status().status,
            TrainingLoopStatus::Start
        );
    }

    #[test]
    fn test_dataset_epoch_query() {
        let servicer = servicer_with(Arc::new(StubNodeManager::default()));
        servicer
            .report_dataset_shard_params(shard_params("train", 6400))
            .unwrap();
        pull(&servicer, 0);

        let res = servicer.get_dataset_epoch(DatasetEpochRequest {
            dataset_name: "train".to_string(),
        });
        assert_eq!(res.epoch, 1);
    }
}
