//! End-to-end scenarios against the master servicer

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use parking_lot::Mutex;

use autoscale::job::{JobResource, JobResourceOptimizer};
use autoscale::optimizer::{
    JobOptStage, OptimizeWorkerPhase, PlanConfig, ResourceOptimizer,
};
use autoscale::{limits, ResourcePlan};
use coordinator::messages::{
    DatasetShardParams, ShardCheckpointRequest, TaskRequest, TaskResult,
};
use coordinator::{MasterServer, MasterServicer, NodeManager};
use data_shard::dataset::TaskType;
use data_shard::splitter::{DatasetSplitter, StorageType};
use data_shard::TaskManager;
use master_core::config::{AutoscaleConfig, ServerConfig, TaskConfig};
use master_core::node::{Node, NodeGroupResource, NodeId, NodeResource, NodeType};
use master_core::PerfMonitor;

#[derive(Default)]
struct TestNodeManager {
    running_workers: Mutex<Vec<Node>>,
    autoscale_calls: AtomicUsize,
}

impl TestNodeManager {
    fn with_workers(count: u64) -> Self {
        let manager = Self::default();
        {
            let mut workers = manager.running_workers.lock();
            for id in 0..count {
                workers.push(Node::new(NodeType::Worker, id, format!("worker-{}", id)));
            }
        }
        manager
    }
}

impl NodeManager for TestNodeManager {
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

    fn update_node_resource_usage(&self, _: NodeType, _: NodeId, _: f64, _: u64) {}

    fn post_ps_ready(&self) {}

    fn get_next_cluster_ps(&self) -> Vec<Node> {
        Vec::new()
    }

    fn ready_for_new_ps_cluster(&self) -> bool {
        false
    }
}

struct Master {
    servicer: Arc<MasterServicer>,
    task_manager: Arc<TaskManager>,
}

fn new_master(timeout_secs: u64, sweep_secs: u64) -> Master {
    let perf_monitor = Arc::new(PerfMonitor::new());
    let task_manager = Arc::new(TaskManager::new(
        &TaskConfig {
            task_process_timeout_secs: timeout_secs,
            sweep_interval_secs: sweep_secs,
        },
        perf_monitor.clone(),
    ));
    let servicer = Arc::new(MasterServicer::new(
        task_manager.clone(),
        Arc::new(TestNodeManager::with_workers(0)),
        perf_monitor,
        AutoscaleConfig::default(),
    ));
    Master {
        servicer,
        task_manager,
    }
}

fn register_dataset(master: &Master, name: &str, dataset_size: u64, shard_size: u64, task_type: TaskType) {
    let splitter =
        DatasetSplitter::new(name, dataset_size, shard_size, 1, false, StorageType::Text)
            .with_seed(11);
    master
        .task_manager
        .new_dataset(32, dataset_size as i64, name, splitter, task_type);
}

fn pull(master: &Master, worker_id: NodeId, dataset: &str) -> coordinator::messages::TaskMessage {
    master.servicer.get_task(TaskRequest {
        worker_type: NodeType::Worker,
        worker_id,
        dataset_name: dataset.to_string(),
    })
}

fn report(master: &Master, dataset: &str, task_id: i64, err: &str) -> Result<()> {
    master.servicer.report_task_result(TaskResult {
        dataset_name: dataset.to_string(),
        task_id,
        err_message: err.to_string(),
    })?;
    Ok(())
}

#[tokio::test]
async fn test_basic_dispatch_wait_and_finish() -> Result<()> {
    let master = new_master(0, 30);
    register_dataset(&master, "train", 320, 100, TaskType::Training);

    // Three workers get the three full shards in order.
    for (worker, start) in [(0u64, 0u64), (1, 100), (2, 200)] {
        let task = pull(&master, worker, "train");
        assert_eq!(task.task_type, TaskType::Training);
        assert_eq!((task.shard.start, task.shard.end), (start, start + 100));
    }

    // The fourth call gets the short tail shard.
    let tail = pull(&master, 3, "train");
    assert_eq!((tail.shard.start, tail.shard.end), (300, 320));

    // Nothing left to dispatch but reports are pending: WAIT.
    assert_eq!(pull(&master, 4, "train").task_type, TaskType::Wait);

    for id in 0..4 {
        report(&master, "train", id, "")?;
    }

    let done = pull(&master, 5, "train");
    assert_eq!(done.task_type, TaskType::None);
    assert!(master.task_manager.finished());
    Ok(())
}

#[tokio::test]
async fn test_task_ids_are_a_dense_prefix() -> Result<()> {
    let master = new_master(0, 30);
    register_dataset(&master, "train", 1000, 100, TaskType::Training);

    let mut ids = Vec::new();
    for worker in 0..7 {
        ids.push(pull(&master, worker, "train").task_id);
    }
    assert_eq!(ids, (0..7).collect::<Vec<i64>>());
    Ok(())
}

#[tokio::test]
async fn test_retry_on_failure_redispatches_same_shard() -> Result<()> {
    let master = new_master(0, 30);
    register_dataset(&master, "train", 320, 100, TaskType::Training);

    let first = pull(&master, 1, "train");
    assert_eq!(first.task_id, 0);
    report(&master, "train", first.task_id, "cuda out of memory")?;

    // The failed shard comes back before any fresh one.
    let retried = pull(&master, 2, "train");
    assert_eq!(retried.task_id, 0);
    assert_eq!((retried.shard.start, retried.shard.end), (0, 100));

    report(&master, "train", retried.task_id, "")?;
    assert_eq!(
        master.task_manager.dataset_completed_step("train"),
        Some(1)
    );
    Ok(())
}

#[tokio::test]
async fn test_dead_worker_recovery() -> Result<()> {
    let master = new_master(0, 30);
    register_dataset(&master, "train", 400, 100, TaskType::Training);

    let a = pull(&master, 3, "train");
    let b = pull(&master, 3, "train");
    let other = pull(&master, 1, "train");

    master.task_manager.recover_tasks(NodeType::Worker, 3);

    // Both of worker 3's tasks are dispatchable again.
    let r1 = pull(&master, 4, "train");
    let r2 = pull(&master, 5, "train");
    let mut recovered = vec![r1.task_id, r2.task_id];
    recovered.sort_unstable();
    let mut expected = vec![a.task_id, b.task_id];
    expected.sort_unstable();
    assert_eq!(recovered, expected);
    assert_ne!(r1.task_id, other.task_id);
    Ok(())
}

#[tokio::test]
async fn test_evaluation_timeout_requeues_and_fires_callback() -> Result<()> {
    let master = new_master(1, 1);
    register_dataset(&master, "eval", 100, 100, TaskType::Evaluation);

    let timed_out_worker = Arc::new(Mutex::new(None));
    let recorded = timed_out_worker.clone();
    master
        .task_manager
        .set_task_timeout_callback(move |worker_id| {
            *recorded.lock() = Some(worker_id);
        });
    master.task_manager.start();

    let task = pull(&master, 7, "eval");
    assert_eq!(task.task_type, TaskType::Evaluation);

    // No report arrives: the sweeper requeues the task and fires the
    // callback with the worker's id.
    tokio::time::sleep(Duration::from_millis(3500)).await;
    master.task_manager.stop();

    assert_eq!(*timed_out_worker.lock(), Some(7));
    let requeued = pull(&master, 8, "eval");
    assert_eq!(requeued.task_id, task.task_id);
    Ok(())
}

/// Optimizer stub proposing fixed worker/PS groups
struct ProposalOptimizer {
    worker: Option<NodeGroupResource>,
    oom_memory: u64,
}

impl ResourceOptimizer for ProposalOptimizer {
    fn generate_opt_plan(&self, stage: JobOptStage, config: &PlanConfig) -> ResourcePlan {
        let mut plan = ResourcePlan::new();
        if stage == JobOptStage::WorkerInitial
            && config.worker_optimize_phase == Some(OptimizeWorkerPhase::Initial)
        {
            if let Some(worker) = &self.worker {
                plan.add_group(NodeType::Worker, worker.clone());
            }
        }
        plan
    }

    fn generate_oom_recovery_plan(&self, _: &[String], _: JobOptStage) -> ResourcePlan {
        let mut plan = ResourcePlan::new();
        if self.oom_memory > 0 {
            plan.add_group(
                NodeType::Worker,
                NodeGroupResource::new(0, NodeResource::new(0.0, self.oom_memory)),
            );
        }
        plan
    }

    fn update_job_uuid(&self, _: &str) {}
}

#[tokio::test]
async fn test_user_override_wins_over_optimizer() -> Result<()> {
    let optimizer = JobResourceOptimizer::new(
        NodeGroupResource::new(4, NodeResource::new(4.0, 8192)),
        NodeGroupResource::new(0, NodeResource::new(0.0, 0)),
        Arc::new(ProposalOptimizer {
            worker: Some(NodeGroupResource::new(16, NodeResource::new(2.0, 16384))),
            oom_memory: 0,
        }),
        &AutoscaleConfig::default(),
    );
    let mut job_resource = JobResource::new();
    optimizer.init_job_resource(&mut job_resource);

    let plan = optimizer.get_job_resource_plan().unwrap();
    let worker = &plan.node_group_resources[&NodeType::Worker];
    assert_eq!(worker.count, 4);
    assert_eq!(worker.node_resource.cpu, 4.0);
    assert_eq!(worker.node_resource.memory, 16384);

    // The live resource always matches the user pinning too.
    let live = optimizer.worker_resource();
    assert_eq!(live.count, 4);
    assert_eq!(live.node_resource.cpu, 4.0);
    Ok(())
}

#[tokio::test]
async fn test_oom_escalation_raises_node_memory() -> Result<()> {
    let optimizer = JobResourceOptimizer::new(
        NodeGroupResource::new(4, NodeResource::new(4.0, 4096)),
        NodeGroupResource::new(0, NodeResource::new(0.0, 0)),
        Arc::new(ProposalOptimizer {
            worker: None,
            oom_memory: 12288,
        }),
        &AutoscaleConfig::default(),
    );
    let mut job_resource = JobResource::new();
    optimizer.init_job_resource(&mut job_resource);

    let mut node = Node::new(NodeType::Worker, 0, "worker-0".to_string())
        .with_config_resource(NodeResource::new(4.0, 8192));
    optimizer.adjust_oom_worker_resource(&mut node);

    // max(12288, 8192 * 1.5 = 12288, 4096) = 12288
    assert_eq!(node.config_resource.memory, 12288);
    assert!(node.config_resource.memory <= limits::MAX_MEMORY);
    Ok(())
}

#[tokio::test]
async fn test_shard_checkpoint_round_trip_preserves_dispatch() -> Result<()> {
    let master = new_master(0, 30);
    register_dataset(&master, "train", 400, 100, TaskType::Training);

    let in_flight = pull(&master, 0, "train");
    report(&master, "train", in_flight.task_id, "")?;
    let held = pull(&master, 1, "train");

    let checkpoint = master
        .servicer
        .get_shard_checkpoint(ShardCheckpointRequest {
            dataset_name: "train".to_string(),
        })?
        .content;
    assert!(!checkpoint.is_empty());

    let restored = master.servicer.report_shard_checkpoint(
        coordinator::messages::ShardCheckpointMessage {
            content: checkpoint,
        },
    );
    assert!(restored.success);

    // The held task is dispatchable again before pending shards, and the
    // epoch is unchanged.
    let next = pull(&master, 2, "train");
    assert_eq!(next.task_id, held.task_id);
    assert_eq!(master.task_manager.get_dataset_epoch("train"), 1);
    Ok(())
}

#[tokio::test]
async fn test_dataset_params_are_idempotent_over_rpc() -> Result<()> {
    let master = new_master(0, 30);
    let params = DatasetShardParams {
        batch_size: 32,
        num_minibatches_per_shard: 10,
        dataset_size: 640,
        shuffle: false,
        num_epochs: 1,
        dataset_name: "train".to_string(),
        storage_type: "text".to_string(),
        task_type: TaskType::Training,
    };
    master.servicer.report_dataset_shard_params(params.clone())?;
    let first = pull(&master, 0, "train");

    // A second declaration with a different geometry is ignored.
    let mut changed = params;
    changed.num_minibatches_per_shard = 1;
    master.servicer.report_dataset_shard_params(changed)?;
    let second = pull(&master, 1, "train");

    assert_eq!(first.shard.end - first.shard.start, 320);
    assert_eq!(second.task_id, first.task_id + 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_event_collector_feeds_the_perf_monitor() -> Result<()> {
    use diagnosis::{EventCollector, EventSink, TrainEvent};
    use std::io::Write;

    struct PerfSink(Arc<PerfMonitor>);

    impl EventSink for PerfSink {
        fn report_event(&self, event: &TrainEvent) {
            self.0.collect_global_step(event.step, event.ts as u64);
        }
    }

    let dir = tempfile_dir()?;
    let path = dir.join("events_0.log");
    let mut file = std::fs::File::create(&path)?;
    for (ts, step) in [
        ("2024-06-01T10:00:00", 100u64),
        ("2024-06-01T10:00:10", 101),
        ("2024-06-01T10:00:20", 102),
    ] {
        writeln!(
            file,
            "[{}] [1] [train.py] [TRAINER] [#step] [BEGIN] {{\"global_step\": {}}}",
            ts, step
        )?;
    }
    file.flush()?;

    let perf_monitor = Arc::new(PerfMonitor::new());
    let collector = Arc::new(EventCollector::new(
        &dir,
        1,
        Duration::from_secs(1),
        Arc::new(PerfSink(perf_monitor.clone())),
    ));
    let handles = collector.start_collectors();
    tokio::time::sleep(Duration::from_secs(5)).await;
    collector.stop_collectors();
    for handle in handles {
        tokio::time::timeout(Duration::from_secs(10), handle).await??;
    }

    // Step 100 anchors the stream; 101 and 102 reach the monitor.
    assert_eq!(perf_monitor.completed_global_step(), 102);
    assert_eq!(perf_monitor.sample_count(), 1);
    Ok(())
}

fn tempfile_dir() -> Result<std::path::PathBuf> {
    let dir = std::env::temp_dir().join(format!("master-e2e-{}", std::process::id()));
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

#[tokio::test]
async fn test_server_serves_health_over_tcp() -> Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let master = new_master(0, 30);
    let port = portpicker::pick_unused_port().expect("no free port");
    let config = ServerConfig {
        bind_address: "127.0.0.1".to_string(),
        port,
        ..ServerConfig::default()
    };
    let server = MasterServer::with_config(master.servicer.clone(), config);
    let handle = tokio::spawn(server.run());
    tokio::time::sleep(Duration::from_millis(200)).await;

    let mut stream = tokio::net::TcpStream::connect(("127.0.0.1", port)).await?;
    stream
        .write_all(b"GET /api/health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await?;
    let mut response = String::new();
    stream.read_to_string(&mut response).await?;

    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.contains("ok"));

    handle.abort();
    Ok(())
}
