//! Master binary entry point
//!
//! Wires the task manager, autoscaler and collaborators together and
//! serves the master RPC surface.

use std::sync::Arc;

use autoscale::job::{JobResource, JobResourceOptimizer};
use autoscale::LocalOptimizer;
use coordinator::{
    DebugMetricCollector, ElasticPsService, JobNodeManager, MasterServer, MasterServicer,
    RendezvousDialect, StaticRendezvousServer,
};
use data_shard::TaskManager;
use master_core::config::MasterConfig;
use master_core::node::{NodeGroupResource, NodeResource, NodeType};
use master_core::{NodeUsageStore, PerfMonitor};

#[tokio::main]
async fn main() -> master_core::Result<()> {
    master_core::log::init_logging();

    let mut config = MasterConfig::default();
    if let Some(port) = std::env::args().nth(1).and_then(|p| p.parse().ok()) {
        config.server.port = port;
    }

    let perf_monitor = Arc::new(PerfMonitor::new());
    let usage_store = Arc::new(NodeUsageStore::new());

    let task_manager = Arc::new(TaskManager::new(&config.task, perf_monitor.clone()));
    task_manager.start();

    // Declared job resources; zero values let the optimizer decide.
    let worker_resource = NodeGroupResource::new(0, NodeResource::new(0.0, 0));
    let ps_resource = NodeGroupResource::new(0, NodeResource::new(0.0, 0));
    let mut job_resource = JobResource::new();
    job_resource.add_node_group_resource(NodeType::Worker, worker_resource.clone());
    job_resource.add_node_group_resource(NodeType::Ps, ps_resource.clone());

    let resource_optimizer = Arc::new(LocalOptimizer::new(
        "",
        perf_monitor.clone(),
        usage_store.clone(),
    ));
    let job_optimizer = Arc::new(JobResourceOptimizer::new(
        worker_resource,
        ps_resource,
        resource_optimizer,
        &config.autoscale,
    ));
    job_optimizer.update_job_uuid(&uuid::Uuid::new_v4().to_string());
    job_optimizer.init_job_resource(&mut job_resource);

    let node_manager = Arc::new(JobNodeManager::new(
        &job_resource,
        job_optimizer,
        usage_store,
    ));
    let rendezvous_server = Arc::new(StaticRendezvousServer::new(RendezvousDialect::Ddp, 29400));

    let servicer = MasterServicer::new(
        task_manager.clone(),
        node_manager,
        perf_monitor,
        config.autoscale.clone(),
    )
    .with_rendezvous_server(rendezvous_server)
    .with_metric_collector(Arc::new(DebugMetricCollector))
    .with_elastic_ps_service(Arc::new(ElasticPsService::new()));

    let result = MasterServer::with_config(Arc::new(servicer), config.server.clone())
        .run()
        .await;

    task_manager.stop();
    result
}
