//! Job metric collection contract
//!
//! The real collector ships stats to an external store; the default
//! implementation only logs them.

use tracing::debug;

use master_core::monitor::PerfMonitor;
use master_core::node::Node;

use crate::messages::{OpStats, TensorStats};

/// Sink for job-level metrics
pub trait MetricCollector: Send + Sync {
    fn collect_dataset_metric(&self, dataset_name: &str, dataset_size: i64, storage_type: &str);

    fn collect_training_hyper_params(&self, num_epochs: u32, batch_size: u64);

    fn collect_model_metric(&self, tensor_stats: &TensorStats, op_stats: &OpStats);

    fn collect_runtime_stats(&self, perf_monitor: &PerfMonitor, nodes: &[Node]);
}

/// Collector that logs metrics at debug level
#[derive(Debug, Default)]
pub struct DebugMetricCollector;

impl MetricCollector for DebugMetricCollector {
    fn collect_dataset_metric(&self, dataset_name: &str, dataset_size: i64, storage_type: &str) {
        debug!(dataset = dataset_name, dataset_size, storage_type, "Dataset metric");
    }

    fn collect_training_hyper_params(&self, num_epochs: u32, batch_size: u64) {
        debug!(num_epochs, batch_size, "Training hyper parameters");
    }

    fn collect_model_metric(&self, tensor_stats: &TensorStats, op_stats: &OpStats) {
        debug!(
            variables = tensor_stats.variable_count,
            ops = op_stats.op_count,
            flops = op_stats.flops,
            "Model metric"
        );
    }

    fn collect_runtime_stats(&self, perf_monitor: &PerfMonitor, nodes: &[Node]) {
        debug!(
            speed = perf_monitor.running_speed(),
            global_step = perf_monitor.completed_global_step(),
            nodes = nodes.len(),
            "Runtime stats"
        );
    }
}
