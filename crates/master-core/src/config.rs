//! Master configuration types

use serde::{Deserialize, Serialize};

/// Main master configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MasterConfig {
    /// RPC server settings
    pub server: ServerConfig,

    /// Task dispatch settings
    pub task: TaskConfig,

    /// Autoscaling settings
    pub autoscale: AutoscaleConfig,
}

/// RPC server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind the master server
    pub bind_address: String,

    /// Listen port
    pub port: u16,

    /// Maximum accepted request body size in bytes
    pub max_receive_message_bytes: usize,

    /// Maximum response body size in bytes
    pub max_send_message_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 50001,
            max_receive_message_bytes: 32 * 1024 * 1024,
            max_send_message_bytes: 32 * 1024 * 1024,
        }
    }
}

/// Task dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Seconds an evaluation task may stay in flight before it is
    /// requeued. Zero disables the timeout sweeper.
    pub task_process_timeout_secs: u64,

    /// Seconds between timeout sweeps
    pub sweep_interval_secs: u64,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            task_process_timeout_secs: 1800,
            sweep_interval_secs: 30,
        }
    }
}

/// Autoscaling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoscaleConfig {
    /// Let the optimizer tune worker resources
    pub auto_worker_enabled: bool,

    /// Let the optimizer tune parameter-server resources
    pub auto_ps_enabled: bool,

    /// Seconds after which a job with no completed step is scaled anyway
    pub seconds_to_autoscale_worker: u64,

    /// Speed samples required before the worker group is adjusted
    pub sample_count_to_adjust_worker: usize,
}

impl Default for AutoscaleConfig {
    fn default() -> Self {
        Self {
            auto_worker_enabled: true,
            auto_ps_enabled: true,
            seconds_to_autoscale_worker: 1800,
            sample_count_to_adjust_worker: 5,
        }
    }
}
