//! Resource limits and defaults applied to optimizer plans

/// Below this CPU value a user declaration is treated as unset
pub const MIN_VALID_CPU: f64 = 1.0;

/// Below this memory value (MiB) a user declaration is treated as unset
pub const MIN_VALID_MEMORY: u64 = 10240;

/// Factor applied to a node's memory after an OOM termination
pub const INCREMENTAL_MEMORY_FACTOR: f64 = 1.5;

/// Upper bound on parameter servers in a job
pub const MAX_PS_NUM: u64 = 15;

/// Upper bound on workers in a job
pub const MAX_WORKER_NUM: u64 = 60;

/// Upper bound on per-node CPU cores
pub const MAX_CPU_CORES: f64 = 32.0;

/// Upper bound on per-node memory in MiB
pub const MAX_MEMORY: u64 = 65536;

/// Worker count used when no optimizer plan is available at job start
pub const DEFAULT_WORKER_NUM: u64 = 2;

/// Worker CPU used when no optimizer plan is available at job start
pub const DEFAULT_WORKER_CPU: f64 = 2.0;

/// Worker memory (MiB) used when no optimizer plan is available at job
/// start
pub const DEFAULT_WORKER_MEMORY: u64 = 4096;

/// PS count used when no optimizer plan is available at job start
pub const DEFAULT_PS_NUM: u64 = 1;

/// PS CPU used when no optimizer plan is available at job start
pub const DEFAULT_PS_CPU: f64 = 2.0;

/// PS memory (MiB) used when no optimizer plan is available at job start
pub const DEFAULT_PS_MEMORY: u64 = 8192;
