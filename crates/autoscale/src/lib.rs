//! Resource planning for the elastic training master
//!
//! Optimizers propose `ResourcePlan`s; the `JobResourceOptimizer` drives a
//! staged machine over them, honoring user-declared resources and handling
//! OOM-driven memory growth.

pub mod job;
pub mod limits;
pub mod optimizer;
pub mod plan;

pub use job::{JobResource, JobResourceOptimizer};
pub use optimizer::{
    BrainClient, BrainOptimizer, JobOptStage, LocalOptimizer, OptimizeWorkerPhase, PlanConfig,
    ResourceOptimizer,
};
pub use plan::ResourcePlan;
