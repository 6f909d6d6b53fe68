//! JSON-over-HTTP surface of the master RPC contract
//!
//! One POST route per worker-initiated RPC plus GET routes for the
//! queries. Handler errors map to HTTP status codes; the servicer never
//! panics across this boundary.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};

use master_core::Error;

use crate::messages::*;
use crate::servicer::MasterServicer;

/// Shared state for HTTP handlers
pub type AppState = Arc<MasterServicer>;

/// Error wrapper mapping servicer errors to HTTP responses
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::DatasetNotFound { .. } | Error::TaskNotFound { .. } => StatusCode::NOT_FOUND,
            Error::InvalidArgument { .. }
            | Error::CheckpointRestore { .. }
            | Error::Serialization(_) => StatusCode::BAD_REQUEST,
            Error::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (
            status,
            Json(serde_json::json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Create the master API router
pub fn create_router(servicer: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/get_task", post(get_task))
        .route("/api/report_task_result", post(report_task_result))
        .route(
            "/api/report_dataset_shard_params",
            post(report_dataset_shard_params),
        )
        .route("/api/get_shard_checkpoint", post(get_shard_checkpoint))
        .route("/api/report_shard_checkpoint", post(report_shard_checkpoint))
        .route("/api/get_dataset_epoch", post(get_dataset_epoch))
        .route("/api/report_global_step", post(report_global_step))
        .route("/api/report_used_resource", post(report_used_resource))
        .route("/api/report_model_metric", post(report_model_metric))
        .route("/api/get_comm_rank", post(get_comm_rank))
        .route("/api/reset_sync", post(reset_sync))
        .route("/api/barrier_sync", post(barrier_sync))
        .route(
            "/api/report_training_loop_status",
            post(report_training_loop_status),
        )
        .route("/api/report_prestop", post(report_prestop))
        .route("/api/get_cluster_version", post(get_cluster_version))
        .route("/api/update_cluster_version", post(update_cluster_version))
        .route("/api/ready_for_ps_relaunch", post(ready_for_ps_relaunch))
        .route("/api/query_ps_nodes", get(query_ps_nodes))
        .route("/api/query_running_nodes", get(query_running_nodes))
        .route("/api/query_training_status", get(query_training_status))
        .layer(cors)
        .with_state(servicer)
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({"status": "ok"})))
}

async fn get_task(State(s): State<AppState>, Json(req): Json<TaskRequest>) -> Json<TaskMessage> {
    Json(s.get_task(req))
}

async fn report_task_result(
    State(s): State<AppState>,
    Json(req): Json<TaskResult>,
) -> ApiResult<Empty> {
    Ok(Json(s.report_task_result(req)?))
}

async fn report_dataset_shard_params(
    State(s): State<AppState>,
    Json(req): Json<DatasetShardParams>,
) -> ApiResult<Empty> {
    Ok(Json(s.report_dataset_shard_params(req)?))
}

async fn get_shard_checkpoint(
    State(s): State<AppState>,
    Json(req): Json<ShardCheckpointRequest>,
) -> ApiResult<ShardCheckpointMessage> {
    Ok(Json(s.get_shard_checkpoint(req)?))
}

async fn report_shard_checkpoint(
    State(s): State<AppState>,
    Json(req): Json<ShardCheckpointMessage>,
) -> Json<ReportShardCheckpointResponse> {
    Json(s.report_shard_checkpoint(req))
}

async fn get_dataset_epoch(
    State(s): State<AppState>,
    Json(req): Json<DatasetEpochRequest>,
) -> Json<DatasetEpochResponse> {
    Json(s.get_dataset_epoch(req))
}

async fn report_global_step(
    State(s): State<AppState>,
    Json(req): Json<GlobalStepRecord>,
) -> Json<Empty> {
    Json(s.report_global_step(req))
}

async fn report_used_resource(
    State(s): State<AppState>,
    Json(req): Json<UsedResourceRequest>,
) -> Json<Empty> {
    Json(s.report_used_resource(req))
}

async fn report_model_metric(
    State(s): State<AppState>,
    Json(req): Json<ModelMetricReport>,
) -> Json<Empty> {
    Json(s.report_model_metric(req))
}

async fn get_comm_rank(
    State(s): State<AppState>,
    Json(req): Json<CommRankRequest>,
) -> ApiResult<CommRankResponse> {
    Ok(Json(s.get_comm_rank(req)?))
}

async fn reset_sync(State(s): State<AppState>, Json(req): Json<SyncRequest>) -> ApiResult<SyncResponse> {
    Ok(Json(s.reset_sync(req)?))
}

async fn barrier_sync(
    State(s): State<AppState>,
    Json(req): Json<SyncRequest>,
) -> ApiResult<SyncResponse> {
    Ok(Json(s.barrier_sync(req)?))
}

async fn report_training_loop_status(
    State(s): State<AppState>,
    Json(req): Json<TrainingLoopStatusReport>,
) -> ApiResult<Empty> {
    Ok(Json(s.report_training_loop_status(req)?))
}

async fn report_prestop(
    State(s): State<AppState>,
    Json(req): Json<PrestopReport>,
) -> ApiResult<Empty> {
    Ok(Json(s.report_prestop(req)?))
}

async fn get_cluster_version(
    State(s): State<AppState>,
    Json(req): Json<GetClusterVersionRequest>,
) -> Json<ClusterVersionResponse> {
    Json(s.get_cluster_version(req))
}

async fn update_cluster_version(
    State(s): State<AppState>,
    Json(req): Json<UpdateClusterVersionRequest>,
) -> Json<Empty> {
    Json(s.update_cluster_version(req))
}

async fn ready_for_ps_relaunch(State(s): State<AppState>) -> ApiResult<Empty> {
    Ok(Json(s.ready_for_ps_relaunch()?))
}

async fn query_ps_nodes(State(s): State<AppState>) -> Json<QueryPsNodesResponse> {
    Json(s.query_ps_nodes())
}

async fn query_running_nodes(State(s): State<AppState>) -> Json<RunningNodesResponse> {
    Json(s.query_running_nodes())
}

async fn query_training_status(State(s): State<AppState>) -> Json<TrainingStatusResponse> {
    Json(s.query_training_status())
}
