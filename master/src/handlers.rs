use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use common::{JobInfo, WorkerInfo, WorkerRegisterRequest, WorkerRegisterResponse};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/job", get(get_job))
        .route("/api/v1/workers", get(list_workers))
        .route("/api/v1/workers/register", post(register_worker))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/* ---------------- handlers HTTP ---------------- */

async fn health() -> &'static str {
    "ok"
}

// Estado y métricas del job en curso
async fn get_job(State(state): State<AppState>) -> Json<JobInfo> {
    Json(state.job_info())
}

// Registra un worker y lo deja disponible para el scheduler
async fn register_worker(
    State(state): State<AppState>,
    Json(req): Json<WorkerRegisterRequest>,
) -> Json<WorkerRegisterResponse> {
    let worker_id = state.register_worker(req.address, req.hostname);
    Json(WorkerRegisterResponse { worker_id })
}

async fn list_workers(State(state): State<AppState>) -> Json<Vec<WorkerInfo>> {
    Json(state.list_workers())
}
