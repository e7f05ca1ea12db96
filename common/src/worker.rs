use serde::{Deserialize, Serialize};

pub type WorkerId = String;

/// Registro de un worker en el master. `address` es `host:port` donde
/// el worker escucha `/api/v1/tasks/do`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRegisterRequest {
    pub address: String,
    pub hostname: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRegisterResponse {
    pub worker_id: WorkerId,
}

/// Vista de un worker para `GET /api/v1/workers`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WorkerInfo {
    pub worker_id: WorkerId,
    pub address: String,
    pub hostname: String,
    pub idle: bool,
    pub tasks_succeeded: u64,
    pub tasks_failed: u64,
    /// Un worker que falló una invocación no vuelve al pool
    pub dead: bool,
}
