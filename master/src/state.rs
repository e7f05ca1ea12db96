// master/src/state.rs

use common::{Job, JobInfo, WorkerId, WorkerInfo};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::SystemTime,
};
use tracing::{info, warn};

use crate::pool::WorkerPool;

#[derive(Clone)]
pub struct AppState {
    pub pool: WorkerPool,
    pub workers: Arc<Mutex<HashMap<WorkerId, WorkerMeta>>>,
    pub job: Arc<Mutex<JobInfo>>,
}

#[derive(Debug, Clone)]
pub struct WorkerMeta {
    pub address: String,
    pub hostname: String,
    pub registered_at: SystemTime,
    pub dead: bool,

    // Métricas
    pub tasks_succeeded: u64,
    pub tasks_failed: u64,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl AppState {
    pub fn new(job: &Job) -> Self {
        Self {
            pool: WorkerPool::new(),
            workers: Arc::new(Mutex::new(HashMap::new())),
            job: Arc::new(Mutex::new(JobInfo::accepted(job))),
        }
    }

    /// Registra un worker y lo pone en el pool.
    ///
    /// Si la dirección ya está registrada y viva no se vuelve a agregar al pool
    /// (estaría dos veces y se podría asignar a dos tareas a la vez). Un worker
    /// marcado como muerto que se registra de nuevo revive.
    pub fn register_worker(&self, address: String, hostname: String) -> WorkerId {
        let mut workers = lock(&self.workers);

        if let Some((id, meta)) = workers.iter_mut().find(|(_, m)| m.address == address) {
            if meta.dead {
                meta.dead = false;
                info!("worker {} ({}) volvió a registrarse", id, address);
                self.pool.register(address);
            } else {
                info!("worker {} ({}) ya estaba registrado", id, address);
            }
            return id.clone();
        }

        let worker_id = uuid::Uuid::new_v4().to_string();
        workers.insert(
            worker_id.clone(),
            WorkerMeta {
                address: address.clone(),
                hostname,
                registered_at: SystemTime::now(),
                dead: false,
                tasks_succeeded: 0,
                tasks_failed: 0,
            },
        );
        info!("worker registrado: {} en {}", worker_id, address);
        self.pool.register(address);

        worker_id
    }

    /// Anota el resultado de una invocación. Un fallo deja al worker muerto.
    pub fn record_result(&self, address: &str, ok: bool) {
        let mut workers = lock(&self.workers);
        if let Some(meta) = workers.values_mut().find(|m| m.address == address) {
            if ok {
                meta.tasks_succeeded += 1;
            } else {
                meta.tasks_failed += 1;
                meta.dead = true;
                warn!("marcando worker {} como DEAD", address);
            }
        }
    }

    pub fn list_workers(&self) -> Vec<WorkerInfo> {
        let idle = self.pool.idle_workers();
        let workers = lock(&self.workers);

        let mut out: Vec<WorkerInfo> = workers
            .iter()
            .map(|(id, meta)| WorkerInfo {
                worker_id: id.clone(),
                address: meta.address.clone(),
                hostname: meta.hostname.clone(),
                idle: idle.contains(&meta.address),
                tasks_succeeded: meta.tasks_succeeded,
                tasks_failed: meta.tasks_failed,
                dead: meta.dead,
            })
            .collect();
        out.sort_by(|a, b| a.address.cmp(&b.address));
        out
    }

    pub fn job_info(&self) -> JobInfo {
        lock(&self.job).clone()
    }

    pub fn update_job<F: FnOnce(&mut JobInfo)>(&self, f: F) {
        f(&mut lock(&self.job));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> AppState {
        AppState::new(&Job::new("wc", vec!["a".to_string()], 2))
    }

    #[test]
    fn registrar_dos_veces_no_duplica_en_el_pool() {
        let state = state();
        let id1 = state.register_worker("127.0.0.1:9001".into(), "h".into());
        let id2 = state.register_worker("127.0.0.1:9001".into(), "h".into());

        assert_eq!(id1, id2);
        assert_eq!(state.pool.idle_count(), 1);
        assert_eq!(state.list_workers().len(), 1);
    }

    #[tokio::test]
    async fn fallo_marca_muerto_y_el_registro_lo_revive() {
        let state = state();
        state.register_worker("w:1".into(), "h".into());
        state.record_result("w:1", true);

        // el scheduler lo saca del pool y no lo devuelve tras el fallo
        let w = state.pool.acquire().await.unwrap();
        assert_eq!(w, "w:1");
        state.record_result("w:1", false);

        let info = &state.list_workers()[0];
        assert!(info.dead);
        assert_eq!(info.tasks_succeeded, 1);
        assert_eq!(info.tasks_failed, 1);

        state.register_worker("w:1".into(), "h".into());
        assert!(!state.list_workers()[0].dead);
        assert_eq!(state.pool.idle_workers(), vec!["w:1".to_string()]);
    }
}
