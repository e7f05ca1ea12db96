use anyhow::{Context, Result};
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tokio::sync::Semaphore;

/// Pool de workers ociosos.
///
/// Cada dirección es un token de un solo uso: `acquire` la saca del pool y
/// sólo vuelve con `release`. Los permisos del semáforo siempre igualan la
/// cantidad de direcciones en la cola, así que `acquire` espera mientras no
/// haya nadie libre y nunca entrega la misma dirección a dos tareas a la vez.
#[derive(Clone, Default)]
pub struct WorkerPool {
    inner: Arc<Inner>,
}

struct Inner {
    idle: Mutex<VecDeque<String>>,
    available: Semaphore,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            idle: Mutex::new(VecDeque::new()),
            available: Semaphore::new(0),
        }
    }
}

impl WorkerPool {
    pub fn new() -> Self {
        Self::default()
    }

    fn idle(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.inner.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Devuelve un worker al pool (o lo agrega por primera vez).
    pub fn release(&self, address: String) {
        // primero la dirección, después el permiso
        self.idle().push_back(address);
        self.inner.available.add_permits(1);
    }

    /// Alias de `release` para workers recién registrados.
    pub fn register(&self, address: String) {
        self.release(address);
    }

    /// Espera hasta que haya un worker libre y lo saca del pool.
    pub async fn acquire(&self) -> Result<String> {
        let permit = self
            .inner
            .available
            .acquire()
            .await
            .context("el pool de workers está cerrado")?;
        permit.forget();

        self.idle()
            .pop_front()
            .context("pool sin workers pese a tener permiso")
    }

    pub fn idle_count(&self) -> usize {
        self.idle().len()
    }

    pub fn idle_workers(&self) -> Vec<String> {
        self.idle().iter().cloned().collect()
    }

    /// Despierta a todos los que esperan en `acquire` con error.
    pub fn close(&self) {
        self.inner.available.close();
    }
}
