use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use common::{DoTaskArgs, DoTaskResponse};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::state::AppState;

/// Invocación remota de una tarea en un worker concreto.
///
/// `Err` significa que el worker no respondió o falló; el scheduler no
/// distingue entre los dos casos y en ambos reintenta en otro worker.
#[async_trait]
pub trait TaskInvoker: Send + Sync + 'static {
    async fn invoke(&self, worker: &str, args: &DoTaskArgs) -> Result<()>;
}

/// Invoca `POST http://{worker}/api/v1/tasks/do` con los argumentos en JSON.
#[derive(Clone)]
pub struct HttpInvoker {
    client: Client,
}

impl HttpInvoker {
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        Ok(Self {
            client: builder.build().context("no se pudo crear el cliente HTTP")?,
        })
    }

    /// Sin MR_TASK_TIMEOUT_SECS no hay timeout: se espera el error del transporte.
    pub fn from_env() -> Result<Self> {
        let timeout = std::env::var("MR_TASK_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs);
        Self::new(timeout)
    }
}

#[async_trait]
impl TaskInvoker for HttpInvoker {
    async fn invoke(&self, worker: &str, args: &DoTaskArgs) -> Result<()> {
        let url = format!("http://{}/api/v1/tasks/do", worker);
        debug!("POST {} ({} {})", url, args.phase, args.task_index);

        let resp = self
            .client
            .post(&url)
            .json(args)
            .send()
            .await
            .with_context(|| format!("worker {} no responde", worker))?;

        if !resp.status().is_success() {
            bail!("worker {} devolvió status {}", worker, resp.status());
        }

        let body: DoTaskResponse = resp.json().await?;
        if !body.ok {
            bail!("worker {} reportó fallo", worker);
        }
        Ok(())
    }
}

/// Envuelve otro invoker y anota cada resultado en las métricas de workers.
pub struct TrackedInvoker<I> {
    inner: I,
    state: AppState,
}

impl<I> TrackedInvoker<I> {
    pub fn new(inner: I, state: AppState) -> Self {
        Self { inner, state }
    }
}

#[async_trait]
impl<I: TaskInvoker> TaskInvoker for TrackedInvoker<I> {
    async fn invoke(&self, worker: &str, args: &DoTaskArgs) -> Result<()> {
        let res = self.inner.invoke(worker, args).await;
        self.state.record_result(worker, res.is_ok());
        res
    }
}
