use anyhow::{Context, Result};
use chrono::Utc;
use common::{results::JobResults, Job, JobStatus, Phase, Storage};
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    invoker::TaskInvoker,
    scheduler::{schedule, PhaseReport},
    state::AppState,
};

/// Corre un job completo: etapa map, etapa reduce (nunca superpuestas),
/// mezcla de salidas y limpieza de shards intermedios.
pub async fn run_job<I: TaskInvoker>(
    job: &Job,
    storage: &Storage,
    state: &AppState,
    invoker: Arc<I>,
) -> Result<JobResults> {
    state.update_job(|info| {
        info.status = JobStatus::Mapping;
        info.started_at = Some(Utc::now());
    });

    let res = run_phases(job, storage, state, invoker).await;

    match &res {
        Ok(results) => state.update_job(|info| {
            info.status = JobStatus::Succeeded;
            info.finished_at = Some(Utc::now());
            info.output = Some(results.merged.clone());
        }),
        Err(e) => {
            warn!("job {} falló: {:#}", job.name, e);
            state.update_job(|info| {
                info.status = JobStatus::Failed;
                info.finished_at = Some(Utc::now());
            });
        }
    }

    res
}

async fn run_phases<I: TaskInvoker>(
    job: &Job,
    storage: &Storage,
    state: &AppState,
    invoker: Arc<I>,
) -> Result<JobResults> {
    let map_report = schedule(job, Phase::Map, &state.pool, invoker.clone()).await?;
    record_phase(state, &map_report);

    state.update_job(|info| info.status = JobStatus::Reducing);
    let reduce_report = schedule(job, Phase::Reduce, &state.pool, invoker).await?;
    record_phase(state, &reduce_report);

    state.update_job(|info| info.status = JobStatus::Merging);
    let merge_storage = storage.clone();
    let name = job.name.clone();
    let n_reduce = job.n_reduce;
    let results = tokio::task::spawn_blocking(move || {
        common::results::merge_outputs(&merge_storage, &name, n_reduce)
    })
    .await
    .context("la mezcla de salidas entró en pánico")??;

    if let Err(e) = storage.remove_intermediates(&job.name, job.n_map(), job.n_reduce) {
        warn!("no se pudieron borrar los shards de {}: {:#}", job.name, e);
    }

    info!(
        "job {} terminado: {} claves en {}",
        job.name, results.keys, results.merged
    );
    Ok(results)
}

fn record_phase(state: &AppState, report: &PhaseReport) {
    state.update_job(|info| {
        info.completed_tasks += report.tasks;
        info.retries += report.failures;
    });
}
