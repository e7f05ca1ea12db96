use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::task::{DoTaskArgs, Phase};

/// Un job fijo: se conoce la lista de archivos (M tareas map) y N reduces.
/// No cambia una vez que empieza la planificación.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub name: String,
    pub files: Vec<String>,
    pub n_reduce: u32,
}

impl Job {
    pub fn new(name: impl Into<String>, files: Vec<String>, n_reduce: u32) -> Self {
        Self {
            name: name.into(),
            files,
            n_reduce,
        }
    }

    pub fn n_map(&self) -> u32 {
        self.files.len() as u32
    }

    /// Cantidad de tareas de la etapa.
    pub fn task_count(&self, phase: Phase) -> u32 {
        match phase {
            Phase::Map => self.n_map(),
            Phase::Reduce => self.n_reduce,
        }
    }

    /// Fan-out (map) o fan-in (reduce) que necesita cada tarea de la etapa.
    pub fn companion_count(&self, phase: Phase) -> u32 {
        match phase {
            Phase::Map => self.n_reduce,
            Phase::Reduce => self.n_map(),
        }
    }

    /// Argumentos de la invocación remota para la tarea `index` de `phase`.
    pub fn task_args(&self, phase: Phase, index: u32) -> DoTaskArgs {
        let file = match phase {
            Phase::Map => self.files.get(index as usize).cloned(),
            Phase::Reduce => None,
        };

        DoTaskArgs {
            job_name: self.name.clone(),
            file,
            phase,
            task_index: index,
            companion: self.companion_count(phase),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Accepted,
    Mapping,
    Reducing,
    Merging,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInfo {
    pub name: String,
    pub status: JobStatus,

    pub map_tasks: u32,
    pub reduce_tasks: u32,

    /// -------- Métricas del job --------
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub completed_tasks: u32,
    pub retries: u32,

    /// Archivo final mezclado, cuando el job terminó bien
    pub output: Option<String>,
}

impl JobInfo {
    pub fn accepted(job: &Job) -> Self {
        Self {
            name: job.name.clone(),
            status: JobStatus::Accepted,
            map_tasks: job.n_map(),
            reduce_tasks: job.n_reduce,
            submitted_at: Utc::now(),
            started_at: None,
            finished_at: None,
            completed_tasks: 0,
            retries: 0,
            output: None,
        }
    }
}
