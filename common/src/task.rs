use serde::{Deserialize, Serialize};
use std::fmt;

/// Etapa de un job. Se programan por separado y en orden: primero Map, luego Reduce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Map,
    Reduce,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Map => write!(f, "map"),
            Phase::Reduce => write!(f, "reduce"),
        }
    }
}

/// Lo que el master le manda a un worker para ejecutar una tarea.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoTaskArgs {
    pub job_name: String,
    /// Archivo de entrada; sólo tiene sentido en tareas map.
    pub file: Option<String>,
    pub phase: Phase,
    pub task_index: u32,
    /// N (cantidad de reduces) para una tarea map, M (cantidad de maps) para una reduce.
    pub companion: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoTaskResponse {
    pub ok: bool,
}
