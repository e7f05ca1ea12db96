use serde::{Deserialize, Serialize};

pub mod apps;
pub mod codec;
pub mod job;
pub mod map;
pub mod reduce;
pub mod results;
pub mod storage;
pub mod task;
pub mod worker;

pub use job::{Job, JobInfo, JobStatus};
pub use storage::Storage;
pub use task::{DoTaskArgs, DoTaskResponse, Phase};
pub use worker::{WorkerId, WorkerInfo, WorkerRegisterRequest, WorkerRegisterResponse};

/* --------- Tipos de la aplicación de usuario --------- */

/// Par clave/valor producido por `map` y consumido por `reduce`.
/// No hay restricción de unicidad: el map emite un multiconjunto.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Función map del usuario: (nombre de archivo, contenido) -> pares.
pub type MapFn = fn(&str, &str) -> Vec<KeyValue>;

/// Función reduce del usuario: (clave, todos los valores de esa clave) -> valor.
pub type ReduceFn = fn(&str, &[String]) -> String;
