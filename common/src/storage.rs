use anyhow::{Context, Result};
use std::{
    fs, io,
    path::{Path, PathBuf},
};

/// Nombre del shard intermedio que la tarea map `map_task` escribe para la reduce `reduce_task`.
pub fn shard_name(job_name: &str, map_task: u32, reduce_task: u32) -> String {
    format!("mrtmp.{}-{}-{}", job_name, map_task, reduce_task)
}

/// Nombre del archivo de salida de la tarea reduce `reduce_task`.
pub fn reduce_output_name(job_name: &str, reduce_task: u32) -> String {
    format!("mrtmp.{}-res-{}", job_name, reduce_task)
}

/// Nombre del archivo final con todas las particiones mezcladas.
pub fn merged_output_name(job_name: &str) -> String {
    format!("mrtmp.{}", job_name)
}

/// Directorio de datos compartido entre master y workers.
/// Sólo arma rutas; no guarda estado.
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Usa MR_DATA_DIR o `./data` si no está definida.
    pub fn from_env() -> Self {
        let root = std::env::var("MR_DATA_DIR").unwrap_or_else(|_| "data".to_string());
        Self::new(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ensure_root(&self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("no se pudo crear {}", self.root.display()))
    }

    pub fn shard_path(&self, job_name: &str, map_task: u32, reduce_task: u32) -> PathBuf {
        self.root.join(shard_name(job_name, map_task, reduce_task))
    }

    pub fn reduce_output_path(&self, job_name: &str, reduce_task: u32) -> PathBuf {
        self.root.join(reduce_output_name(job_name, reduce_task))
    }

    pub fn merged_output_path(&self, job_name: &str) -> PathBuf {
        self.root.join(merged_output_name(job_name))
    }

    /// Borra los shards de un job terminado. Los que no existan se ignoran.
    pub fn remove_intermediates(&self, job_name: &str, n_map: u32, n_reduce: u32) -> Result<()> {
        for m in 0..n_map {
            for r in 0..n_reduce {
                let path = self.shard_path(job_name, m, r);
                match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => {
                        return Err(e).with_context(|| format!("borrando {}", path.display()))
                    }
                }
            }
        }
        Ok(())
    }
}
