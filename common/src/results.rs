use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::{codec, storage::Storage, KeyValue};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResults {
    pub job_name: String,
    /// Salidas de cada reduce, en orden de partición
    pub partitions: Vec<String>,
    /// Archivo final con todo mezclado y ordenado por clave
    pub merged: String,
    pub keys: usize,
}

/// Junta las `n_reduce` salidas de un job en un único archivo ordenado por clave.
/// Cada clave debe aparecer en una sola partición; si no, las salidas no vienen
/// de una misma corrida y se devuelve error.
pub fn merge_outputs(storage: &Storage, job_name: &str, n_reduce: u32) -> Result<JobResults> {
    let mut all: Vec<KeyValue> = Vec::new();
    let mut partitions: Vec<PathBuf> = Vec::new();

    for r in 0..n_reduce {
        let path = storage.reduce_output_path(job_name, r);
        let mut kvs = codec::read_file(&path)?;
        all.append(&mut kvs);
        partitions.push(path);
    }

    all.sort_by(|a, b| a.key.cmp(&b.key));
    if let Some(dup) = all.windows(2).find(|w| w[0].key == w[1].key) {
        bail!(
            "la clave {:?} aparece en más de una partición del job {}",
            dup[0].key,
            job_name
        );
    }

    let merged = storage.merged_output_path(job_name);
    codec::write_file(&merged, &all)?;

    Ok(JobResults {
        job_name: job_name.to_string(),
        partitions: partitions
            .iter()
            .map(|p| p.to_string_lossy().to_string())
            .collect(),
        merged: merged.to_string_lossy().to_string(),
        keys: all.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn storage(sub: &str) -> Storage {
        let base = std::env::temp_dir().join("results_tests").join(sub);
        let _ = fs::remove_dir_all(&base);
        fs::create_dir_all(&base).unwrap();
        Storage::new(base)
    }

    #[test]
    fn merge_ordena_todas_las_particiones() {
        let storage = storage("sorted");
        codec::write_file(
            &storage.reduce_output_path("wc", 0),
            &[KeyValue::new("b", "1"), KeyValue::new("d", "4")],
        )
        .unwrap();
        codec::write_file(
            &storage.reduce_output_path("wc", 1),
            &[KeyValue::new("a", "2"), KeyValue::new("c", "3")],
        )
        .unwrap();

        let res = merge_outputs(&storage, "wc", 2).unwrap();
        assert_eq!(res.keys, 4);
        assert_eq!(res.partitions.len(), 2);

        let merged = codec::read_file(&storage.merged_output_path("wc")).unwrap();
        let keys: Vec<&str> = merged.iter().map(|kv| kv.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn clave_repetida_entre_particiones_es_error() {
        let storage = storage("dup");
        codec::write_file(&storage.reduce_output_path("wc", 0), &[KeyValue::new("a", "1")])
            .unwrap();
        codec::write_file(&storage.reduce_output_path("wc", 1), &[KeyValue::new("a", "2")])
            .unwrap();

        assert!(merge_outputs(&storage, "wc", 2).is_err());
    }

    #[test]
    fn particion_faltante_es_error() {
        let storage = storage("missing");
        assert!(merge_outputs(&storage, "wc", 1).is_err());
    }
}
