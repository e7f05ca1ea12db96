use anyhow::{Context, Result};
use std::path::Path;
use tracing::debug;

use crate::{codec, storage::Storage, KeyValue, ReduceFn};

/// Lee los `n_map` shards dirigidos a `reduce_task` y los concatena.
pub fn read_shards(
    storage: &Storage,
    job_name: &str,
    reduce_task: u32,
    n_map: u32,
) -> Result<Vec<KeyValue>> {
    let mut all = Vec::new();

    for m in 0..n_map {
        let path = storage.shard_path(job_name, m, reduce_task);
        let mut kvs = codec::read_file(&path)?;
        all.append(&mut kvs);
    }

    Ok(all)
}

/// Ordena por clave y agrupa claves iguales consecutivas.
/// Devuelve (clave, valores) en orden ascendente de clave.
pub fn group_by_key(mut kvs: Vec<KeyValue>) -> Vec<(String, Vec<String>)> {
    kvs.sort_by(|a, b| a.key.cmp(&b.key));

    let mut groups: Vec<(String, Vec<String>)> = Vec::new();
    for kv in kvs {
        if let Some((key, values)) = groups.last_mut() {
            if *key == kv.key {
                values.push(kv.value);
                continue;
            }
        }
        groups.push((kv.key, vec![kv.value]));
    }

    groups
}

/// Ejecuta una tarea reduce:
/// 1. Lee y decodifica los shards (m, reduce_task) para m en 0..n_map.
/// 2. Ordena y agrupa por clave.
/// 3. Llama a `reduce_fn` una vez por clave distinta.
/// 4. Escribe un par (clave, valor reducido) por grupo en `out_file`, en orden de clave.
///
/// Sin pares de entrada se escribe un archivo vacío. Un shard faltante o mal
/// formado aborta la tarea; la salida se escribe entera o no se escribe.
pub fn run_reduce(
    storage: &Storage,
    job_name: &str,
    reduce_task: u32,
    out_file: &Path,
    n_map: u32,
    reduce_fn: ReduceFn,
) -> Result<()> {
    let kvs = read_shards(storage, job_name, reduce_task, n_map)
        .with_context(|| format!("reduce {} de {}", reduce_task, job_name))?;
    let total = kvs.len();

    let reduced: Vec<KeyValue> = group_by_key(kvs)
        .into_iter()
        .map(|(key, values)| {
            let value = reduce_fn(&key, &values);
            KeyValue { key, value }
        })
        .collect();

    debug!(
        "reduce {} de {}: {} pares, {} claves",
        reduce_task,
        job_name,
        total,
        reduced.len()
    );

    codec::write_file(out_file, &reduced)
        .with_context(|| format!("escribiendo salida {}", out_file.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{fs, path::PathBuf};

    fn temp_dir(sub: &str) -> PathBuf {
        let base = std::env::temp_dir().join("reduce_tests").join(sub);
        let _ = fs::remove_dir_all(&base);
        fs::create_dir_all(&base).unwrap();
        base
    }

    fn count(_key: &str, values: &[String]) -> String {
        values.len().to_string()
    }

    fn joined(_key: &str, values: &[String]) -> String {
        let mut v = values.to_vec();
        v.sort();
        v.join(",")
    }

    #[test]
    fn group_by_key_agrupa_en_orden() {
        let kvs = vec![
            KeyValue::new("b", "1"),
            KeyValue::new("a", "2"),
            KeyValue::new("b", "3"),
            KeyValue::new("c", "4"),
            KeyValue::new("a", "5"),
        ];

        let groups = group_by_key(kvs);
        let keys: Vec<&str> = groups.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);

        let mut a = groups[0].1.clone();
        a.sort();
        assert_eq!(a, vec!["2", "5"]);
        assert_eq!(groups[1].1.len(), 2);
        assert_eq!(groups[2].1, vec!["4"]);
    }

    #[test]
    fn run_reduce_junta_todos_los_shards() {
        let dir = temp_dir("merge");
        let storage = Storage::new(&dir);

        codec::write_file(
            &storage.shard_path("job", 0, 1),
            &[KeyValue::new("x", "m0"), KeyValue::new("y", "m0")],
        )
        .unwrap();
        codec::write_file(&storage.shard_path("job", 1, 1), &[]).unwrap();
        codec::write_file(
            &storage.shard_path("job", 2, 1),
            &[KeyValue::new("x", "m2"), KeyValue::new("a", "m2")],
        )
        .unwrap();

        let out = storage.reduce_output_path("job", 1);
        run_reduce(&storage, "job", 1, &out, 3, joined).unwrap();

        assert_eq!(
            codec::read_file(&out).unwrap(),
            vec![
                KeyValue::new("a", "m2"),
                KeyValue::new("x", "m0,m2"),
                KeyValue::new("y", "m0"),
            ]
        );
    }

    #[test]
    fn sin_pares_escribe_salida_vacia() {
        let dir = temp_dir("empty");
        let storage = Storage::new(&dir);

        codec::write_file(&storage.shard_path("job", 0, 0), &[]).unwrap();
        let out = storage.reduce_output_path("job", 0);
        run_reduce(&storage, "job", 0, &out, 1, count).unwrap();

        assert!(out.exists());
        assert!(fs::read_to_string(&out).unwrap().is_empty());

        // M = 0: tampoco hay shards que leer
        let out = storage.reduce_output_path("nomap", 0);
        run_reduce(&storage, "nomap", 0, &out, 0, count).unwrap();
        assert!(out.exists());
    }

    #[test]
    fn shard_faltante_o_corrupto_es_error() {
        let dir = temp_dir("broken");
        let storage = Storage::new(&dir);
        let out = storage.reduce_output_path("job", 0);

        assert!(run_reduce(&storage, "job", 0, &out, 1, count).is_err());

        fs::write(storage.shard_path("job", 0, 0), "no es json\n").unwrap();
        assert!(run_reduce(&storage, "job", 0, &out, 1, count).is_err());
        assert!(!out.exists());
    }

    #[test]
    fn reintento_pisa_la_salida_anterior() {
        let dir = temp_dir("retry");
        let storage = Storage::new(&dir);
        let out = storage.reduce_output_path("job", 0);

        fs::write(&out, "basura de un intento anterior\n").unwrap();
        codec::write_file(&storage.shard_path("job", 0, 0), &[KeyValue::new("k", "v")]).unwrap();

        run_reduce(&storage, "job", 0, &out, 1, count).unwrap();
        assert_eq!(codec::read_file(&out).unwrap(), vec![KeyValue::new("k", "1")]);
    }
}
