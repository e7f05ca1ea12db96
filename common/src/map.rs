use anyhow::{bail, Context, Result};
use fnv::FnvHasher;
use std::{fs, hash::Hasher, path::Path};
use tracing::debug;

use crate::{codec, storage::Storage, KeyValue, MapFn};

/// Hash estable y no negativo de una clave. Elige la partición con `ihash(key) % n_reduce`.
/// Tiene que dar el mismo valor en todos los procesos (FNV-1a, no `DefaultHasher`).
pub fn ihash(key: &str) -> u32 {
    let mut h = FnvHasher::default();
    h.write(key.as_bytes());
    (h.finish() & 0x7fff_ffff) as u32
}

/// Reparte los pares en `n` particiones según hash(key) % n.
pub fn partition(kvs: Vec<KeyValue>, n: u32) -> Vec<Vec<KeyValue>> {
    let mut parts: Vec<Vec<KeyValue>> = (0..n).map(|_| Vec::new()).collect();

    for kv in kvs {
        let pid = (ihash(&kv.key) % n) as usize;
        parts[pid].push(kv);
    }

    parts
}

/// Ejecuta una tarea map:
/// 1. Lee `in_file` completo.
/// 2. Llama a `map_fn(in_file, contenido)`.
/// 3. Reparte la salida en `n_reduce` shards y escribe cada uno (aunque quede vacío).
///
/// Cualquier error de lectura/escritura aborta la tarea. Un reintento vuelve a
/// escribir los `n_reduce` shards desde cero.
pub fn run_map(
    storage: &Storage,
    job_name: &str,
    map_task: u32,
    in_file: &str,
    n_reduce: u32,
    map_fn: MapFn,
) -> Result<()> {
    if n_reduce == 0 {
        bail!("la tarea map {} necesita al menos una partición", map_task);
    }

    // la entrada puede no ser UTF-8; los bytes inválidos se reemplazan
    let raw = fs::read(Path::new(in_file))
        .with_context(|| format!("no se pudo leer la entrada {}", in_file))?;
    let contents = String::from_utf8_lossy(&raw);

    let kvs = map_fn(in_file, &contents);
    debug!(
        "map {} de {}: {} pares desde {}",
        map_task,
        job_name,
        kvs.len(),
        in_file
    );

    for (r, part) in partition(kvs, n_reduce).into_iter().enumerate() {
        let path = storage.shard_path(job_name, map_task, r as u32);
        codec::write_file(&path, &part)
            .with_context(|| format!("escribiendo shard {}", path.display()))?;
    }

    Ok(())
}
