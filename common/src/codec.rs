//! Formato de shards y salidas: JSON Lines, un `KeyValue` por línea.
//!
//! El escapado de strings de JSON garantiza que claves y valores con saltos
//! de línea, comillas o vacíos vuelvan tal cual al decodificar.

use anyhow::{Context, Result};
use std::{
    fs::{self, File},
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};

use crate::KeyValue;

/// Escribe cada par como una línea JSON.
pub fn write_records<'a, W, I>(writer: &mut W, records: I) -> Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a KeyValue>,
{
    for kv in records {
        serde_json::to_writer(&mut *writer, kv)?;
        writer.write_all(b"\n")?;
    }
    Ok(())
}

/// Lee todos los pares de un stream JSONL. Las líneas vacías se saltan;
/// una línea mal formada aborta con el número de línea.
pub fn read_records<R: BufRead>(reader: R) -> Result<Vec<KeyValue>> {
    let mut out = Vec::new();

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let kv: KeyValue = serde_json::from_str(&line)
            .with_context(|| format!("registro mal formado en la línea {}", i + 1))?;
        out.push(kv);
    }

    Ok(out)
}

pub fn read_file(path: &Path) -> Result<Vec<KeyValue>> {
    let file =
        File::open(path).with_context(|| format!("no se pudo abrir {}", path.display()))?;
    read_records(BufReader::new(file)).with_context(|| format!("decodificando {}", path.display()))
}

/// Escribe `path` completo o nada: primero a un temporal hermano y luego `rename`.
/// Un reintento pisa la salida anterior entera; un intento abortado no deja
/// un archivo a medias con el nombre final.
pub fn write_file_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("out");
    let tmp_path = path.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

    let result = (|| {
        let file = File::create(&tmp_path)
            .with_context(|| format!("no se pudo crear {}", tmp_path.display()))?;
        let mut writer = BufWriter::new(file);
        write(&mut writer)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        fs::rename(&tmp_path, path)
            .with_context(|| format!("no se pudo renombrar a {}", path.display()))
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

pub fn write_file(path: &Path, records: &[KeyValue]) -> Result<()> {
    write_file_atomic(path, |w| write_records(w, records))
}
