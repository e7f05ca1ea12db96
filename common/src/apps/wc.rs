use crate::KeyValue;

/// Emite (palabra, "1") por cada secuencia de letras del contenido.
pub fn map(_filename: &str, contents: &str) -> Vec<KeyValue> {
    contents
        .split(|c: char| !c.is_alphabetic())
        .filter(|w| !w.is_empty())
        .map(|w| KeyValue::new(w, "1"))
        .collect()
}

/// Cantidad de apariciones de la palabra.
pub fn reduce(_key: &str, values: &[String]) -> String {
    values.len().to_string()
}
