use std::collections::BTreeSet;

use crate::KeyValue;

// índice invertido: palabra -> archivos donde aparece

pub fn map(filename: &str, contents: &str) -> Vec<KeyValue> {
    let unique: BTreeSet<&str> = contents
        .split(|c: char| !c.is_alphabetic())
        .filter(|w| !w.is_empty())
        .collect();

    unique
        .into_iter()
        .map(|w| KeyValue::new(w, filename))
        .collect()
}

pub fn reduce(_key: &str, values: &[String]) -> String {
    let mut files = values.to_vec();
    files.sort();
    format!("{} {}", files.len(), files.join(","))
}
