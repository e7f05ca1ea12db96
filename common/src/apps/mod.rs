use crate::{MapFn, ReduceFn};

pub mod indexer;
pub mod wc;

/// Par de funciones map/reduce que un worker puede ejecutar.
#[derive(Debug, Clone, Copy)]
pub struct App {
    pub name: &'static str,
    pub map: MapFn,
    pub reduce: ReduceFn,
}

pub const APPS: &[App] = &[
    App {
        name: "wc",
        map: wc::map,
        reduce: wc::reduce,
    },
    App {
        name: "indexer",
        map: indexer::map,
        reduce: indexer::reduce,
    },
];

pub fn get_app(name: &str) -> Option<App> {
    APPS.iter().copied().find(|app| app.name == name)
}
