pub mod handlers;
pub mod invoker;
pub mod pool;
pub mod runner;
pub mod scheduler;
pub mod state;

pub use invoker::{HttpInvoker, TaskInvoker, TrackedInvoker};
pub use pool::WorkerPool;
pub use scheduler::{schedule, CompletionBarrier, PhaseReport};
pub use state::AppState;
