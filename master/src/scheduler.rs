use anyhow::{bail, Context, Result};
use common::{DoTaskArgs, Job, Phase};
use std::{collections::VecDeque, sync::Arc};
use tokio::{sync::mpsc, task::JoinSet};
use tracing::{debug, info, warn};

use crate::{invoker::TaskInvoker, pool::WorkerPool};

/// Resultado de un intento de despacho, etiquetado con el índice de la tarea.
#[derive(Debug)]
enum Completion {
    Succeeded {
        index: u32,
        worker: String,
    },
    Failed {
        index: u32,
        worker: String,
        error: anyhow::Error,
    },
    /// No se pudo obtener un worker: el pool fue cerrado
    PoolClosed {
        index: u32,
        error: anyhow::Error,
    },
}

/// Barrera de fin de etapa: cuenta un éxito por índice como máximo.
#[derive(Debug)]
pub struct CompletionBarrier {
    done: Vec<bool>,
    remaining: usize,
}

impl CompletionBarrier {
    pub fn new(tasks: u32) -> Self {
        Self {
            done: vec![false; tasks as usize],
            remaining: tasks as usize,
        }
    }

    /// Marca `index` como completada. Devuelve `false` si ya lo estaba
    /// (éxito duplicado de un reintento) o si el índice no existe.
    pub fn record(&mut self, index: u32) -> bool {
        match self.done.get_mut(index as usize) {
            Some(done) if !*done => {
                *done = true;
                self.remaining -= 1;
                true
            }
            _ => false,
        }
    }

    pub fn is_done(&self, index: u32) -> bool {
        self.done.get(index as usize).copied().unwrap_or(false)
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn is_complete(&self) -> bool {
        self.remaining == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseReport {
    pub phase: Phase,
    pub tasks: u32,
    /// Despachos lanzados, contando reintentos
    pub attempts: u32,
    pub failures: u32,
    /// Éxitos que llegaron para tareas ya completadas
    pub duplicates: u32,
    /// Workers que fallaron; no vuelven al pool
    pub failed_workers: Vec<String>,
}

/// Lleva una etapa del job hasta el final.
///
/// Cada índice pendiente se despacha en su propia tarea tokio: toma un worker
/// del pool (esperando si no hay), invoca la tarea y reporta un `Completion`.
/// Si el worker responde bien vuelve al pool; si falla se descarta y el índice
/// vuelve a la cola de pendientes sin backoff. Devuelve cuando todas las tareas
/// tienen exactamente un éxito registrado.
pub async fn schedule<I: TaskInvoker>(
    job: &Job,
    phase: Phase,
    pool: &WorkerPool,
    invoker: Arc<I>,
) -> Result<PhaseReport> {
    let tasks = job.task_count(phase);
    info!(
        "Schedule: {} tareas {} del job {} ({} I/Os)",
        tasks,
        phase,
        job.name,
        job.companion_count(phase)
    );

    let mut report = PhaseReport {
        phase,
        tasks,
        attempts: 0,
        failures: 0,
        duplicates: 0,
        failed_workers: Vec::new(),
    };

    let mut barrier = CompletionBarrier::new(tasks);
    let mut pending: VecDeque<u32> = (0..tasks).collect();
    let (tx, mut rx) = mpsc::unbounded_channel::<Completion>();
    let mut in_flight = JoinSet::new();

    while !barrier.is_complete() {
        while let Some(index) = pending.pop_front() {
            report.attempts += 1;
            let args = job.task_args(phase, index);
            in_flight.spawn(dispatch(pool.clone(), invoker.clone(), args, tx.clone()));
        }

        // `tx` sigue vivo acá, así que el canal no se cierra mientras esperamos
        let event = tokio::select! {
            event = rx.recv() => event.context("canal de completions cerrado")?,
            Some(joined) = in_flight.join_next() => {
                if let Err(e) = joined {
                    if e.is_panic() {
                        in_flight.abort_all();
                        bail!("un despacho de la etapa {} entró en pánico: {}", phase, e);
                    }
                }
                continue;
            }
        };

        match event {
            Completion::Succeeded { index, worker } => {
                if barrier.record(index) {
                    debug!(
                        "tarea {} {} completada por {} (faltan {})",
                        phase,
                        index,
                        worker,
                        barrier.remaining()
                    );
                } else {
                    report.duplicates += 1;
                    warn!(
                        "éxito duplicado de la tarea {} {} (worker {}), se ignora",
                        phase, index, worker
                    );
                }
            }
            Completion::Failed {
                index,
                worker,
                error,
            } => {
                report.failures += 1;
                report.failed_workers.push(worker.clone());

                if barrier.is_done(index) {
                    warn!(
                        "falló un duplicado de la tarea {} {} ya completada en {}: {:#}",
                        phase, index, worker, error
                    );
                } else {
                    warn!(
                        "tarea {} {} falló en {}: {:#}; reencolando",
                        phase, index, worker, error
                    );
                    pending.push_back(index);
                }
            }
            Completion::PoolClosed { index, error } => {
                in_flight.abort_all();
                return Err(error.context(format!(
                    "la tarea {} {} del job {} quedó sin worker",
                    phase, index, job.name
                )));
            }
        }
    }

    in_flight.abort_all();
    info!(
        "Schedule: {} terminado ({} tareas, {} intentos, {} fallos)",
        phase, report.tasks, report.attempts, report.failures
    );

    Ok(report)
}

async fn dispatch<I: TaskInvoker>(
    pool: WorkerPool,
    invoker: Arc<I>,
    args: DoTaskArgs,
    tx: mpsc::UnboundedSender<Completion>,
) {
    let index = args.task_index;

    let worker = match pool.acquire().await {
        Ok(w) => w,
        Err(error) => {
            warn!("tarea {} {} sin worker: {:#}", args.phase, index, error);
            let _ = tx.send(Completion::PoolClosed { index, error });
            return;
        }
    };

    debug!("asignando tarea {} {} a {}", args.phase, index, worker);

    let event = match invoker.invoke(&worker, &args).await {
        Ok(()) => {
            pool.release(worker.clone());
            Completion::Succeeded { index, worker }
        }
        // el worker que falló no vuelve al pool
        Err(error) => Completion::Failed {
            index,
            worker,
            error,
        },
    };

    let _ = tx.send(event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::{
        collections::HashSet,
        sync::{
            atomic::{AtomicU32, Ordering},
            Mutex,
        },
        time::Duration,
    };
    use tokio::time::timeout;

    fn job(files: usize, n_reduce: u32) -> Job {
        Job::new(
            "sched",
            (0..files).map(|i| format!("in-{i}.txt")).collect(),
            n_reduce,
        )
    }

    fn pool_with(workers: &[&str]) -> WorkerPool {
        let pool = WorkerPool::new();
        for w in workers {
            pool.register(w.to_string());
        }
        pool
    }

    /// Falla siempre el primer despacho de la tarea 0; el resto anda.
    /// También verifica que ningún worker esté en dos tareas a la vez.
    #[derive(Default)]
    struct FlakyInvoker {
        failed_once: Mutex<bool>,
        busy: Mutex<HashSet<String>>,
        double_booked: Mutex<bool>,
        calls: Mutex<Vec<(u32, String)>>,
    }

    #[async_trait]
    impl TaskInvoker for FlakyInvoker {
        async fn invoke(&self, worker: &str, args: &DoTaskArgs) -> Result<()> {
            if !self.busy.lock().unwrap().insert(worker.to_string()) {
                *self.double_booked.lock().unwrap() = true;
            }
            self.calls
                .lock()
                .unwrap()
                .push((args.task_index, worker.to_string()));

            tokio::time::sleep(Duration::from_millis(5)).await;
            self.busy.lock().unwrap().remove(worker);

            let mut failed = self.failed_once.lock().unwrap();
            if args.task_index == 0 && !*failed {
                *failed = true;
                anyhow::bail!("worker {} se cayó", worker);
            }
            Ok(())
        }
    }

    #[test]
    fn barrier_ignora_duplicados() {
        let mut barrier = CompletionBarrier::new(3);
        assert!(barrier.record(0));
        assert!(!barrier.record(0));
        assert_eq!(barrier.remaining(), 2);

        assert!(!barrier.record(7));
        assert!(barrier.record(2));
        assert!(barrier.record(1));
        assert!(barrier.is_complete());
        assert!(!barrier.record(1));
        assert_eq!(barrier.remaining(), 0);
    }

    #[test]
    fn barrier_vacia_esta_completa() {
        assert!(CompletionBarrier::new(0).is_complete());
    }

    #[tokio::test]
    async fn etapa_sin_tareas_termina_enseguida() {
        let pool = WorkerPool::new();
        let report = timeout(
            Duration::from_secs(1),
            schedule(&job(0, 3), Phase::Map, &pool, Arc::new(FlakyInvoker::default())),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(report.tasks, 0);
        assert_eq!(report.attempts, 0);
    }

    #[tokio::test]
    async fn reintenta_la_tarea_que_fallo_en_otro_worker() {
        let pool = pool_with(&["w1", "w2", "w3"]);
        let invoker = Arc::new(FlakyInvoker::default());

        let report = timeout(
            Duration::from_secs(5),
            schedule(&job(6, 2), Phase::Map, &pool, invoker.clone()),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(report.tasks, 6);
        assert_eq!(report.attempts, 7);
        assert_eq!(report.failures, 1);
        assert_eq!(report.duplicates, 0);
        assert!(!*invoker.double_booked.lock().unwrap());

        // el worker que falló no volvió al pool
        let dead = &report.failed_workers[0];
        assert_eq!(pool.idle_count(), 2);
        assert!(!pool.idle_workers().contains(dead));

        // la tarea 0 se ejecutó dos veces, en workers distintos
        let calls = invoker.calls.lock().unwrap();
        let zeros: Vec<&String> = calls.iter().filter(|(i, _)| *i == 0).map(|(_, w)| w).collect();
        assert_eq!(zeros.len(), 2);
        assert_ne!(zeros[0], zeros[1]);
    }

    #[tokio::test]
    async fn con_un_solo_worker_las_tareas_van_en_serie() {
        let pool = pool_with(&["unico"]);
        let invoker = Arc::new(FlakyInvoker {
            // sin fallos: ya "falló" antes
            failed_once: Mutex::new(true),
            ..Default::default()
        });

        let report = timeout(
            Duration::from_secs(5),
            schedule(&job(3, 4), Phase::Reduce, &pool, invoker.clone()),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(report.tasks, 4);
        assert_eq!(report.attempts, 4);
        assert!(!*invoker.double_booked.lock().unwrap());
        assert_eq!(pool.idle_workers(), vec!["unico".to_string()]);
    }

    /// Un worker que se registra recién después de empezar la etapa también se usa.
    #[tokio::test]
    async fn usa_workers_que_llegan_despues() {
        let pool = WorkerPool::new();
        let invoker = Arc::new(FlakyInvoker {
            failed_once: Mutex::new(true),
            ..Default::default()
        });

        let late = pool.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            late.register("tardio".to_string());
        });

        let report = timeout(
            Duration::from_secs(5),
            schedule(&job(2, 1), Phase::Map, &pool, invoker),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(report.attempts, 2);
    }

    /// Falla las primeras `n` invocaciones, sin importar la tarea.
    struct FailFirst {
        left: AtomicU32,
    }

    #[async_trait]
    impl TaskInvoker for FailFirst {
        async fn invoke(&self, worker: &str, _args: &DoTaskArgs) -> Result<()> {
            let prev = self
                .left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
            match prev {
                Ok(_) => anyhow::bail!("{} no responde", worker),
                Err(_) => Ok(()),
            }
        }
    }

    #[tokio::test]
    async fn sigue_reintentando_mientras_lleguen_workers() {
        let pool = pool_with(&["a", "b", "c", "d", "e"]);
        let invoker = Arc::new(FailFirst {
            left: AtomicU32::new(3),
        });

        let report = timeout(
            Duration::from_secs(5),
            schedule(&job(2, 1), Phase::Map, &pool, invoker),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(report.failures, 3);
        assert_eq!(report.attempts, 5);
        assert_eq!(pool.idle_count(), 2);
    }

    #[tokio::test]
    async fn pool_cerrado_corta_la_etapa_con_error() {
        let pool = WorkerPool::new();
        pool.close();

        let res = timeout(
            Duration::from_secs(1),
            schedule(&job(1, 2), Phase::Map, &pool, Arc::new(FlakyInvoker::default())),
        )
        .await
        .unwrap();
        assert!(res.is_err());
    }

    /// Entra en pánico en cada invocación.
    struct Panics;

    #[async_trait]
    impl TaskInvoker for Panics {
        async fn invoke(&self, worker: &str, _args: &DoTaskArgs) -> Result<()> {
            panic!("{} explotó", worker);
        }
    }

    #[tokio::test]
    async fn panico_en_un_despacho_no_cuelga_la_etapa() {
        let pool = pool_with(&["w1"]);

        let res = timeout(
            Duration::from_secs(1),
            schedule(&job(1, 2), Phase::Map, &pool, Arc::new(Panics)),
        )
        .await
        .unwrap();
        assert!(res.is_err());
    }
}
