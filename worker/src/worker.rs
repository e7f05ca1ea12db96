use anyhow::{bail, Context, Result};
use axum::{extract::State, http::StatusCode, routing::{get, post}, Json, Router};
use common::{
    apps::{get_app, App},
    map::run_map,
    reduce::run_reduce,
    DoTaskArgs, DoTaskResponse, Phase, Storage, WorkerRegisterRequest, WorkerRegisterResponse,
};
use reqwest::Client;
use std::{
    env,
    net::SocketAddr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{net::TcpListener, sync::Notify, time::sleep};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_APP: &str = "wc";
const REGISTER_ATTEMPTS: u32 = 10;

/// URL base del master.
/// - En Docker: MASTER_URL=http://master:8080
/// - Local: default http://localhost:8080
fn master_base_url() -> String {
    env::var("MASTER_URL").unwrap_or_else(|_| "http://localhost:8080".to_string())
}

#[derive(Clone)]
pub struct WorkerState {
    storage: Storage,
    app: App,
    served: Arc<AtomicU64>,
    /// Con WORKER_MAX_TASKS el worker se apaga tras esa cantidad de tareas
    max_tasks: Option<u64>,
    shutdown: Arc<Notify>,
}

impl WorkerState {
    pub fn new(storage: Storage, app: App, max_tasks: Option<u64>) -> Self {
        Self {
            storage,
            app,
            served: Arc::new(AtomicU64::new(0)),
            max_tasks,
            shutdown: Arc::new(Notify::new()),
        }
    }
}

pub fn build_router(state: WorkerState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/v1/tasks/do", post(do_task))
        .with_state(state)
}

/// Ejecuta el cuerpo de una tarea map o reduce en este proceso.
pub fn execute(storage: &Storage, app: App, args: &DoTaskArgs) -> Result<()> {
    match args.phase {
        Phase::Map => {
            let Some(file) = args.file.as_deref() else {
                bail!("tarea map {} sin archivo de entrada", args.task_index);
            };
            run_map(
                storage,
                &args.job_name,
                args.task_index,
                file,
                args.companion,
                app.map,
            )
        }
        Phase::Reduce => {
            let out = storage.reduce_output_path(&args.job_name, args.task_index);
            run_reduce(
                storage,
                &args.job_name,
                args.task_index,
                &out,
                args.companion,
                app.reduce,
            )
        }
    }
}

async fn do_task(
    State(state): State<WorkerState>,
    Json(args): Json<DoTaskArgs>,
) -> Result<Json<DoTaskResponse>, StatusCode> {
    let n = state.served.fetch_add(1, Ordering::SeqCst) + 1;
    if let Some(max) = state.max_tasks {
        if n > max {
            state.shutdown.notify_one();
            return Err(StatusCode::SERVICE_UNAVAILABLE);
        }
    }

    info!(
        "tengo tarea {} {} del job {} ({} I/Os)",
        args.phase, args.task_index, args.job_name, args.companion
    );

    let storage = state.storage.clone();
    let app = state.app;
    let task = args.clone();
    let handle = tokio::task::spawn_blocking(move || execute(&storage, app, &task));

    let result = match handle.await {
        Ok(Ok(())) => {
            info!("terminé tarea {} {} correctamente", args.phase, args.task_index);
            Ok(Json(DoTaskResponse { ok: true }))
        }
        Ok(Err(e)) => {
            warn!("error procesando tarea {} {}: {:#}", args.phase, args.task_index, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
        Err(e) => {
            warn!("panic o join error en tarea {} {}: {:?}", args.phase, args.task_index, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    };

    if state.max_tasks.is_some_and(|max| n >= max) {
        info!("llegué a {} tareas, apagando", n);
        state.shutdown.notify_one();
    }

    result
}

/// Dirección que se registra en el master: WORKER_ADVERTISE si está definida
/// (p. ej. el nombre del contenedor), si no la dirección local del listener.
fn advertised_address(advertise: Option<String>, local: SocketAddr) -> String {
    advertise
        .filter(|a| !a.trim().is_empty())
        .unwrap_or_else(|| local.to_string())
}

/// Se registra en el master, reintentando mientras el master no esté arriba.
async fn register(client: &Client, base_url: &str, address: &str, hostname: &str) -> Result<()> {
    let register_url = format!("{}/api/v1/workers/register", base_url);

    for attempt in 1..=REGISTER_ATTEMPTS {
        let res = client
            .post(&register_url)
            .json(&WorkerRegisterRequest {
                address: address.to_string(),
                hostname: hostname.to_string(),
            })
            .send()
            .await
            .and_then(|r| r.error_for_status());

        match res {
            Ok(resp) => {
                let WorkerRegisterResponse { worker_id } = resp.json().await?;
                info!("worker {} registrado en {} contra {}", worker_id, address, base_url);
                return Ok(());
            }
            Err(e) => {
                warn!("registro fallido (intento {}/{}): {}", attempt, REGISTER_ATTEMPTS, e);
                sleep(Duration::from_secs(1)).await;
            }
        }
    }

    bail!("no se pudo registrar en {}", base_url)
}

/// Loop principal del worker.
/// - Levanta el endpoint de tareas.
/// - Se registra en el master con la dirección donde escucha.
/// - Atiende tareas hasta que lo apaguen (o hasta WORKER_MAX_TASKS).
pub async fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("worker=debug,reqwest=info")),
        )
        .init();

    let storage = Storage::from_env();
    storage.ensure_root()?;

    let app_name = env::var("WORKER_APP").unwrap_or_else(|_| DEFAULT_APP.to_string());
    let app = get_app(&app_name).with_context(|| format!("aplicación desconocida: {}", app_name))?;

    let max_tasks: Option<u64> = env::var("WORKER_MAX_TASKS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok());

    let bind = env::var("WORKER_BIND").unwrap_or_else(|_| "127.0.0.1:0".to_string());
    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("no se pudo escuchar en {}", bind))?;
    let address = advertised_address(env::var("WORKER_ADVERTISE").ok(), listener.local_addr()?);

    let state = WorkerState::new(storage, app, max_tasks);
    let shutdown = state.shutdown.clone();
    let router = build_router(state);

    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.notified().await })
            .await
    });

    let hostname = hostname::get()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();
    let base_url = master_base_url();
    register(&Client::new(), &base_url, &address, &hostname).await?;

    info!("worker {} ({}) atendiendo tareas en {}", app.name, hostname, address);
    server.await??;
    info!("worker apagado");

    Ok(())
}
