use anyhow::{bail, Context, Result};
use clap::Parser;
use common::{Job, Storage};
use glob::glob;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use master::{handlers, runner, AppState, HttpInvoker, TrackedInvoker};

#[derive(Parser)]
#[command(name = "master")]
#[command(about = "Coordinador MapReduce: reparte tareas map/reduce entre workers")]
struct Cli {
    /// Nombre del job (prefijo de los archivos intermedios)
    #[arg(long, default_value = "wc")]
    name: String,

    /// Cantidad de tareas reduce (N)
    #[arg(long, default_value_t = 3)]
    reduce: u32,

    /// Dirección donde escuchan los registros de workers y el estado
    #[arg(long, env = "MASTER_BIND", default_value = "127.0.0.1:8080")]
    bind: String,

    /// Seguir sirviendo el estado hasta Ctrl-C una vez terminado el job
    #[arg(long)]
    linger: bool,

    /// Archivos de entrada o patrones glob, uno por tarea map
    #[arg(value_name = "ENTRADAS")]
    inputs: Vec<String>,
}

/// Expande los patrones en la lista ordenada de archivos de entrada.
fn expand_inputs(patterns: &[String]) -> Result<Vec<String>> {
    let mut files = Vec::new();

    for pattern in patterns {
        let mut matched = false;
        for entry in glob(pattern).with_context(|| format!("patrón inválido: {}", pattern))? {
            let path = entry?;
            if path.is_file() {
                files.push(path.to_string_lossy().to_string());
                matched = true;
            }
        }
        if !matched {
            bail!("ningún archivo coincide con {}", pattern);
        }
    }

    Ok(files)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("master=debug,tower_http=info")),
        )
        .init();

    let cli = Cli::parse();
    if cli.reduce == 0 {
        bail!("--reduce tiene que ser al menos 1");
    }

    let job = Job::new(cli.name, expand_inputs(&cli.inputs)?, cli.reduce);
    let storage = Storage::from_env();
    storage.ensure_root()?;

    let state = AppState::new(&job);
    let app = handlers::build_router(state.clone());

    let listener = TcpListener::bind(&cli.bind)
        .await
        .with_context(|| format!("no se pudo escuchar en {}", cli.bind))?;
    info!("master escuchando en {}", listener.local_addr()?);

    let server = tokio::spawn(async move { axum::serve(listener, app).await });

    info!(
        "job {}: {} tareas map, {} reduce, datos en {}",
        job.name,
        job.n_map(),
        job.n_reduce,
        storage.root().display()
    );

    let invoker = Arc::new(TrackedInvoker::new(HttpInvoker::from_env()?, state.clone()));
    let results = runner::run_job(&job, &storage, &state, invoker).await?;
    println!("{}", results.merged);

    if cli.linger {
        info!("job terminado; sirviendo estado hasta Ctrl-C");
        tokio::signal::ctrl_c().await?;
    }

    server.abort();
    Ok(())
}
