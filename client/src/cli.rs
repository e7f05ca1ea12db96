use anyhow::Result;
use clap::{Parser, Subcommand};
use common::{codec, results::merge_outputs, JobInfo, Storage, WorkerInfo};
use reqwest::Client;
use std::{env, path::PathBuf};

/// Igual que en el worker:
/// - En Docker: MASTER_URL=http://master:8080
/// - Local: default http://localhost:8080
fn master_base_url() -> String {
    env::var("MASTER_URL").unwrap_or_else(|_| "http://localhost:8080".to_string())
}

#[derive(Parser)]
#[command(name = "client")]
#[command(about = "CLI simple para hablar con el master y revisar salidas")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Consulta el estado del job en curso
    Status,

    /// Lista los workers registrados
    Workers,

    /// Junta las salidas de las reduce en un único archivo ordenado
    Merge {
        /// Nombre del job
        #[arg(long)]
        job: String,

        /// Cantidad de tareas reduce del job
        #[arg(long)]
        reduce: u32,

        /// Directorio de datos (default: MR_DATA_DIR o ./data)
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Muestra un archivo de pares clave/valor como "clave valor"
    Show {
        #[arg(value_name = "ARCHIVO")]
        file: PathBuf,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let client = Client::new();
    let base_url = master_base_url();

    match cli.command {
        Commands::Status => {
            let url = format!("{}/api/v1/job", base_url);
            let resp = client.get(&url).send().await?;
            if resp.status().is_success() {
                let job: JobInfo = resp.json().await?;
                println!("Job:");
                println!("  nombre: {}", job.name);
                println!("  estado: {:?}", job.status);
                println!(
                    "  tareas: map={}, reduce={}, completadas={}, reintentos={}",
                    job.map_tasks, job.reduce_tasks, job.completed_tasks, job.retries
                );

                let total = job.map_tasks + job.reduce_tasks;
                if total > 0 {
                    let pct = (job.completed_tasks as f64 / total as f64) * 100.0;
                    println!("  progreso: {:.1}%", pct);
                } else {
                    println!("  progreso: (sin tareas)");
                }

                println!("  submitted_at: {}", job.submitted_at);
                if let Some(ref started) = job.started_at {
                    println!("  iniciado: {}", started);
                }
                if let Some(ref done) = job.finished_at {
                    println!("  finalizado: {}", done);
                }
                if let Some(ref output) = job.output {
                    println!("  salida: {}", output);
                }
            } else {
                println!("Error consultando el job (status {})", resp.status());
            }
        }

        Commands::Workers => {
            let url = format!("{}/api/v1/workers", base_url);
            let resp = client.get(&url).send().await?;
            if resp.status().is_success() {
                let workers: Vec<WorkerInfo> = resp.json().await?;
                if workers.is_empty() {
                    println!("No hay workers registrados.");
                }
                for w in workers {
                    println!("Worker {}", w.worker_id);
                    println!("  address : {}", w.address);
                    println!("  host    : {}", w.hostname);
                    println!("  idle    : {}", w.idle);
                    println!("  dead    : {}", w.dead);
                    println!(
                        "  tareas  : ok={}, failed={}",
                        w.tasks_succeeded, w.tasks_failed
                    );
                    println!();
                }
            } else {
                println!(
                    "Error consultando /api/v1/workers (status {})",
                    resp.status()
                );
            }
        }

        Commands::Merge {
            job,
            reduce,
            data_dir,
        } => {
            let storage = data_dir.map(Storage::new).unwrap_or_else(Storage::from_env);
            let results = merge_outputs(&storage, &job, reduce)?;
            println!(
                "Merge completado: {} claves en {}",
                results.keys, results.merged
            );
        }

        Commands::Show { file } => {
            for kv in codec::read_file(&file)? {
                println!("{} {}", kv.key, kv.value);
            }
        }
    }

    Ok(())
}
