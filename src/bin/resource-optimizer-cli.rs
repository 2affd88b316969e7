//! Thin CLI front-end over the resource-optimizer library: inspects and
//! operates on the persisted sample store and rollback store without
//! running a reconciliation cycle. A real deployment is expected to run
//! [`resource_optimizer::controller::OptimizerController`] as a service and
//! use this binary only for ad-hoc inspection/rollback against the same
//! state directory.

use clap::{Parser, Subcommand};
use resource_optimizer::cost::{hourly_cost, CostProjection, Price};
use resource_optimizer::orchestrator::NullOrchestratorClient;
use resource_optimizer::rollback::{self, RollbackStore};
use resource_optimizer::store::{self, SampleStore};
use resource_optimizer::types::{WorkloadId, WorkloadKind};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "resource-optimizer-cli")]
#[command(about = "Inspect and operate on a resource optimizer's persisted state")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding the sample store and rollback store snapshots.
    #[arg(long, default_value = "./state")]
    state_dir: PathBuf,

    /// CPU price, per core per hour, used by `cost`.
    #[arg(long, default_value_t = 0.04)]
    cpu_price: f64,

    /// Memory price, per GiB per hour, used by `cost`.
    #[arg(long, default_value_t = 0.01)]
    memory_price: f64,
}

#[derive(Subcommand)]
enum Commands {
    /// Roll back a workload (or one of its containers) to its last-but-one
    /// applied resource configuration.
    Rollback {
        /// Workload reference, `namespace/kind/name`.
        workload: String,
        /// Limit the rollback to a single container.
        #[arg(long)]
        container: Option<String>,
    },
    /// Report current and projected resource cost.
    Cost {
        /// Aggregate cost across every tracked namespace.
        #[arg(long)]
        all_namespaces: bool,
        /// Limit the report to workloads with this name.
        #[arg(long)]
        workload: Option<String>,
    },
    /// Show rollback history.
    History {
        /// Limit the report to workloads with this name.
        #[arg(long)]
        workload: Option<String>,
    },
}

/// Usage error: bad arguments, unparseable workload reference.
const EXIT_USAGE: u8 = 1;
/// Runtime failure: I/O error, no matching state.
const EXIT_RUNTIME: u8 = 2;

fn parse_workload_ref(raw: &str) -> Result<WorkloadId, String> {
    let parts: Vec<&str> = raw.split('/').collect();
    let [namespace, kind, name] = parts[..] else {
        return Err(format!("expected `namespace/kind/name`, got `{raw}`"));
    };
    let kind = match kind.to_ascii_lowercase().as_str() {
        "deployment" | "deployments" => WorkloadKind::Deployment,
        "statefulset" | "statefulsets" => WorkloadKind::StatefulSet,
        "daemonset" | "daemonsets" => WorkloadKind::DaemonSet,
        other => return Err(format!("unknown workload kind `{other}`")),
    };
    Ok(WorkloadId::new(namespace, kind, name))
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Usage(message)) => {
            eprintln!("usage error: {message}");
            ExitCode::from(EXIT_USAGE)
        }
        Err(CliError::Runtime(message)) => {
            eprintln!("error: {message}");
            ExitCode::from(EXIT_RUNTIME)
        }
    }
}

enum CliError {
    Usage(String),
    Runtime(String),
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Rollback { workload, container } => {
            run_rollback(&cli.state_dir, &workload, container.as_deref()).await
        }
        Commands::Cost { all_namespaces, workload } => {
            run_cost(&cli.state_dir, all_namespaces, workload.as_deref(), cli.cpu_price, cli.memory_price).await
        }
        Commands::History { workload } => run_history(&cli.state_dir, workload.as_deref()).await,
    }
}

async fn run_rollback(state_dir: &PathBuf, workload_ref: &str, container: Option<&str>) -> Result<(), CliError> {
    let workload = parse_workload_ref(workload_ref).map_err(CliError::Usage)?;

    let store = RollbackStore::new();
    let path = rollback::default_snapshot_path(state_dir);
    store
        .load_snapshot(&path)
        .await
        .map_err(|e| CliError::Runtime(format!("loading rollback store: {e}")))?;

    let history = store.history_for(&workload).await;
    if history.is_empty() {
        return Err(CliError::Runtime(format!("no rollback history for {}/{:?}/{}", workload.namespace, workload.kind, workload.name)));
    }

    let containers: Vec<String> = match container {
        Some(c) => vec![c.to_string()],
        None => {
            let mut names: Vec<String> = history.iter().map(|e| e.container.clone()).collect();
            names.sort();
            names.dedup();
            names
        }
    };

    let client = NullOrchestratorClient;
    let mut rolled_back = 0usize;
    for container in &containers {
        let ok = store
            .rollback_workload(&client, &workload, container)
            .await
            .map_err(|e| CliError::Runtime(format!("rolling back {container}: {e}")))?;
        if ok {
            println!("rolled back {}/{}", workload.name, container);
            rolled_back += 1;
        } else {
            println!("skipped {}/{}: fewer than two history entries", workload.name, container);
        }
    }

    store
        .save_snapshot(&path)
        .await
        .map_err(|e| CliError::Runtime(format!("saving rollback store: {e}")))?;

    if rolled_back == 0 {
        return Err(CliError::Runtime("no container had enough history to roll back".to_string()));
    }
    Ok(())
}

async fn run_cost(
    state_dir: &PathBuf,
    all_namespaces: bool,
    workload_name: Option<&str>,
    cpu_price: f64,
    memory_price: f64,
) -> Result<(), CliError> {
    if !all_namespaces && workload_name.is_none() {
        return Err(CliError::Usage("specify --all-namespaces or --workload NAME".to_string()));
    }

    let price = Price {
        cpu_per_core_hour: cpu_price,
        memory_per_gb_hour: memory_price,
    };

    let samples_store = SampleStore::new();
    let path = store::default_snapshot_path(state_dir);
    samples_store
        .load_snapshot(&path)
        .await
        .map_err(|e| CliError::Runtime(format!("loading sample store: {e}")))?;

    let snapshot = samples_store.snapshot().await;
    let mut total_hourly = 0.0;
    let mut reported = 0usize;

    for (workload, samples) in &snapshot {
        if let Some(name) = workload_name {
            if workload.name != name {
                continue;
            }
        }

        let mut by_container: std::collections::HashMap<&str, &resource_optimizer::types::ContainerSample> =
            std::collections::HashMap::new();
        for sample in samples {
            by_container
                .entry(sample.container.as_str())
                .and_modify(|existing| {
                    if sample.timestamp > existing.timestamp {
                        *existing = sample;
                    }
                })
                .or_insert(sample);
        }

        for (container, sample) in by_container {
            let hourly = hourly_cost(sample.request_cpu_millicores, sample.request_memory_bytes, price);
            let projection = CostProjection::from_hourly(hourly);
            println!(
                "{}/{}/{} [{container}]: ${:.4}/hr, ${:.2}/mo",
                workload.namespace, workload.name, container, projection.hourly, projection.monthly
            );
            total_hourly += hourly;
            reported += 1;
        }
    }

    if reported == 0 {
        return Err(CliError::Runtime("no matching workloads found in the sample store".to_string()));
    }

    let totals = CostProjection::from_hourly(total_hourly);
    println!("total: ${:.4}/hr, ${:.2}/mo", totals.hourly, totals.monthly);
    Ok(())
}

async fn run_history(state_dir: &PathBuf, workload_name: Option<&str>) -> Result<(), CliError> {
    let store = RollbackStore::new();
    let path = rollback::default_snapshot_path(state_dir);
    store
        .load_snapshot(&path)
        .await
        .map_err(|e| CliError::Runtime(format!("loading rollback store: {e}")))?;

    let entries = store.all_entries().await;
    let mut printed = 0usize;
    for (key, history) in &entries {
        if let Some(name) = workload_name {
            if key.workload.name != name {
                continue;
            }
        }
        for entry in history {
            println!(
                "{}/{}/{} cpu={}m memory={}B at {}",
                key.workload.namespace, key.workload.name, key.container, entry.cpu, entry.memory, entry.timestamp
            );
            printed += 1;
        }
    }

    if printed == 0 {
        return Err(CliError::Runtime("no rollback history recorded".to_string()));
    }
    Ok(())
}
