//! Salesman CLI - distributed genetic search for short traveling-salesman tours.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use salesman_core::{
    tour_cost, DistanceMatrix, EvolutionConfig, Role, RunId, RunParameters, RunRecord, WorkerId,
};
use salesman_evolution::{transport_for, EvolutionEngine, LoggingObserver, RunOutcome};
use salesman_execution::{
    DistributedTransport, Scheduler, SchedulerConfig, TcpCoordinator, TcpWorker, WorkerAgent,
};
use salesman_storage::{load_matrix, save_matrix, JsonRunStore, RunStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "salesman")]
#[command(about = "Genetic search for short traveling-salesman tours", long_about = None)]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evolve in this process, optionally with in-process workers
    Run {
        /// Worker tasks to evaluate on (0 = evaluate inline)
        #[arg(long, default_value = "0")]
        workers: usize,
        #[command(flatten)]
        matrix: MatrixArgs,
        #[command(flatten)]
        evolution: EvolutionArgs,
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Coordinate worker processes over TCP
    Coordinator {
        /// Address to accept workers on
        #[arg(long, default_value = "127.0.0.1:7878")]
        listen: String,
        /// Worker connections to wait for
        #[arg(long)]
        workers: usize,
        /// Runs to perform against the same worker pool
        #[arg(long, default_value = "1")]
        runs: usize,
        /// Fail a batch if no worker replies within this many seconds
        #[arg(long)]
        reply_timeout: Option<u64>,
        #[command(flatten)]
        matrix: MatrixArgs,
        #[command(flatten)]
        evolution: EvolutionArgs,
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Evaluate tours for a coordinator
    Worker {
        /// Coordinator address
        #[arg(long, default_value = "127.0.0.1:7878")]
        connect: String,
        /// Number used in this worker's log lines
        #[arg(long, default_value = "0")]
        id: usize,
        /// Connection attempts before giving up
        #[arg(long, default_value = "10")]
        retries: usize,
        /// Milliseconds between connection attempts
        #[arg(long, default_value = "500")]
        retry_delay_ms: u64,
    },
    /// List stored runs
    History {
        /// Store directory
        #[arg(long, default_value = ".salesman")]
        store: PathBuf,
        /// Runs to show
        #[arg(long, default_value = "10")]
        limit: usize,
    },
    /// Write a random Euclidean distance matrix
    Generate {
        /// Number of cities
        #[arg(long)]
        cities: usize,
        /// Output JSON file
        #[arg(long)]
        out: PathBuf,
        /// Seed for the city layout
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[derive(Args)]
struct MatrixArgs {
    /// Matrix file (.json or whitespace-separated text)
    #[arg(long)]
    matrix: Option<PathBuf>,
    /// Cities in a random instance, when no file is given
    #[arg(long, default_value = "20")]
    cities: usize,
    /// Seed for the random instance
    #[arg(long)]
    matrix_seed: Option<u64>,
}

impl MatrixArgs {
    async fn load(&self) -> Result<DistanceMatrix> {
        match &self.matrix {
            Some(path) => load_matrix(path)
                .await
                .with_context(|| format!("loading {}", path.display())),
            None => {
                info!("Generating random instance with {} cities", self.cities);
                Ok(random_matrix(self.cities, self.matrix_seed))
            }
        }
    }
}

#[derive(Args)]
struct EvolutionArgs {
    /// JSON file with evolution parameters; flags below override it
    #[arg(long)]
    params: Option<PathBuf>,
    /// Individuals per generation
    #[arg(long)]
    pop_size: Option<usize>,
    /// Crossover probability
    #[arg(long)]
    crossover: Option<f64>,
    /// Mutation probability
    #[arg(long)]
    mutation: Option<f64>,
    /// Generations after the initial one
    #[arg(long)]
    generations: Option<usize>,
    /// Random seed
    #[arg(long)]
    seed: Option<u64>,
}

impl EvolutionArgs {
    async fn config(&self) -> Result<EvolutionConfig> {
        let mut config = match &self.params {
            Some(path) => {
                let json = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("reading {}", path.display()))?;
                serde_json::from_str(&json)
                    .with_context(|| format!("parsing {}", path.display()))?
            }
            None => EvolutionConfig::default(),
        };

        if let Some(pop_size) = self.pop_size {
            config = config.with_pop_size(pop_size);
        }
        if let Some(rate) = self.crossover {
            config = config.with_crossover_rate(rate);
        }
        if let Some(rate) = self.mutation {
            config = config.with_mutation_rate(rate);
        }
        if let Some(generations) = self.generations {
            config = config.with_generations(generations);
        }
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        Ok(config)
    }
}

#[derive(Args)]
struct StoreArgs {
    /// Store directory for run history
    #[arg(long, default_value = ".salesman")]
    store: PathBuf,
    /// Do not record the run
    #[arg(long)]
    no_save: bool,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Run {
            workers,
            matrix,
            evolution,
            store,
        } => {
            let matrix = Arc::new(matrix.load().await?);
            let config = evolution.config().await?;
            let parameters = config.parameters(matrix.size());

            info!("Starting as {} with {} in-process workers", Role::Coordinator, workers);
            let mut engine = EvolutionEngine::new(transport_for(workers, tour_cost), config)
                .with_observer(Box::new(observer_for(cli.verbose)));

            let outcome = engine.run(matrix).await?;
            print_outcome(&outcome);
            let run_id = save_outcome(&store, outcome, parameters).await;
            print_run_id(run_id);
        }
        Commands::Coordinator {
            listen,
            workers,
            runs,
            reply_timeout,
            matrix,
            evolution,
            store,
        } => {
            let matrix = Arc::new(matrix.load().await?);
            let config = evolution.config().await?;
            config.validate(matrix.size())?;
            anyhow::ensure!(workers > 0, "a coordinator needs at least one worker");

            let listener = TcpListener::bind(&listen)
                .await
                .with_context(|| format!("binding {}", listen))?;
            info!("Starting as {} on {}, waiting for {} workers", Role::Coordinator, listen, workers);
            let link = TcpCoordinator::accept(&listener, workers).await?;

            let mut scheduler_config = SchedulerConfig::new();
            if let Some(secs) = reply_timeout {
                scheduler_config = scheduler_config.with_reply_timeout(Duration::from_secs(secs));
            }
            let transport = DistributedTransport::new(Scheduler::new(link).with_config(scheduler_config));
            let mut engine = EvolutionEngine::new(Box::new(transport), config.clone())
                .with_observer(Box::new(observer_for(cli.verbose)));

            for run in 1..=runs {
                info!("Run {}/{}", run, runs);
                let outcome = engine.run(matrix.clone()).await?;
                print_outcome(&outcome);
                let run_id = save_outcome(&store, outcome, config.parameters(matrix.size())).await;
                print_run_id(run_id);
            }

            info!("All runs finished, releasing workers");
        }
        Commands::Worker {
            connect,
            id,
            retries,
            retry_delay_ms,
        } => {
            let id = WorkerId(id);
            info!("Starting as {} ({}), connecting to {}", Role::Worker, id, connect);
            let link = TcpWorker::connect_with_retry(
                &connect,
                retries.max(1),
                Duration::from_millis(retry_delay_ms),
            )
            .await
            .with_context(|| format!("connecting to {}", connect))?;

            let summary = WorkerAgent::new(id, link).run().await?;
            println!("Evaluated {} tours", summary.tasks_total);
        }
        Commands::History { store, limit } => {
            let store = JsonRunStore::new(&store).await?;
            let runs = store.list_runs(limit).await?;

            println!("Runs ({})", runs.len());
            for run in runs {
                println!(
                    "  {} | {} | {:.2} | {} cities, pop {}, {} gens | {:.2}s",
                    run.id,
                    run.created_at.format("%Y-%m-%d %H:%M:%S"),
                    run.best_distance,
                    run.parameters.num_cities,
                    run.parameters.pop_size,
                    run.parameters.generations,
                    run.elapsed_secs,
                );
            }
        }
        Commands::Generate { cities, out, seed } => {
            anyhow::ensure!(cities > 0, "need at least one city");
            let matrix = random_matrix(cities, seed);
            save_matrix(&out, &matrix).await?;
            println!("Wrote {}x{} matrix to {}", cities, cities, out.display());
        }
    }

    Ok(())
}

fn random_matrix(cities: usize, seed: Option<u64>) -> DistanceMatrix {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    DistanceMatrix::random_euclidean(cities, &mut rng)
}

fn observer_for(verbose: bool) -> LoggingObserver {
    if verbose {
        LoggingObserver::new()
    } else {
        LoggingObserver::new().with_interval(10)
    }
}

fn print_outcome(outcome: &RunOutcome) {
    let route: Vec<String> = outcome.best_route.iter().map(usize::to_string).collect();
    println!("Best distance: {:.2}", outcome.best_distance);
    println!("Best route: {}", route.join(" -> "));
    println!("Elapsed: {:.2}s", outcome.elapsed.as_secs_f64());
}

fn print_run_id(run_id: Option<RunId>) {
    match run_id {
        Some(id) => println!("Saved as run {}", id),
        None => println!("Run not saved"),
    }
}

/// Record a finished run. A store failure is logged and yields no id.
async fn save_outcome(
    args: &StoreArgs,
    outcome: RunOutcome,
    parameters: RunParameters,
) -> Option<RunId> {
    if args.no_save {
        return None;
    }
    let record = outcome.into_record(parameters);
    match try_save(&args.store, &record).await {
        Ok(id) => Some(id),
        Err(e) => {
            warn!("Could not save run to {}: {}", args.store.display(), e);
            None
        }
    }
}

async fn try_save(root: &Path, record: &RunRecord) -> salesman_storage::Result<RunId> {
    JsonRunStore::new(root).await?.save_run(record).await
}
