use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use pe_sched::config::Config;
use pe_sched::sim::{Simulation, SimulationReport, Workload};

#[derive(Parser, Debug)]
#[command(name = "pe-sched")]
#[command(version)]
#[command(about = "Space-shared, partitioned FCFS scheduler for multi-PE nodes")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Replay a workload trace against a simulated resource
    Simulate(SimulateArgs),
}

// =============================================================================
// Simulation Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct SimulateArgs {
    /// Workload trace: `job_id submit_time run_time num_pe [partition]` per line
    trace: PathBuf,

    /// TOML configuration file; flags below override its values
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Number of nodes
    #[arg(long)]
    nodes: Option<usize>,

    /// PEs per node
    #[arg(long)]
    pes_per_node: Option<usize>,

    /// PE rating, in work units per second
    #[arg(long)]
    rating: Option<f64>,

    /// Size cap of the medium pool, in nodes
    #[arg(long)]
    medium_nodes: Option<usize>,

    /// Owner id given to every trace job
    #[arg(long)]
    user_id: Option<u64>,

    /// Write the per-job CSV report here
    #[arg(long)]
    report: Option<PathBuf>,

    /// Write the utilization CSV here
    #[arg(long)]
    utilization: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

impl SimulateArgs {
    fn load_config(&self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_toml_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => Config::default(),
        };
        if let Some(nodes) = self.nodes {
            config.cluster.nodes = nodes;
        }
        if let Some(pes) = self.pes_per_node {
            config.cluster.pes_per_node = pes;
        }
        if let Some(rating) = self.rating {
            config.cluster.rating = rating;
            config.scheduler.pe_rating = rating;
        }
        if let Some(medium) = self.medium_nodes {
            config.scheduler.medium_pool_nodes = medium;
        }
        if let Some(user_id) = self.user_id {
            config.simulation.user_id = user_id;
        }
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Commands::Simulate(sim_args) => run_simulation(sim_args).await,
    }
}

// =============================================================================
// Simulation
// =============================================================================

async fn run_simulation(args: SimulateArgs) -> anyhow::Result<()> {
    let config = args.load_config()?;
    let workload = Workload::from_file(&args.trace)
        .with_context(|| format!("reading trace {}", args.trace.display()))?;

    let report = Simulation::new(config, workload).run().await?;

    if let Some(path) = &args.report {
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        report.write_jobs_csv(BufWriter::new(file))?;
        tracing::info!(path = %path.display(), "Job report written");
    }
    if let Some(path) = &args.utilization {
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        report.write_utilization_csv(BufWriter::new(file))?;
        tracing::info!(path = %path.display(), "Utilization report written");
    }

    match args.output {
        OutputFormat::Json => println!("{}", report.to_json()?),
        OutputFormat::Table => print_summary(&report),
    }
    Ok(())
}

fn print_summary(report: &SimulationReport) {
    let summary = report.summary();
    println!("Completed:        {}", summary.completed);
    println!("Canceled:         {}", summary.canceled);
    println!("Rejected:         {}", summary.rejected);
    println!("Unfinished:       {}", summary.unfinished);
    println!("Mean queue time:  {:.1}s", summary.mean_queue_time);
    println!("Mean run time:    {:.1}s", summary.mean_run_time);
    println!("Makespan:         {:.1}s", summary.makespan);
    println!("Peak PE load:     {:.1}%", report.peak_resource_load * 100.0);

    if report.rejected.is_empty() {
        return;
    }
    println!();
    println!("{:<10} {:<8} REASON", "JOB ID", "USER");
    for rejected in &report.rejected {
        println!(
            "{:<10} {:<8} {}",
            rejected.key.job_id, rejected.key.user_id, rejected.reason
        );
    }
}
