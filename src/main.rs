use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgGroup, Args, Parser, Subcommand};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing_subscriber::EnvFilter;

mod db;
mod join;
mod models;
mod performance;
mod ranking;
mod report;
mod trend;

use db::LoaderConfig;
use models::{QueryWindow, WorkerPerformance};

#[derive(Parser)]
#[command(name = "housekeeping-performance")]
#[command(about = "Per-cleaner performance analytics for housekeeping teams", long_about = None)]
struct Cli {
    #[command(flatten)]
    settings: Settings,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Settings {
    /// Maximum Postgres connections in the pool
    #[arg(long, global = true, env = "DB_MAX_CONNECTIONS", default_value_t = 5)]
    max_connections: u32,
    /// Task ids per assignment lookup
    #[arg(long, global = true, env = "ASSIGNMENT_BATCH_SIZE", default_value_t = 500,
          value_parser = clap::value_parser!(u32).range(1..))]
    assignment_batch_size: u32,
    /// Assignment lookups in flight at once
    #[arg(long, global = true, env = "FETCH_CONCURRENCY", default_value_t = 4,
          value_parser = clap::value_parser!(u32).range(1..))]
    fetch_concurrency: u32,
}

impl Settings {
    fn loader(&self) -> LoaderConfig {
        LoaderConfig {
            assignment_batch_size: self.assignment_batch_size as usize,
            fetch_concurrency: self.fetch_concurrency as usize,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load four weeks of demo cleans
    Seed,
    /// Import tasks and/or assignments from CSV files
    #[command(group(
        ArgGroup::new("source")
            .args(["tasks", "assignments"])
            .required(true)
            .multiple(true)
    ))]
    Import {
        #[arg(long)]
        tasks: Option<PathBuf>,
        #[arg(long)]
        assignments: Option<PathBuf>,
    },
    /// Rank cleaners by average clean time
    Score {
        #[arg(long, default_value_t = 28)]
        since_days: i64,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Print every metric as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown report
    Report {
        #[arg(long, default_value_t = 28)]
        since_days: i64,
        #[arg(long, default_value = "performance.md")]
        out: PathBuf,
    },
    /// Show the full breakdown for one cleaner
    Worker {
        #[arg(long)]
        name: String,
        #[arg(long, default_value_t = 28)]
        since_days: i64,
        #[arg(long)]
        json: bool,
    },
}

async fn load_performance(
    pool: &PgPool,
    window: &QueryWindow,
    loader: &LoaderConfig,
) -> anyhow::Result<Vec<WorkerPerformance>> {
    let tasks = db::fetch_finished_tasks(pool, window).await?;
    let task_ids: Vec<i64> = tasks.iter().map(|t| t.task_id).collect();
    let assignments = db::fetch_assignments(pool, &task_ids, loader).await?;
    let baselines = db::fetch_property_baselines(pool).await?;

    Ok(performance::analyze(&tasks, &assignments, &baselines))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to the housekeeping Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(cli.settings.max_connections)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;
    let loader = cli.settings.loader();

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { tasks, assignments } => {
            if let Some(path) = tasks {
                let written = db::import_tasks_csv(&pool, &path).await?;
                println!("Wrote {written} tasks from {}.", path.display());
            }
            if let Some(path) = assignments {
                let inserted = db::import_assignments_csv(&pool, &path).await?;
                println!("Inserted {inserted} assignments from {}.", path.display());
            }
        }
        Commands::Score {
            since_days,
            limit,
            json,
        } => {
            let window = QueryWindow::last_days(since_days);
            let workers = load_performance(&pool, &window, &loader).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&workers)?);
                return Ok(());
            }

            if workers.is_empty() {
                println!("No cleaners with enough finished cleans in this window.");
                return Ok(());
            }

            println!("Fastest cleaners:");
            for worker in workers.iter().take(limit) {
                println!("{}", report::score_line(worker));
            }
        }
        Commands::Report { since_days, out } => {
            let window = QueryWindow::last_days(since_days);
            let workers = load_performance(&pool, &window, &loader).await?;
            let report = report::build_report(window.start.date_naive(), &workers);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Worker {
            name,
            since_days,
            json,
        } => {
            let window = QueryWindow::last_days(since_days);
            let workers = load_performance(&pool, &window, &loader).await?;
            let Some(worker) = workers
                .iter()
                .find(|w| w.worker_name.eq_ignore_ascii_case(name.trim()))
            else {
                println!("{name} has no ranked cleans in this window.");
                return Ok(());
            };

            if json {
                println!("{}", serde_json::to_string_pretty(worker)?);
            } else {
                print!("{}", report::worker_detail(worker));
            }
        }
    }

    Ok(())
}
