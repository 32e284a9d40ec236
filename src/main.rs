use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use jobdrop::config::AppConfig;
use jobdrop::jobs::{FsJobStore, JobStore};
use jobdrop::shutdown::install_shutdown_handler;
use jobdrop::web::{self, AppState};

#[derive(Parser, Debug)]
#[command(name = "jobdrop")]
#[command(version)]
#[command(about = "Upload configs, launch analysis jobs, follow their logs")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the HTTP front-end
    Serve(ConfigArgs),

    /// Load and validate the configuration, including the secret file, then exit
    CheckConfig(ConfigArgs),

    /// Inspect jobs directly on disk
    Job {
        #[command(flatten)]
        config: ConfigArgs,

        /// Output format
        #[arg(long, short = 'o', default_value = "table")]
        output: OutputFormat,

        #[command(subcommand)]
        command: JobCommands,
    },
}

#[derive(Parser, Debug)]
struct ConfigArgs {
    /// Path to the TOML configuration file
    #[arg(long, short = 'c', default_value = "jobdrop.toml")]
    config: PathBuf,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(clap::Subcommand, Debug)]
enum JobCommands {
    /// List all jobs, most recent first
    List,
    /// Show status and log of one job
    Status {
        /// Job name as shown by `job list`
        name: String,
    },
}

#[derive(Serialize)]
struct JobStatusOutput {
    name: String,
    status: String,
    log: String,
}

fn init_logging(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
}

fn protected_dir() -> Result<PathBuf, Box<dyn std::error::Error>> {
    Ok(std::env::current_dir()?)
}

// =============================================================================
// Server
// =============================================================================

async fn run_server(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_file(config_path)?;
    init_logging(&config.logging.level);

    let state = match AppState::from_config(&config, &protected_dir()?) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "Refusing to start");
            return Err(e.into());
        }
    };

    tracing::info!(
        listen_addr = %config.server.listen_addr,
        output_dir = %config.paths.output_dir.display(),
        interpreter = %config.launcher.interpreter.display(),
        shares = config.servers.len(),
        "Starting jobdrop"
    );

    let shutdown = install_shutdown_handler();
    let app = web::router(state, config.server.max_upload_bytes);
    web::serve(config.server.listen_addr, app, shutdown).await?;
    Ok(())
}

async fn check_config(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_file(config_path)?;
    let state = AppState::from_config(&config, &protected_dir()?)?;
    let attempts = state.gate.attempt_count().await?;

    println!("Configuration OK: {}", config_path.display());
    println!("Listen address:  {}", config.server.listen_addr);
    println!("Output dir:      {}", config.paths.output_dir.display());
    println!(
        "Attempt log:     {} ({} of {} attempts used)",
        config.gate.attempt_log.display(),
        attempts,
        config.gate.max_attempts
    );
    for (share, path) in state.registry.shares() {
        println!("Share:           {} -> {}", share, path);
    }
    Ok(())
}

// =============================================================================
// Job Commands
// =============================================================================

fn handle_job_list(store: &FsJobStore, output: &OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let jobs = store.summaries()?;
    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&jobs)?),
        OutputFormat::Table => {
            if jobs.is_empty() {
                println!("No jobs found.");
                return Ok(());
            }
            println!("{:<48} {:<10}", "JOB", "STATUS");
            println!("{}", "-".repeat(60));
            for job in &jobs {
                println!("{:<48} {:<10}", job.name, job.status);
            }
            println!();
            println!("{} jobs", jobs.len());
        }
    }
    Ok(())
}

fn handle_job_status(
    store: &FsJobStore,
    name: &str,
    output: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let Some(status) = store.status(name)? else {
        return Err(format!("Job not found: {}", name).into());
    };
    let log = store.read_log(name)?.unwrap_or_default();

    match output {
        OutputFormat::Json => {
            let out = JobStatusOutput {
                name: name.to_string(),
                status: status.to_string(),
                log,
            };
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Table => {
            println!("Job:    {}", name);
            println!("Status: {}", status);
            println!("Log:");
            for line in log.lines() {
                println!("  {}", line);
            }
        }
    }
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Serve(config) => run_server(&config.config).await?,
        Commands::CheckConfig(config) => check_config(&config.config).await?,
        Commands::Job {
            config,
            output,
            command,
        } => {
            let config = AppConfig::from_file(&config.config)?;
            let store = FsJobStore::new(config.paths.output_dir);
            match command {
                JobCommands::List => handle_job_list(&store, &output)?,
                JobCommands::Status { name } => handle_job_status(&store, &name, &output)?,
            }
        }
    }

    Ok(())
}
