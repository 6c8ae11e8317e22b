use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::PathBuf;

mod cli;

use cli::Cli;
use cli::commands::Commands;
use submitr::config::{GlobalConfig, StorageBackend, load_config};
use submitr::domain::Capability;
use submitr::resilience::BreakerState;
use submitr::runner::{Simulation, SimulationReport, load_targets, synthetic_targets};
use submitr::storage::open_repository;

fn setup_logging() -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("submitr")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("submitr.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")
}

fn run_application(cli: &Cli, mut config: GlobalConfig) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Simulate {
            jobs,
            workers,
            targets,
            seed,
            json,
        } => {
            if let Some(jobs) = jobs {
                config.simulate.jobs = *jobs;
            }
            if let Some(workers) = workers {
                config.simulate.workers = *workers;
            }
            if let Some(seed) = seed {
                config.simulate.seed = *seed;
            }
            handle_simulate_command(config, targets.as_ref(), *json)
        }
        Commands::Config => handle_config_command(&config),
        Commands::Breakers => handle_breakers_command(&config),
    }
}

fn handle_simulate_command(config: GlobalConfig, targets: Option<&PathBuf>, json: bool) -> Result<()> {
    let directories = match targets {
        Some(path) => load_targets(path).with_context(|| format!("Failed to read targets from {}", path.display()))?,
        None => synthetic_targets(config.simulate.jobs),
    };
    info!(
        "Simulating {} directories with {} workers",
        directories.len(),
        config.simulate.workers
    );
    if !json {
        println!(
            "{} {} directories, {} workers",
            "Simulating:".cyan(),
            directories.len(),
            config.simulate.workers
        );
    }

    let simulation = Simulation::new(config).context("Failed to build orchestrator")?;
    let report = runtime()?
        .block_on(simulation.run(&directories))
        .context("Simulation failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report).context("Failed to encode report")?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &SimulationReport) {
    println!();
    println!("{}", "Jobs".bold());
    println!("  submitted  {}", report.submitted);
    if report.rejected > 0 {
        println!("  rejected   {}", report.rejected.to_string().red());
    }
    println!("  completed  {}", report.completed.to_string().green());
    println!("  exhausted  {}", report.exhausted.to_string().red());
    if report.cancelled > 0 {
        println!("  cancelled  {}", report.cancelled);
    }
    println!("  retried    {}", report.metrics.total_retried);
    println!("  elapsed    {}ms", report.elapsed_ms);

    println!();
    println!("{}", "Workers".bold());
    for (worker, processed) in &report.per_worker {
        println!("  {:<20} {}", worker, processed);
    }

    println!();
    println!("{}", "Providers".bold());
    for (name, health) in &report.metrics.per_provider {
        println!(
            "  {:<20} {:<10} ok={} failed={} rejected={}",
            name,
            colorize_state(health.state),
            health.successes,
            health.failures,
            health.rejections
        );
    }

    if !report.metrics.experiment_counts.is_empty() {
        println!();
        println!("{}", "Experiments".bold());
        for (experiment, variants) in &report.metrics.experiment_counts {
            let split: Vec<String> = variants.iter().map(|(v, n)| format!("{}={}", v, n)).collect();
            println!("  {:<20} {}", experiment, split.join(" "));
        }
    }
}

fn colorize_state(state: BreakerState) -> ColoredString {
    let label = format!("{:?}", state).to_lowercase();
    match state {
        BreakerState::Closed => label.green(),
        BreakerState::HalfOpen => label.yellow(),
        BreakerState::Open => label.red(),
    }
}

fn handle_config_command(config: &GlobalConfig) -> Result<()> {
    let yaml = serde_yaml::to_string(config).context("Failed to encode configuration")?;
    print!("{}", yaml);
    Ok(())
}

fn handle_breakers_command(config: &GlobalConfig) -> Result<()> {
    println!(
        "{:<20} {:>9} {:>10} {:>10}",
        "provider".bold(),
        "threshold".bold(),
        "reset".bold(),
        "timeout".bold()
    );
    for capability in Capability::ALL {
        let breaker = config.breaker_config(capability);
        println!(
            "{:<20} {:>9} {:>8}ms {:>8}ms",
            capability.as_str(),
            breaker.failure_threshold,
            breaker.reset_timeout.as_millis(),
            config.provider_timeout(capability).as_millis()
        );
    }

    if config.storage.backend == StorageBackend::Jsonl {
        let repository = open_repository(&config.storage).context("Failed to open repository")?;
        let snapshots = runtime()?
            .block_on(repository.list_breakers())
            .context("Failed to read breaker state")?;
        if !snapshots.is_empty() {
            println!();
            println!("{}", "Persisted state".bold());
            for snapshot in snapshots {
                println!(
                    "  {:<20} {:<10} failures={}",
                    snapshot.service_name,
                    colorize_state(snapshot.state),
                    snapshot.consecutive_failures
                );
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    // Setup logging first
    setup_logging().context("Failed to setup logging")?;

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = load_config(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, config).context("Application failed")?;

    Ok(())
}
