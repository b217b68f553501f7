//! RAN Planning CLI
//!
//! Usage:
//!   ran-plan generate --scenario scenario.toml --out net/
//!   ran-plan derive net/ --config planner.toml
//!   ran-plan sweep net/ --output sweep.json
//!   ran-plan allocate net/ --lp model.lp --output allocation.json
//!   ran-plan linearize db-to-lin-relative --lower 0 --upper 30 --tolerance 0.05

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ran_planner::{run, Conversion, PlannerConfig, Report};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "ran-plan", about = "Radio-access network planning and resource allocation")]
struct Args {
    /// Planner TOML file with stage parameters
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a network from a scenario file and save it as a snapshot
    Generate {
        #[arg(short, long)]
        scenario: PathBuf,
        #[arg(short, long)]
        out: PathBuf,
    },
    /// Compute distance, pathloss, weight, max SNR and eligibility
    Derive { snapshot: PathBuf },
    /// Interference approximation error sweep
    Sweep {
        snapshot: PathBuf,
        #[arg(short, long, default_value = "sweep.json")]
        output: PathBuf,
    },
    /// Build and solve the allocation model, then write results back
    Allocate {
        snapshot: PathBuf,
        /// Also write the model in LP format
        #[arg(long)]
        lp: Option<PathBuf>,
        #[arg(short, long, default_value = "allocation.json")]
        output: PathBuf,
    },
    /// Print the breakpoints of a conversion linearization
    Linearize {
        #[arg(value_enum)]
        conversion: Conversion,
        #[arg(long)]
        lower: f64,
        #[arg(long)]
        upper: f64,
        #[arg(long, default_value_t = 0.5)]
        tolerance: f64,
        /// Write the report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = match &args.config {
        Some(path) => PlannerConfig::from_path(path).with_context(|| format!("loading planner config {path:?}"))?,
        None => PlannerConfig::default(),
    };

    match args.command {
        Command::Generate { scenario, out } => {
            run::generate(&scenario, &out).with_context(|| format!("generating from {scenario:?}"))?;
        }
        Command::Derive { snapshot } => {
            let net = run::derive(&snapshot, &config).with_context(|| format!("deriving {snapshot:?}"))?;
            info!("Derived {} connections", net.connections().len());
        }
        Command::Sweep { snapshot, output } => {
            let outcome = run::sweep(&snapshot, &config).with_context(|| format!("sweeping {snapshot:?}"))?;
            Report::new("sweep", outcome).write_json(&output)?;
        }
        Command::Allocate { snapshot, lp, output } => {
            let summary = run::allocate(&snapshot, &config, lp.as_deref())
                .with_context(|| format!("allocating {snapshot:?}"))?;
            info!(
                "Objective {:.4}: {} links active, bandwidth {:.3}, x {:.3}, y {:.3}",
                summary.objective,
                summary.active_links,
                summary.total_bandwidth,
                summary.total_x_traffic,
                summary.total_y_traffic
            );
            Report::new("allocate", summary).write_json(&output)?;
        }
        Command::Linearize {
            conversion,
            lower,
            upper,
            tolerance,
            output,
        } => {
            let report = Report::new("linearize", run::linearize(conversion, lower, upper, tolerance)?);
            match output {
                Some(path) => report.write_json(&path)?,
                None => println!("{}", serde_json::to_string_pretty(&report)?),
            }
        }
    }

    Ok(())
}
