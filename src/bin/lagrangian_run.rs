//! Command-line driver: run or validate a TOML case file.

use clap::{ArgAction, Parser, Subcommand};
use tracing::{info, Level};

use geo_lagrangian::{build_simulation, SimResult, SimulationConfig};

#[derive(Parser)]
#[command(name = "lagrangian_run")]
#[command(version, about = "Explicit Lagrangian elasto-viscoplastic solver")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulation from a config file.
    Simulate {
        /// Path to simulation config (TOML).
        #[arg(short, long, default_value = "inputs/extension_2d.toml")]
        config: String,
    },

    /// Check a config file and the mesh/materials it produces, without stepping.
    Validate {
        /// Path to simulation config (TOML).
        path: String,
    },
}

fn simulate(path: &str) -> SimResult<()> {
    let config = SimulationConfig::from_file(path)?;
    config.print_summary();
    let mut driver = build_simulation(&config)?;
    let summary = driver.run()?;

    let drift = summary.total_energy() - summary.initial_total_energy();
    info!("Steps: {} accepted, {} rejected, {} remesh(es)", summary.steps, summary.rejected, summary.remeshes);
    info!(
        "Energy: kinetic {:.10e}, internal {:.10e}, change {:.3e}",
        summary.kinetic_energy, summary.internal_energy, drift
    );
    Ok(())
}

fn validate(path: &str) -> SimResult<()> {
    let config = SimulationConfig::from_file(path)?;
    let driver = build_simulation(&config)?;
    info!(
        "{} is valid: first dt = {:.6e}, {} cells",
        path,
        driver.dt(),
        driver.state().layout().num_cells
    );
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).with_target(false).init();

    let result = match cli.command {
        Commands::Simulate { config } => simulate(&config),
        Commands::Validate { path } => validate(&path),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
