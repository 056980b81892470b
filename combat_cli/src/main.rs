//! combat-sim - Run an encounter many times and print aggregated metrics

mod cli;
mod roster;

use std::error::Error;

use combat_core::config::load_encounter;
use combat_core::{run_iterations, RunOptions};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn Error>> {
    let args = cli::parse_args();

    // Logs go to stderr so stdout stays valid JSON
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut encounter = load_encounter(&args.config)?;
    if let Some(iterations) = args.iterations {
        encounter.iterations = iterations;
    }
    if let Some(seed) = args.seed {
        encounter.seed = seed;
    }
    if args.threads.is_some() {
        encounter.threads = args.threads;
    }
    encounter.validate()?;

    info!(
        config = %args.config.display(),
        iterations = encounter.iterations,
        seed = encounter.seed,
        duration_secs = encounter.duration_secs,
        "running encounter"
    );

    let options = RunOptions {
        iterations: encounter.iterations,
        base_seed: encounter.seed,
        threads: encounter.threads,
    };
    let result = run_iterations(|| roster::build(&encounter), &options)?;

    for unit in &result.units {
        info!(
            unit = %unit.label,
            dps = unit.dps.mean,
            stdev = unit.dps.stdev(),
            "summary"
        );
    }

    let json = if args.pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string(&result)?
    };
    println!("{json}");
    Ok(())
}
