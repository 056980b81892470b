//! Command-line interface for combat-sim

use clap::Parser;
use std::path::PathBuf;

/// Run a combat encounter many times and print aggregated metrics as JSON
#[derive(Parser, Debug)]
#[command(name = "combat-sim")]
#[command(about = "Discrete-event combat simulator")]
#[command(version)]
pub struct Args {
    /// Encounter TOML file
    #[arg(value_name = "ENCOUNTER", default_value = "encounters/default.toml")]
    pub config: PathBuf,

    /// Override the number of iterations
    #[arg(short, long)]
    pub iterations: Option<u32>,

    /// Override the base seed
    #[arg(short, long)]
    pub seed: Option<u64>,

    /// Worker threads (rayon default when absent)
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Pretty-print the JSON output
    #[arg(long)]
    pub pretty: bool,
}

pub fn parse_args() -> Args {
    Args::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["combat-sim"]).unwrap();
        assert_eq!(args.config, PathBuf::from("encounters/default.toml"));
        assert!(args.iterations.is_none());
        assert!(!args.pretty);
    }

    #[test]
    fn test_overrides() {
        let args = Args::try_parse_from([
            "combat-sim",
            "raid.toml",
            "-i",
            "50",
            "--seed",
            "9",
            "-t",
            "2",
            "--pretty",
        ])
        .unwrap();
        assert_eq!(args.config, PathBuf::from("raid.toml"));
        assert_eq!(args.iterations, Some(50));
        assert_eq!(args.seed, Some(9));
        assert_eq!(args.threads, Some(2));
        assert!(args.pretty);
    }
}
