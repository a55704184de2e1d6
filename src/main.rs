mod cli;
mod tui;
mod watch;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use ratemeter::reporter::render_line;
use ratemeter::sim::{simulate, Scenario};
use ratemeter::{ConfigError, MeterConfig, MeterError};

use crate::cli::{Cli, Commands, OutputFormat, Simulate};
use crate::watch::run_watch;

fn run_simulate(sim: Simulate) -> Result<()> {
    let config = MeterConfig::from(&sim.meter);
    let scenario = Scenario {
        interval_ms: sim.interval_ms,
        samples: sim.samples,
        step_interval_ms: sim.step_interval_ms,
        step_after: sim.step_after.unwrap_or(sim.samples / 2),
    };
    let reports = simulate("sim", &scenario, config).context("Running simulation")?;
    match sim.format {
        OutputFormat::Text => {
            for r in &reports {
                println!("{:>9.0} ms  {}", r.at_ms, render_line(&r.snapshot, &sim.meter.unit));
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .try_init()
        .ok();

    let cli = Cli::parse();
    let result: Result<()> = match cli.command {
        Some(Commands::Simulate(sim)) => run_simulate(sim),
        Some(Commands::Watch(watch)) => run_watch(watch),
        None => {
            Cli::command().print_help().ok();
            println!();
            Ok(())
        }
    };

    if let Err(err) = result {
        // Map to stable exit codes
        let code = exit_code_for_error(&err);
        eprintln!("error: {err:?}");
        std::process::exit(code);
    }
}

pub(crate) fn exit_code_for_error(err: &anyhow::Error) -> i32 {
    // 2: configuration, 3: terminal or thread I/O, 1: other
    for cause in err.chain() {
        if cause.is::<ConfigError>() {
            return 2;
        }
        if let Some(me) = cause.downcast_ref::<MeterError>() {
            return match me {
                MeterError::Config(_) | MeterError::Scenario(_) => 2,
                MeterError::Spawn(_) => 3,
            };
        }
        if cause.is::<std::io::Error>() {
            return 3;
        }
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_config_error() {
        let err = anyhow::Error::from(MeterError::from(ConfigError::Backoff(0.5)));
        assert_eq!(exit_code_for_error(&err), 2);
        let err = anyhow::Error::from(ConfigError::Backoff(0.5)).context("building meter");
        assert_eq!(exit_code_for_error(&err), 2);
    }

    #[test]
    fn exit_code_io_error() {
        let err = anyhow::Error::from(std::io::Error::from(std::io::ErrorKind::BrokenPipe));
        assert_eq!(exit_code_for_error(&err), 3);
        let err = anyhow::Error::from(MeterError::Spawn(std::io::Error::from(std::io::ErrorKind::OutOfMemory)));
        assert_eq!(exit_code_for_error(&err), 3);
    }

    #[test]
    fn exit_code_other() {
        let err = anyhow::anyhow!("other");
        assert_eq!(exit_code_for_error(&err), 1);
    }

    #[test]
    fn simulate_rejects_bad_config() {
        let cli = Cli::try_parse_from(["ratemeter", "simulate", "--target-window-ms", "0", "--samples", "10"]).unwrap();
        let Some(Commands::Simulate(sim)) = cli.command else { panic!("expected simulate") };
        let err = run_simulate(sim).unwrap_err();
        assert_eq!(exit_code_for_error(&err), 2);
    }

    #[test]
    fn simulate_rejects_infinite_interval() {
        let cli = Cli::try_parse_from(["ratemeter", "simulate", "--interval-ms", "inf", "--samples", "1"]).unwrap();
        let Some(Commands::Simulate(sim)) = cli.command else { panic!("expected simulate") };
        let err = run_simulate(sim).unwrap_err();
        assert_eq!(exit_code_for_error(&err), 2);
        assert!(format!("{err:#}").contains("interval_ms"));
    }
}
