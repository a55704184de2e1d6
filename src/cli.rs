use clap::{Args, Parser, Subcommand, ValueEnum};

use ratemeter::MeterConfig;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a deterministic event stream through a meter on a simulated clock
    Simulate(Simulate),
    /// Measure a live ticking loop and display its rate
    Watch(Watch),
}

/// Meter tunables shared by every command.
#[derive(Args, Clone, Debug)]
pub struct MeterArgs {
    /// Wall-clock span of the smoothing window
    #[arg(long, default_value_t = 3000.0)]
    pub target_window_ms: f64,

    /// Seeding ends once this much time has elapsed
    #[arg(long = "seed-ms", default_value_t = 400.0)]
    pub seed_duration_ms: f64,

    /// How often the estimate is read and rendered
    #[arg(long = "report-ms", default_value_t = 1000.0)]
    pub report_interval_ms: f64,

    /// Delay before the first recalibration
    #[arg(long = "calibrate-ms", default_value_t = 1000.0)]
    pub calibration_initial_delay_ms: f64,

    /// Multiplier applied to each successive recalibration delay
    #[arg(long = "calibrate-backoff", default_value_t = 1.2)]
    pub calibration_backoff_factor: f64,

    /// Upper bound on the recalibration delay
    #[arg(long = "calibrate-max-ms", default_value_t = 30_000.0)]
    pub calibration_max_delay_ms: f64,

    /// Unit label used when rendering the rate
    #[arg(long, default_value = "fps")]
    pub unit: String,
}

impl From<&MeterArgs> for MeterConfig {
    fn from(a: &MeterArgs) -> Self {
        MeterConfig {
            target_window_ms: a.target_window_ms,
            seed_duration_ms: a.seed_duration_ms,
            report_interval_ms: a.report_interval_ms,
            calibration_initial_delay_ms: a.calibration_initial_delay_ms,
            calibration_backoff_factor: a.calibration_backoff_factor,
            calibration_max_delay_ms: a.calibration_max_delay_ms,
        }
    }
}

#[derive(Parser, Clone, Debug)]
pub struct Simulate {
    /// Interval between simulated events
    #[arg(long, default_value_t = 1000.0 / 60.0)]
    pub interval_ms: f64,

    /// Number of events after the first
    #[arg(long, default_value_t = 1200)]
    pub samples: usize,

    /// Switch to this interval part-way through
    #[arg(long)]
    pub step_interval_ms: Option<f64>,

    /// Event index at which the step applies (defaults to half way)
    #[arg(long)]
    pub step_after: Option<usize>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    #[command(flatten)]
    pub meter: MeterArgs,
}

#[derive(Parser, Clone, Debug)]
pub struct Watch {
    /// Rate of the built-in sample driver
    #[arg(long, default_value_t = 60.0)]
    pub hz: f64,

    /// Change the driver to this rate after --step-after-secs
    #[arg(long)]
    pub step_hz: Option<f64>,

    /// Seconds before the driver switches to --step-hz
    #[arg(long, default_value_t = 10.0)]
    pub step_after_secs: f64,

    /// Meter name shown in reports
    #[arg(long, default_value = "loop")]
    pub name: String,

    /// Log reports instead of drawing the terminal overlay
    #[arg(long)]
    pub plain: bool,

    /// Output format for --plain
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    #[command(flatten)]
    pub meter: MeterArgs,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}
