//! eyecal CLI - Command-line interface for eyecal
//!
//! Commands:
//! - align: Align calibration trials of the latest experiment into a table
//! - summary: Group aligned trials by calibration target
//! - messages: Dump the raw messages of one window (diagnostics)
//! - doctor: Check the rig database and configuration

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use eyecal::source::{tables, RecordStream, SqlValue};
use eyecal::summary::calibration_summary;
use eyecal::{
    Boundary, CalibrationPipeline, Config, DuplicatePolicy, PipelineError, RecordSource,
    SourceError, TimeWindow, EYECAL_VERSION,
};

/// eyecal - Align eye-tracker calibration data from rig event logs
#[derive(Parser)]
#[command(name = "eyecal")]
#[command(version = EYECAL_VERSION)]
#[command(about = "Align eye-tracker calibration trials from a rig database", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Align calibration trials of the latest experiment
    Align {
        #[command(flatten)]
        source: SourceArgs,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Output format (defaults to json-pretty on a terminal, ndjson otherwise)
        #[arg(long)]
        output_format: Option<OutputFormat>,
    },

    /// Group aligned trials by calibration target
    Summary {
        #[command(flatten)]
        source: SourceArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Dump the raw messages of one window
    Messages {
        #[command(flatten)]
        source: SourceArgs,

        /// Message stream to read
        #[arg(long, default_value = "behavior")]
        stream: StreamArg,

        /// Window start (rig timestamp, microseconds)
        #[arg(long)]
        start: i64,

        /// Window stop (rig timestamp, microseconds)
        #[arg(long)]
        stop: i64,
    },

    /// Check the rig database and configuration
    Doctor {
        #[command(flatten)]
        source: SourceArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct SourceArgs {
    /// Rig database path (overrides the config file)
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Window boundary policy
    #[arg(long)]
    boundary: Option<BoundaryArg>,

    /// Policy for several calibration setups in one trial
    #[arg(long)]
    duplicates: Option<DuplicateArg>,

    /// Pause before reconnecting after a connection fault (milliseconds)
    #[arg(long)]
    reconnect_delay_ms: Option<u64>,
}

impl SourceArgs {
    fn resolve(&self) -> Result<Config, CliFailure> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        if let Some(database) = &self.database {
            config.source.database = database.clone();
        }
        if let Some(delay) = self.reconnect_delay_ms {
            config.source.reconnect_delay_ms = delay;
        }
        if let Some(boundary) = &self.boundary {
            config.extract.boundary = boundary.into();
        }
        if let Some(duplicates) = &self.duplicates {
            config.extract.duplicates = duplicates.into();
        }
        Ok(config)
    }
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one row per line)
    Ndjson,
    /// JSON array of rows
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

#[derive(Clone, ValueEnum)]
enum BoundaryArg {
    /// start <= t <= stop
    Inclusive,
    /// start <= t < stop
    HalfOpen,
}

impl From<&BoundaryArg> for Boundary {
    fn from(arg: &BoundaryArg) -> Self {
        match arg {
            BoundaryArg::Inclusive => Boundary::Inclusive,
            BoundaryArg::HalfOpen => Boundary::HalfOpen,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum DuplicateArg {
    /// Use the first message and warn
    First,
    /// Fail the run
    Reject,
}

impl From<&DuplicateArg> for DuplicatePolicy {
    fn from(arg: &DuplicateArg) -> Self {
        match arg {
            DuplicateArg::First => DuplicatePolicy::First,
            DuplicateArg::Reject => DuplicatePolicy::Reject,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum StreamArg {
    /// BehMsg
    Behavior,
    /// BehMsgEye
    Eye,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliFailure> {
    match cli.command {
        Commands::Align {
            source,
            output,
            output_format,
        } => cmd_align(&source.resolve()?, &output, output_format),
        Commands::Summary { source, json } => cmd_summary(&source.resolve()?, json),
        Commands::Messages {
            source,
            stream,
            start,
            stop,
        } => cmd_messages(&source.resolve()?, stream, start, stop),
        Commands::Doctor { source, json } => cmd_doctor(&source.resolve()?, json),
    }
}

fn open_pipeline(config: &Config) -> Result<CalibrationPipeline, CliFailure> {
    let source = Arc::new(RecordSource::open(&config.source)?);
    Ok(CalibrationPipeline::new(source, config.extract))
}

fn cmd_align(config: &Config, output: &PathBuf, format: Option<OutputFormat>) -> Result<(), CliFailure> {
    let table = open_pipeline(config)?.run_default()?;
    let records = table.to_records()?;

    let format = format.unwrap_or(if atty::is(atty::Stream::Stdout) {
        OutputFormat::JsonPretty
    } else {
        OutputFormat::Ndjson
    });
    let output_data = format_output(&records, &format)?;

    if output.to_string_lossy() == "-" {
        print!("{}", output_data);
    } else {
        fs::write(output, output_data)?;
    }
    Ok(())
}

fn cmd_summary(config: &Config, json: bool) -> Result<(), CliFailure> {
    let table = open_pipeline(config)?.run_default()?;
    let groups = calibration_summary(&table)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&groups)?);
        return Ok(());
    }

    println!("Calibration Summary");
    println!("===================");
    println!("Trials aligned: {}", table.len());
    for group in &groups {
        println!(
            "\nTarget ({:.2}, {:.2}) - {} trials",
            group.target.x,
            group.target.y,
            group.trials.len()
        );
        println!("  left:  {}", describe_point(group.mean_left));
        println!("  right: {}", describe_point(group.mean_right));
    }
    Ok(())
}

fn cmd_messages(config: &Config, stream: StreamArg, start: i64, stop: i64) -> Result<(), CliFailure> {
    let window = TimeWindow::new(start, stop)?;
    let source = RecordSource::open(&config.source)?;
    let stream = match stream {
        StreamArg::Behavior => RecordStream::Behavior,
        StreamArg::Eye => RecordStream::Eye,
    };

    for record in source.messages(stream, &window, config.extract.boundary)? {
        println!("{}", serde_json::to_string(&record)?);
    }
    Ok(())
}

fn cmd_doctor(config: &Config, json: bool) -> Result<(), CliFailure> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "eyecal_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("eyecal version {}", EYECAL_VERSION),
    });

    match RecordSource::open(&config.source) {
        Ok(source) => {
            checks.push(DoctorCheck {
                name: "connection".to_string(),
                status: CheckStatus::Ok,
                message: format!("Connected to {}", source.describe()),
            });

            for table in [
                tables::BEH_MSG,
                tables::BEH_MSG_EYE,
                tables::STIM_SPEC,
                tables::STIM_OBJ_DATA,
            ] {
                checks.push(table_check(&source, table));
            }

            let experiment = match source.latest_experiment_start() {
                Ok(Some(ts)) => DoctorCheck {
                    name: "experiment_start".to_string(),
                    status: CheckStatus::Ok,
                    message: format!(
                        "Latest ExperimentStart at {}",
                        ts.to_datetime()
                            .map(|dt| dt.to_rfc3339())
                            .unwrap_or_else(|| ts.to_string())
                    ),
                },
                Ok(None) => DoctorCheck {
                    name: "experiment_start".to_string(),
                    status: CheckStatus::Warning,
                    message: "No ExperimentStart message; align will fail".to_string(),
                },
                Err(e) => DoctorCheck {
                    name: "experiment_start".to_string(),
                    status: CheckStatus::Error,
                    message: e.to_string(),
                },
            };
            checks.push(experiment);
        }
        Err(e) => checks.push(DoctorCheck {
            name: "connection".to_string(),
            status: CheckStatus::Error,
            message: e.to_string(),
        }),
    }

    let report = DoctorReport {
        version: EYECAL_VERSION.to_string(),
        database: config.source.database.display().to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("eyecal Doctor Report");
        println!("====================");
        println!("Version:  {}", report.version);
        println!("Database: {}", report.database);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(CliFailure::DoctorFailed)
    } else {
        Ok(())
    }
}

// Helper functions

fn table_check(source: &RecordSource, table: &str) -> DoctorCheck {
    let found = source.read_one(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?",
        &[SqlValue::from(table)],
    );
    match found {
        Ok(Some(_)) => DoctorCheck {
            name: format!("table_{table}"),
            status: CheckStatus::Ok,
            message: format!("{table} present"),
        },
        Ok(None) => DoctorCheck {
            name: format!("table_{table}"),
            status: CheckStatus::Error,
            message: format!("{table} missing"),
        },
        Err(e) => DoctorCheck {
            name: format!("table_{table}"),
            status: CheckStatus::Error,
            message: e.to_string(),
        },
    }
}

fn describe_point(point: Option<eyecal::Point>) -> String {
    match point {
        Some(p) => format!("({:.4}, {:.4}) V", p.x, p.y),
        None => "no samples".to_string(),
    }
}

fn format_output(records: &[serde_json::Value], format: &OutputFormat) -> Result<String, CliFailure> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for record in records {
                lines.push(serde_json::to_string(record)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(records)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(records)?),
    }
}

// Error types

#[derive(Debug)]
enum CliFailure {
    Io(io::Error),
    Pipeline(PipelineError),
    Json(serde_json::Error),
    DoctorFailed,
}

impl From<io::Error> for CliFailure {
    fn from(e: io::Error) -> Self {
        CliFailure::Io(e)
    }
}

impl From<PipelineError> for CliFailure {
    fn from(e: PipelineError) -> Self {
        CliFailure::Pipeline(e)
    }
}

impl From<SourceError> for CliFailure {
    fn from(e: SourceError) -> Self {
        CliFailure::Pipeline(PipelineError::Source(e))
    }
}

impl From<serde_json::Error> for CliFailure {
    fn from(e: serde_json::Error) -> Self {
        CliFailure::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<CliFailure> for CliError {
    fn from(e: CliFailure) -> Self {
        match e {
            CliFailure::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            CliFailure::Pipeline(PipelineError::Source(e)) => CliError {
                code: "SOURCE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'eyecal doctor' to check the database".to_string()),
            },
            CliFailure::Pipeline(PipelineError::NoExperimentStart) => CliError {
                code: "NO_EXPERIMENT".to_string(),
                message: "No ExperimentStart message found".to_string(),
                hint: Some("Check that the database holds a started experiment".to_string()),
            },
            CliFailure::Pipeline(PipelineError::Align(e)) => CliError {
                code: "ALIGN_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Inspect the window with 'eyecal messages'".to_string()),
            },
            CliFailure::Pipeline(e) => CliError {
                code: "PIPELINE_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            CliFailure::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            CliFailure::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct DoctorReport {
    version: String,
    database: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
