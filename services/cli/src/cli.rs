use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use mentor_match::allocation::{
    parse_policy_str, AllocationEngine, BatchError, BatchHooks, BatchReport, HistorySnapshot,
};
use mentor_match::error::AppError;
use tracing::info;

use crate::config::{AppConfig, ConfigError};
use crate::infra::{self, InputError, OutputError};
use crate::telemetry::{self, TelemetryError};

#[derive(Parser, Debug)]
#[command(
    name = "mentor-match",
    about = "Deterministic, policy-driven allocation of students to mentors",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Allocate a batch of students against a mentor pool
    Allocate(AllocateArgs),
}

#[derive(Args, Debug)]
pub(crate) struct AllocateArgs {
    /// Students table (CSV)
    #[arg(long)]
    students: PathBuf,
    /// Mentor pool table (CSV)
    #[arg(long)]
    pool: PathBuf,
    /// Prior-allocation history snapshot (CSV, optional)
    #[arg(long)]
    history: Option<PathBuf>,
    /// Declarative policy file (JSON)
    #[arg(long)]
    policy: PathBuf,
    /// Directory the output tables are written to
    #[arg(long)]
    output: PathBuf,
    /// Map a center manager name to a center id (repeatable, NAME=ID)
    #[arg(long = "center-manager", value_parser = infra::parse_center_override)]
    center_manager: Vec<(String, i64)>,
}

/// Process-level error with the documented exit codes:
/// 2 policy-invalid, 3 input-invalid, 4 cancelled, 5 internal-error,
/// 1 for everything environmental.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error(transparent)]
    App(#[from] AppError),
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Output(#[from] OutputError),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::App(AppError::Policy(_)) => 2,
            CliError::Input(_) => 3,
            CliError::App(AppError::Batch(BatchError::Cancelled { .. })) => 4,
            CliError::App(AppError::Batch(_)) => 5,
            CliError::Config(_) | CliError::Telemetry(_) | CliError::Output(_) => 1,
        }
    }
}

pub fn run() -> Result<(), CliError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let cli = Cli::parse();
    match cli.command {
        Command::Allocate(args) => allocate(args),
    }
}

fn allocate(args: AllocateArgs) -> Result<(), CliError> {
    let raw_policy = fs::read_to_string(&args.policy).map_err(|source| InputError::Io {
        path: args.policy.clone(),
        source,
    })?;
    let policy = parse_policy_str(&raw_policy).map_err(AppError::from)?;
    info!(version = %policy.version, "policy loaded");

    let overrides: BTreeMap<String, i64> = args.center_manager.into_iter().collect();
    let students = infra::load_students(&args.students, &policy, &overrides)?;
    let mentors = infra::load_mentors(&args.pool, &policy)?;
    let history = match &args.history {
        Some(path) => infra::load_history(path)?,
        None => HistorySnapshot::empty(),
    };
    info!(
        students = students.len(),
        mentors = mentors.len(),
        history = history.len(),
        "inputs loaded"
    );

    let progress = |percent: u8, message: &str| {
        info!(percent, "{message}");
    };
    let hooks = BatchHooks {
        progress: Some(&progress),
        cancel: None,
    };

    let engine = AllocationEngine::new(policy);
    match engine.run(&students, mentors, &history, hooks) {
        Ok(report) => {
            infra::write_outputs(&report, &args.output)?;
            log_summary(&report);
            Ok(())
        }
        Err(BatchError::Cancelled { processed, report }) => {
            // Keep the partial tables inspectable before surfacing the abort.
            infra::write_outputs(&report, &args.output)?;
            Err(AppError::from(BatchError::Cancelled { processed, report }).into())
        }
        Err(err) => Err(AppError::from(err).into()),
    }
}

fn log_summary(report: &BatchReport) {
    let summary = &report.summary;
    info!(
        students = summary.students_total,
        successes = summary.successes,
        failures = summary.failures,
        skipped_history = summary.skipped_history,
        "allocation batch finished"
    );
    for count in &summary.channel_counts {
        info!(channel = count.channel.label(), count = count.count, "channel volume");
    }
}
