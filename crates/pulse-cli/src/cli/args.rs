use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use pulse_core::model::ResolutionStatus;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "pulse",
    version,
    about = "JUnit report ingestion, failure dedup and flakiness analytics"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(clap::Args, Debug, Clone)]
pub struct GlobalArgs {
    /// YAML config file
    #[arg(long, global = true, env = "PULSE_CONFIG")]
    pub config: Option<PathBuf>,

    /// SQLite database (overrides config and PULSE_DB)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Fail on unknown config keys instead of warning
    #[arg(long, global = true)]
    pub strict_config: bool,

    /// tracing filter, e.g. `info` or `pulse_core=debug`
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand)]
pub enum Command {
    Project(ProjectArgs),
    /// Ingest one or more JUnit XML reports into a project
    Ingest(IngestArgs),
    Runs(RunsArgs),
    /// Daily pass-rate series and dashboard summary
    Trends(WindowArgs),
    /// Most frequent failures
    Failures(FailuresArgs),
    /// Failure counts bucketed by keyword heuristics
    Patterns(WindowArgs),
    Flaky(FlakyArgs),
    /// AI summary of a run (cached on the run)
    Analyze(AnalyzeArgs),
    /// Row counts of the database
    Stats,
    Version,
}

#[derive(Parser, Clone)]
pub struct ProjectArgs {
    #[command(subcommand)]
    pub cmd: ProjectSub,
}

#[derive(Subcommand, Clone)]
pub enum ProjectSub {
    Add {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    List,
}

#[derive(Parser, Clone)]
pub struct IngestArgs {
    #[arg(long)]
    pub project: i64,

    /// Report files
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

#[derive(Parser, Clone)]
pub struct RunsArgs {
    #[command(subcommand)]
    pub cmd: RunsSub,
}

#[derive(Subcommand, Clone)]
pub enum RunsSub {
    /// Most recent runs first
    List {
        #[arg(long)]
        project: i64,
        #[arg(long)]
        limit: Option<u32>,
        /// Only runs from the last N days
        #[arg(long)]
        days: Option<u32>,
    },
    /// A run with all of its cases
    Show { run_id: i64 },
    Delete { run_id: i64 },
    /// Delete every run of a project on a calendar day (UTC)
    DeleteDay {
        #[arg(long)]
        project: i64,
        #[arg(long)]
        date: NaiveDate,
    },
}

#[derive(Parser, Clone)]
pub struct WindowArgs {
    #[arg(long)]
    pub project: i64,

    #[arg(long, default_value_t = 30)]
    pub days: u32,
}

#[derive(Parser, Clone)]
pub struct FailuresArgs {
    #[command(flatten)]
    pub window: WindowArgs,

    #[arg(long, default_value_t = 10)]
    pub limit: u32,
}

#[derive(Parser, Clone)]
pub struct FlakyArgs {
    #[command(subcommand)]
    pub cmd: FlakySub,
}

#[derive(Subcommand, Clone)]
pub enum FlakySub {
    List {
        #[command(flatten)]
        window: WindowArgs,
        /// Minimum flakiness score in percent
        #[arg(long, default_value_t = 0.0)]
        threshold: f64,
    },
    /// Record triage state for a (class, test) pair
    Update {
        #[arg(long)]
        class_name: String,
        #[arg(long)]
        test_name: String,
        #[arg(long)]
        acknowledged: bool,
        /// unresolved | investigating | in-progress | resolved
        #[arg(long)]
        status: Option<ResolutionStatus>,
        #[arg(long)]
        assignee: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
}

#[derive(Parser, Clone)]
pub struct AnalyzeArgs {
    pub run_id: i64,

    /// Overrides analysis.timeout_secs
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}
