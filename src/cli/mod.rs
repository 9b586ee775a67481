//! CLI argument parsing for plgrade
//!
//! Global flags: --root, --db, --config, --format, --quiet, --verbose,
//! --log-level, --log-json

pub mod args;
pub mod format;
pub mod parse;
pub mod paths;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use args::{
    FinalizeArgs, GradeArgs, InitArgs, JobsCommands, JobsSubcommand, LoadArgs, RubricCommands,
    RubricStatusArgs, RubricSubcommand, ScoreArgs, SetScoreArgs, ShowArgs, SubmitArgs,
};
pub use plgrade_core::format::OutputFormat;

/// plgrade - assessment scoring and rubric grading engine
#[derive(Parser, Debug)]
#[command(name = "plgrade")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Directory holding the gradebook database and plgrade.toml
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Explicit database path
    #[arg(long, global = true, env = "PLGRADE_DB")]
    pub db: Option<PathBuf>,

    /// Explicit configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format (human or json)
    #[arg(long, global = true, default_value = "human")]
    pub format: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    pub quiet: bool,

    /// Debug logging and phase timings
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Log filter, e.g. `debug` or `plgrade_core=trace`
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Write logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the gradebook database and a default plgrade.toml
    Init(InitArgs),

    /// Load a JSON gradebook fixture
    Load(LoadArgs),

    /// Recompute an assessment instance score from its questions
    Score(ScoreArgs),

    /// Override an assessment instance score
    SetScore(SetScoreArgs),

    /// Grade an instance question
    Grade(GradeArgs),

    /// Record a new submission for an instance question
    Submit(SubmitArgs),

    /// Close grading of an instance question's current submission
    Finalize(FinalizeArgs),

    /// Report whether a question's rubric grading is out of date
    RubricStatus(RubricStatusArgs),

    /// Create, show and attach rubrics
    Rubric(RubricSubcommand),

    /// Show an assessment instance, its questions and its score log
    Show(ShowArgs),

    /// Inspect batch grading job progress
    Jobs(JobsSubcommand),
}
