//! Argument structures for plgrade commands

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{ArgGroup, Args, Subcommand};

use plgrade_core::grading::PartialScore;
use plgrade_core::rubric::AppliedRubricItem;
use plgrade_core::scoring::FULL_CREDIT;

use super::parse::{parse_applied_item, parse_partial_score, parse_timestamp};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing plgrade.toml with defaults
    #[arg(long)]
    pub force_config: bool,
}

#[derive(Args, Debug)]
pub struct LoadArgs {
    /// JSON gradebook fixture
    pub file: PathBuf,
}

#[derive(Args, Debug)]
pub struct ScoreArgs {
    pub assessment_instance_id: i64,

    /// Credit percentage; taken from the latest submission when omitted
    #[arg(long, allow_negative_numbers = true)]
    pub credit: Option<i64>,

    /// Let the score go down
    #[arg(long)]
    pub allow_decrease: bool,

    /// Skip the audit entry when nothing changed
    #[arg(long)]
    pub only_log_if_updated: bool,

    /// Acting user recorded in the audit log
    #[arg(long)]
    pub authn_user: Option<i64>,
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("value").required(true).args(["score_perc", "points"])))]
pub struct SetScoreArgs {
    pub assessment_instance_id: i64,

    /// New score percentage
    #[arg(long, allow_negative_numbers = true)]
    pub score_perc: Option<f64>,

    /// New point total
    #[arg(long, allow_negative_numbers = true)]
    pub points: Option<f64>,

    #[arg(long)]
    pub authn_user: Option<i64>,
}

#[derive(Args, Debug)]
pub struct GradeArgs {
    pub instance_question_id: i64,

    /// Apply a rubric item: ID, or ID=FRACTION for partial credit
    #[arg(long = "item", value_parser = parse_applied_item)]
    pub items: Vec<AppliedRubricItem>,

    /// Manual adjustment added after the rubric total is clamped
    #[arg(long, allow_negative_numbers = true)]
    pub adjust_points: Option<f64>,

    #[arg(long, allow_negative_numbers = true)]
    pub manual_points: Option<f64>,

    #[arg(long, allow_negative_numbers = true)]
    pub manual_score_perc: Option<f64>,

    #[arg(long, allow_negative_numbers = true)]
    pub auto_points: Option<f64>,

    #[arg(long, allow_negative_numbers = true)]
    pub auto_score_perc: Option<f64>,

    /// Total points; manual points become this minus the auto points
    #[arg(long, allow_negative_numbers = true)]
    pub points: Option<f64>,

    /// Total score percentage
    #[arg(long, allow_negative_numbers = true)]
    pub score_perc: Option<f64>,

    /// Partial score: NAME=SCORE or NAME=SCORE:WEIGHT
    #[arg(long = "partial", value_parser = parse_partial_score)]
    pub partials: Vec<(String, PartialScore)>,

    /// Submission to grade; the latest one by default
    #[arg(long)]
    pub submission: Option<i64>,

    /// `modified_at` of the question when it was loaded (RFC 3339)
    #[arg(long, value_parser = parse_timestamp)]
    pub modified_at: Option<DateTime<Utc>>,

    /// Feedback shown to the student
    #[arg(long)]
    pub feedback: Option<String>,

    /// The grade comes from an AI grader
    #[arg(long)]
    pub ai: bool,

    #[arg(long)]
    pub authn_user: Option<i64>,
}

#[derive(Args, Debug)]
pub struct SubmitArgs {
    pub instance_question_id: i64,

    /// Credit percentage of this submission
    #[arg(long, default_value_t = FULL_CREDIT, allow_negative_numbers = true)]
    pub credit: i64,

    /// Auto points awarded by the external grader
    #[arg(long, conflicts_with = "partials")]
    pub auto_points: Option<f64>,

    /// Partial score from the external grader: NAME=SCORE[:WEIGHT]
    #[arg(long = "partial", value_parser = parse_partial_score)]
    pub partials: Vec<(String, PartialScore)>,

    #[arg(long)]
    pub authn_user: Option<i64>,
}

#[derive(Args, Debug)]
pub struct FinalizeArgs {
    pub instance_question_id: i64,
}

#[derive(Args, Debug)]
pub struct RubricStatusArgs {
    pub instance_question_id: i64,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    pub assessment_instance_id: i64,

    /// Include the score audit log
    #[arg(long)]
    pub log: bool,
}

#[derive(Args, Debug)]
pub struct RubricSubcommand {
    #[command(subcommand)]
    pub command: RubricCommands,
}

#[derive(Subcommand, Debug)]
pub enum RubricCommands {
    /// Create or replace a rubric from a JSON definition
    Save {
        /// JSON rubric definition
        file: PathBuf,

        /// Rubric to replace; a new rubric is created when omitted
        #[arg(long)]
        id: Option<i64>,

        /// Send graded questions back to the manual grading queue
        #[arg(long)]
        tag_for_grading: bool,

        #[arg(long)]
        authn_user: Option<i64>,
    },

    /// Show a rubric and its items
    Show { rubric_id: i64 },

    /// Grade an instance question with a rubric from now on
    Attach {
        instance_question_id: i64,

        /// Rubric to attach; detaches when omitted
        #[arg(long)]
        rubric: Option<i64>,
    },
}

#[derive(Args, Debug)]
pub struct JobsSubcommand {
    #[command(subcommand)]
    pub command: JobsCommands,
}

#[derive(Subcommand, Debug)]
pub enum JobsCommands {
    /// Merge job sequence snapshots into one status per item
    Merge {
        /// JSON array of job sequence snapshots
        file: PathBuf,
    },

    /// Replay recorded progress updates through the relay
    Replay {
        /// JSON job sequence with its recorded updates
        file: PathBuf,
    },
}
