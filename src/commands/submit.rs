//! `plgrade submit` - record a new submission

use plgrade_core::db::NewSubmission;
use plgrade_core::error::Result;
use plgrade_core::format::format_points;

use super::dispatch::{trace_command, CommandContext};
use super::format::{print_json, score_line};
use crate::cli::SubmitArgs;
use crate::output_by_format_result;

pub fn execute(ctx: &CommandContext, args: &SubmitArgs) -> Result<()> {
    let db = ctx.open_database()?;

    let submission = NewSubmission {
        instance_question_id: args.instance_question_id,
        credit: args.credit,
        partial_scores: (!args.partials.is_empty())
            .then(|| args.partials.iter().cloned().collect()),
        auto_points: args.auto_points,
    };
    let outcome = db.record_submission(&submission, args.authn_user)?;
    trace_command!(ctx.cli, ctx.start, "record_submission");

    output_by_format_result!(ctx.cli.format,
        json => print_json(&outcome),
        human => {
            println!(
                "Submission {} for instance question {} ({})",
                outcome.submission_id, outcome.instance_question_id, outcome.grading_state
            );
            if let Some(score) = &outcome.score {
                println!(
                    "  auto graded: {} points, {}%",
                    format_points(score.points),
                    format_points(score.score_perc)
                );
            }
            if let (Some(update), Ok(question)) = (
                &outcome.assessment,
                db.instance_question(outcome.instance_question_id),
            ) {
                println!("  {}", score_line(question.assessment_instance_id, update));
            }
        }
    )
}
