//! `plgrade grade` - grade an instance question
//!
//! Rubric items and `--adjust-points` grade through the question's rubric;
//! the point and percentage flags set scores directly. With `--modified-at`
//! the grade is only stored if nobody changed the question since then.

use plgrade_core::error::{GradeError, Result};
use plgrade_core::format::format_points;
use plgrade_core::grading::{InstanceQuestionScoreInput, ManualRubricData, ScoreUpdateOutcome};
use serde_json::json;

use super::dispatch::{trace_command, CommandContext};
use super::format::print_json;
use crate::cli::GradeArgs;
use crate::output_by_format_result;

fn score_input(args: &GradeArgs, rubric_id: Option<i64>) -> Result<InstanceQuestionScoreInput> {
    let manual_rubric_data = if args.items.is_empty() && args.adjust_points.is_none() {
        None
    } else {
        let rubric_id = rubric_id.ok_or_else(|| {
            GradeError::invalid_input(
                "rubric grading",
                format!("instance question {} has no rubric", args.instance_question_id),
            )
        })?;
        Some(ManualRubricData {
            rubric_id,
            applied_rubric_items: args.items.clone(),
            adjust_points: args.adjust_points,
        })
    };

    let partial_scores =
        (!args.partials.is_empty()).then(|| args.partials.iter().cloned().collect());

    Ok(InstanceQuestionScoreInput {
        manual_points: args.manual_points,
        manual_score_perc: args.manual_score_perc,
        auto_points: args.auto_points,
        auto_score_perc: args.auto_score_perc,
        points: args.points,
        score_perc: args.score_perc,
        partial_scores,
        feedback: args.feedback.as_ref().map(|text| json!({ "manual": text })),
        manual_rubric_data,
        ai_graded: args.ai,
    })
}

pub fn execute(ctx: &CommandContext, args: &GradeArgs) -> Result<()> {
    let db = ctx.open_database()?;
    let current = db.instance_question(args.instance_question_id)?;
    trace_command!(ctx.cli, ctx.start, "load_instance_question");

    let input = score_input(args, current.manual_rubric_id)?;
    let outcome = db.update_instance_question_score(
        args.instance_question_id,
        args.submission,
        args.modified_at.as_ref(),
        &input,
        args.authn_user,
    )?;
    trace_command!(ctx.cli, ctx.start, "update_instance_question_score");

    output_by_format_result!(ctx.cli.format,
        json => print_json(&outcome),
        human => {
            print_outcome(&outcome);
        }
    )?;

    match outcome {
        ScoreUpdateOutcome::Conflict { modified_at, .. } => Err(GradeError::FailedOperation {
            operation: format!("grade instance question {}", args.instance_question_id),
            reason: format!(
                "it was modified at {} by another grader; reload and grade again",
                modified_at.to_rfc3339()
            ),
        }),
        ScoreUpdateOutcome::Applied { .. } => Ok(()),
    }
}

fn print_outcome(outcome: &ScoreUpdateOutcome) {
    match outcome {
        ScoreUpdateOutcome::Applied {
            instance_question_id,
            rubric_grading_id,
            grading_state,
            score,
            assessment,
            ..
        } => {
            match score {
                Some(score) => println!(
                    "Instance question {}: {} points, {}% ({})",
                    instance_question_id,
                    format_points(score.points),
                    format_points(score.score_perc),
                    grading_state
                ),
                None => println!(
                    "Instance question {}: stored without a score change ({})",
                    instance_question_id, grading_state
                ),
            }
            if let Some(grading_id) = rubric_grading_id {
                println!("  rubric grading {}", grading_id);
            }
            if let Some(update) = assessment {
                println!(
                    "  assessment: {} points, {}%",
                    format_points(update.points),
                    format_points(update.score_perc)
                );
            }
        }
        ScoreUpdateOutcome::Conflict {
            instance_question_id,
            ..
        } => {
            println!(
                "Instance question {} changed since it was loaded; nothing was graded",
                instance_question_id
            );
        }
    }
}
