//! `plgrade score` and `plgrade set-score`

use plgrade_core::error::Result;
use plgrade_core::scoring::ScoreRequest;
use serde_json::json;

use super::dispatch::{trace_command, CommandContext};
use super::format::{print_json, score_line};
use crate::cli::{ScoreArgs, SetScoreArgs};
use crate::output_by_format_result;

/// Recompute an assessment instance score from its zones
pub fn execute(ctx: &CommandContext, args: &ScoreArgs) -> Result<()> {
    let db = ctx.open_database()?;
    trace_command!(ctx.cli, ctx.start, "open_database");

    let request = ScoreRequest::new(args.assessment_instance_id)
        .with_credit(args.credit)
        .with_authn_user(args.authn_user)
        .allow_decrease(args.allow_decrease)
        .only_log_if_score_updated(args.only_log_if_updated);
    let update = db.grade_assessment_instance(&request)?;
    trace_command!(ctx.cli, ctx.start, "grade_assessment_instance");

    output_by_format_result!(ctx.cli.format,
        json => print_json(&json!({
            "assessment_instance_id": args.assessment_instance_id,
            "updated": update.updated,
            "points": update.points,
            "score_perc": update.score_perc,
        })),
        human => {
            println!("{}", score_line(args.assessment_instance_id, &update));
        }
    )
}

/// Override an assessment instance score
pub fn execute_set(ctx: &CommandContext, args: &SetScoreArgs) -> Result<()> {
    let db = ctx.open_database()?;

    let id = args.assessment_instance_id;
    let update = match (args.score_perc, args.points) {
        (Some(score_perc), _) => db.set_score_perc(id, score_perc, args.authn_user)?,
        (None, Some(points)) => db.set_points(id, points, args.authn_user)?,
        (None, None) => {
            return Err(plgrade_core::error::GradeError::UsageError(
                "set-score needs --score-perc or --points".to_string(),
            ))
        }
    };

    output_by_format_result!(ctx.cli.format,
        json => print_json(&json!({
            "assessment_instance_id": id,
            "updated": update.updated,
            "points": update.points,
            "score_perc": update.score_perc,
        })),
        human => {
            println!("{}", score_line(id, &update));
        }
    )
}
