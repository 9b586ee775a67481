//! `plgrade show` - an assessment instance with its questions

use plgrade_core::error::Result;
use plgrade_core::format::format_points;
use serde_json::json;

use super::dispatch::{trace_command, CommandContext};
use super::format::print_json;
use crate::cli::ShowArgs;
use crate::output_by_format_result;

fn opt_points(points: Option<f64>) -> String {
    points.map_or_else(|| "-".to_string(), format_points)
}

pub fn execute(ctx: &CommandContext, args: &ShowArgs) -> Result<()> {
    let db = ctx.open_database()?;
    let id = args.assessment_instance_id;

    let instance = db.assessment_instance(id)?;
    let questions = db.instance_questions(id)?;
    let log = if args.log {
        Some(db.select_score_log(id)?)
    } else {
        None
    };
    trace_command!(ctx.cli, ctx.start, "load_assessment_instance");

    output_by_format_result!(ctx.cli.format,
        json => print_json(&json!({
            "assessment_instance": instance,
            "instance_questions": questions,
            "score_log": log,
        })),
        human => {
            println!(
                "Assessment instance {}: {} / {} points (+{} bonus), {}%",
                instance.id,
                format_points(instance.points),
                opt_points(instance.max_points),
                opt_points(instance.max_bonus_points),
                format_points(instance.score_perc)
            );
            for q in &questions {
                println!(
                    "  question {:<4} zone {:<4} {:>6} / {:<6} auto {:<6} manual {:<6} {}{}",
                    q.id,
                    q.zone_id.map_or_else(|| "-".to_string(), |z| z.to_string()),
                    format_points(q.points),
                    opt_points(q.max_points),
                    opt_points(q.auto_points),
                    opt_points(q.manual_points),
                    q.grading_state,
                    q.manual_rubric_id
                        .map(|r| format!(" rubric {r}"))
                        .unwrap_or_default()
                );
                if ctx.cli.verbose {
                    println!("    modified {}", q.modified_at.to_rfc3339());
                }
            }
            if let Some(entries) = &log {
                println!("Score log:");
                for entry in entries {
                    println!(
                        "  {}  {} -> {} points, {}% -> {}%{}{}",
                        entry.created_at.format("%Y-%m-%d %H:%M:%S"),
                        format_points(entry.old_state.points),
                        format_points(entry.new_state.points),
                        format_points(entry.old_state.score_perc),
                        format_points(entry.new_state.score_perc),
                        entry.credit.map(|c| format!(" credit {c}")).unwrap_or_default(),
                        entry
                            .authn_user_id
                            .map(|u| format!(" by user {u}"))
                            .unwrap_or_default()
                    );
                }
            }
        }
    )
}
