//! `plgrade rubric` and `plgrade rubric-status`

use std::fs;

use plgrade_core::error::Result;
use plgrade_core::format::format_points;
use plgrade_core::rubric::{Rubric, RubricItemInput, RubricSettings};
use serde::Deserialize;
use serde_json::json;

use super::dispatch::{trace_command, CommandContext};
use super::format::{print_json, print_json_status};
use crate::cli::paths::resolve_in_root;
use crate::cli::{RubricCommands, RubricStatusArgs};
use crate::output_by_format_result;

/// Rubric definition file: settings at the top level plus the item list
#[derive(Debug, Deserialize)]
struct RubricDefinition {
    #[serde(flatten)]
    settings: RubricSettings,
    items: Vec<RubricItemInput>,
}

pub fn execute(ctx: &CommandContext, command: &RubricCommands) -> Result<()> {
    match command {
        RubricCommands::Save {
            file,
            id,
            tag_for_grading,
            authn_user,
        } => execute_save(ctx, file, *id, *tag_for_grading, *authn_user),
        RubricCommands::Show { rubric_id } => execute_show(ctx, *rubric_id),
        RubricCommands::Attach {
            instance_question_id,
            rubric,
        } => execute_attach(ctx, *instance_question_id, *rubric),
    }
}

fn execute_save(
    ctx: &CommandContext,
    file: &std::path::Path,
    id: Option<i64>,
    tag_for_grading: bool,
    authn_user: Option<i64>,
) -> Result<()> {
    let db = ctx.open_database()?;
    let content = fs::read_to_string(resolve_in_root(file, ctx.root))?;
    let definition: RubricDefinition = serde_json::from_str(&content)?;

    let saved = db.save_rubric(
        id,
        definition.settings,
        definition.items,
        tag_for_grading,
        authn_user,
    )?;
    trace_command!(ctx.cli, ctx.start, "save_rubric");

    output_by_format_result!(ctx.cli.format,
        json => print_json(&saved),
        human => {
            print_rubric(&saved.rubric);
            if !saved.recomputed.is_empty() {
                println!("Regraded {} instance questions", saved.recomputed.len());
            }
            if !saved.tagged_for_grading.is_empty() {
                println!(
                    "Tagged for grading: {}",
                    saved
                        .tagged_for_grading
                        .iter()
                        .map(i64::to_string)
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }
        }
    )
}

fn execute_show(ctx: &CommandContext, rubric_id: i64) -> Result<()> {
    let db = ctx.open_database()?;
    let rubric = db.rubric(rubric_id)?;

    output_by_format_result!(ctx.cli.format,
        json => print_json(&rubric),
        human => {
            print_rubric(&rubric);
        }
    )
}

fn execute_attach(ctx: &CommandContext, instance_question_id: i64, rubric_id: Option<i64>) -> Result<()> {
    let db = ctx.open_database()?;
    db.attach_rubric(instance_question_id, rubric_id)?;

    output_by_format_result!(ctx.cli.format,
        json => print_json_status(
            "ok",
            None,
            &[
                ("instance_question_id", json!(instance_question_id)),
                ("rubric_id", json!(rubric_id)),
            ],
        ),
        human => {
            match rubric_id {
                Some(id) => println!("Instance question {} now uses rubric {}", instance_question_id, id),
                None => println!("Instance question {} no longer uses a rubric", instance_question_id),
            }
        }
    )
}

pub fn execute_status(ctx: &CommandContext, args: &RubricStatusArgs) -> Result<()> {
    let db = ctx.open_database()?;
    let status = db.rubric_status(args.instance_question_id)?;

    output_by_format_result!(ctx.cli.format,
        json => print_json(&status),
        human => {
            match status.rubric_grading_id {
                None => println!(
                    "Instance question {} has no rubric grading",
                    status.instance_question_id
                ),
                Some(grading_id) if status.staleness.is_stale() => {
                    println!(
                        "Instance question {}: rubric grading {} is out of date",
                        status.instance_question_id, grading_id
                    );
                    if status.staleness.rubric_settings_changed {
                        println!("  rubric settings changed");
                    }
                    if status.staleness.rubric_items_changed {
                        println!("  rubric items changed");
                    }
                }
                Some(grading_id) => println!(
                    "Instance question {}: rubric grading {} is current",
                    status.instance_question_id, grading_id
                ),
            }
        }
    )
}

fn print_rubric(rubric: &Rubric) {
    let settings = rubric.settings();
    println!(
        "Rubric {} (start {}, min {}, extra {}{})",
        rubric.id(),
        format_points(settings.starting_points),
        format_points(settings.min_points),
        format_points(settings.max_extra_points),
        if settings.replace_auto_points {
            ", replaces auto points"
        } else {
            ""
        }
    );
    for item in rubric.items() {
        println!(
            "  [{}] {:>6}  {}",
            item.id,
            format_points(item.points),
            item.description
        );
    }
}
