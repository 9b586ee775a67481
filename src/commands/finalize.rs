//! `plgrade finalize` - close grading of the current submission

use plgrade_core::error::Result;
use serde_json::json;

use super::dispatch::CommandContext;
use super::format::print_json;
use crate::cli::FinalizeArgs;
use crate::output_by_format_result;

pub fn execute(ctx: &CommandContext, args: &FinalizeArgs) -> Result<()> {
    let db = ctx.open_database()?;
    let state = db.finalize_instance_question(args.instance_question_id)?;

    output_by_format_result!(ctx.cli.format,
        json => print_json(&json!({
            "instance_question_id": args.instance_question_id,
            "grading_state": state,
        })),
        human => {
            println!("Instance question {} is {}", args.instance_question_id, state);
        }
    )
}
