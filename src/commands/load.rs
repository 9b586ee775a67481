//! `plgrade load` - load a JSON gradebook fixture

use plgrade_core::db::GradebookFixture;
use plgrade_core::error::Result;
use serde_json::json;

use super::dispatch::{trace_command, CommandContext};
use super::format::print_json_status;
use crate::cli::paths::resolve_in_root;
use crate::cli::LoadArgs;
use crate::output_by_format_result;

pub fn execute(ctx: &CommandContext, args: &LoadArgs) -> Result<()> {
    let db = ctx.open_database()?;
    let fixture = GradebookFixture::from_file(&resolve_in_root(&args.file, ctx.root))?;
    trace_command!(ctx.cli, ctx.start, "read_fixture");

    db.load_fixture(&fixture)?;
    trace_command!(ctx.cli, ctx.start, "load_fixture");

    output_by_format_result!(ctx.cli.format,
        json => print_json_status(
            "ok",
            None,
            &[
                ("zones", json!(fixture.zones.len())),
                ("rubrics", json!(fixture.rubrics.len())),
                ("assessment_instances", json!(fixture.assessment_instances.len())),
                ("instance_questions", json!(fixture.instance_questions.len())),
                ("submissions", json!(fixture.submissions.len())),
            ],
        ),
        human => {
            println!(
                "Loaded {} assessment instances, {} instance questions, {} submissions, {} rubrics",
                fixture.assessment_instances.len(),
                fixture.instance_questions.len(),
                fixture.submissions.len(),
                fixture.rubrics.len()
            );
        }
    )
}
