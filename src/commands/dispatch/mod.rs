//! Command dispatch logic for plgrade

use std::time::Instant;

use plgrade_core::error::Result;
use tracing::debug;

use crate::cli::paths::resolve_root_path;
use crate::cli::{Cli, Commands};
use crate::commands;

mod command;
mod macros;

pub use command::{Command, CommandContext, NoCommand};
pub(crate) use macros::trace_command;

pub fn run(cli: &Cli, start: Instant) -> Result<()> {
    let root = resolve_root_path(cli.root.clone());

    debug!(elapsed = ?start.elapsed(), "resolve_root");

    let ctx = CommandContext::new(cli, &root, start);

    match &cli.command {
        None => NoCommand.execute(&ctx),
        Some(cmd) => cmd.execute(&ctx),
    }
}

impl Command for Commands {
    fn execute(&self, ctx: &CommandContext) -> Result<()> {
        match self {
            Commands::Init(args) => commands::init::execute(ctx, args),
            Commands::Load(args) => commands::load::execute(ctx, args),
            Commands::Score(args) => commands::score::execute(ctx, args),
            Commands::SetScore(args) => commands::score::execute_set(ctx, args),
            Commands::Grade(args) => commands::grade::execute(ctx, args),
            Commands::Submit(args) => commands::submit::execute(ctx, args),
            Commands::Finalize(args) => commands::finalize::execute(ctx, args),
            Commands::RubricStatus(args) => commands::rubric::execute_status(ctx, args),
            Commands::Rubric(subcmd) => commands::rubric::execute(ctx, &subcmd.command),
            Commands::Show(args) => commands::show::execute(ctx, args),
            Commands::Jobs(subcmd) => commands::jobs::execute(ctx, &subcmd.command),
        }
    }
}
