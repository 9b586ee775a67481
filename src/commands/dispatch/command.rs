//! Command trait and context for dispatching commands

use std::path::{Path, PathBuf};
use std::time::Instant;

use plgrade_core::config::GradingConfig;
use plgrade_core::db::Database;
use plgrade_core::error::{GradeError, Result};

use crate::cli::paths::resolve_db_path;
use crate::cli::Cli;

/// Shared context for command execution
pub struct CommandContext<'a> {
    pub cli: &'a Cli,
    pub root: &'a Path,
    pub start: Instant,
}

impl<'a> CommandContext<'a> {
    pub fn new(cli: &'a Cli, root: &'a Path, start: Instant) -> Self {
        Self { cli, root, start }
    }

    pub fn db_path(&self) -> PathBuf {
        resolve_db_path(self.cli.db.as_deref(), self.root)
    }

    pub fn config(&self) -> Result<GradingConfig> {
        GradingConfig::resolve(self.cli.config.as_deref(), self.root)
    }

    /// Open an existing gradebook with the resolved configuration
    pub fn open_database(&self) -> Result<Database> {
        let path = self.db_path();
        if !path.exists() {
            return Err(GradeError::not_found(
                "gradebook database",
                format!("{} (run `plgrade init` first)", path.display()),
            ));
        }

        let config = self.config()?;
        Ok(Database::open(&path)?.with_config(config))
    }
}

/// Trait for commands that can be executed
pub trait Command {
    fn execute(&self, ctx: &CommandContext) -> Result<()>;
}

/// No-op command (when no subcommand is provided)
pub struct NoCommand;

impl Command for NoCommand {
    fn execute(&self, _ctx: &CommandContext) -> Result<()> {
        println!("plgrade {}", env!("CARGO_PKG_VERSION"));
        println!();
        println!("Assessment scoring and rubric grading engine.");
        println!();
        println!("Run `plgrade --help` for usage information.");
        Ok(())
    }
}
