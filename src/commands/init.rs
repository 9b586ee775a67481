//! `plgrade init` - create the gradebook database and default config
//!
//! Idempotent: an existing database is opened and migrated, an existing
//! plgrade.toml is kept unless `--force-config` is given.

use std::fs;

use plgrade_core::config::GradingConfig;
use plgrade_core::db::Database;
use plgrade_core::error::Result;
use serde_json::json;

use super::dispatch::{trace_command, CommandContext};
use super::format::print_json_status;
use crate::cli::paths::{default_config_path, resolve_in_root};
use crate::cli::InitArgs;
use crate::output_by_format_result;

pub fn execute(ctx: &CommandContext, args: &InitArgs) -> Result<()> {
    fs::create_dir_all(ctx.root)?;

    let db_path = ctx.db_path();
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let db = Database::open(&db_path)?;
    let schema_version = db.get_schema_version()?;
    trace_command!(ctx.cli, ctx.start, "open_database");

    let config_path = match ctx.cli.config.as_deref() {
        Some(path) => resolve_in_root(path, ctx.root),
        None => default_config_path(ctx.root),
    };
    let wrote_config = args.force_config || !config_path.exists();
    if wrote_config {
        GradingConfig::default().save(&config_path)?;
    }

    output_by_format_result!(ctx.cli.format,
        json => print_json_status(
            "ok",
            Some("Gradebook initialized"),
            &[
                ("database", json!(db_path.display().to_string())),
                ("config", json!(config_path.display().to_string())),
                ("config_written", json!(wrote_config)),
                ("schema_version", json!(schema_version)),
            ],
        ),
        human => {
            println!("Initialized gradebook at {}", db_path.display());
            if wrote_config && !ctx.cli.quiet {
                println!("Wrote default configuration to {}", config_path.display());
            }
        }
    )
}
