//! `plgrade jobs` - batch grading job progress
//!
//! `merge` folds stored snapshots of overlapping job sequences into one
//! status per item. `replay` feeds recorded updates through a progress
//! relay to a tracking session, the way a live grading page follows a run.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::thread;

use plgrade_core::error::{GradeError, Result};
use plgrade_core::jobs::{
    merge_statuses, JobItemStatus, JobProgressDelta, JobProgressRelay, JobSequenceProgress,
    ProgressTracker,
};
use serde::{Deserialize, Serialize};

use super::dispatch::{trace_command, CommandContext};
use super::format::print_json;
use crate::cli::paths::resolve_in_root;
use crate::cli::JobsCommands;
use crate::output_by_format_result;

/// Recorded run of one job sequence
#[derive(Debug, Deserialize)]
struct RecordedSequence {
    job_sequence_id: String,
    items: Vec<String>,
    #[serde(default)]
    updates: Vec<JobProgressDelta>,
}

#[derive(Debug, Serialize)]
struct MergeReport {
    item_statuses: BTreeMap<String, JobItemStatus>,
    dismissable: Vec<String>,
    running: Vec<String>,
}

fn merge_report(jobs: &[JobSequenceProgress]) -> MergeReport {
    let (finished, running): (Vec<&JobSequenceProgress>, Vec<&JobSequenceProgress>) =
        jobs.iter().partition(|job| job.is_finished());

    MergeReport {
        item_statuses: merge_statuses(jobs),
        dismissable: finished.iter().map(|job| job.job_sequence_id.clone()).collect(),
        running: running.iter().map(|job| job.job_sequence_id.clone()).collect(),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(ctx: &CommandContext, file: &Path) -> Result<T> {
    let content = fs::read_to_string(resolve_in_root(file, ctx.root))?;
    Ok(serde_json::from_str(&content)?)
}

pub fn execute(ctx: &CommandContext, command: &JobsCommands) -> Result<()> {
    match command {
        JobsCommands::Merge { file } => execute_merge(ctx, file),
        JobsCommands::Replay { file } => execute_replay(ctx, file),
    }
}

fn execute_merge(ctx: &CommandContext, file: &Path) -> Result<()> {
    let jobs: Vec<JobSequenceProgress> = read_json(ctx, file)?;
    let report = merge_report(&jobs);

    output_by_format_result!(ctx.cli.format,
        json => print_json(&report),
        human => {
            for (item, status) in &report.item_statuses {
                println!("{item}: {status}");
            }
            if !report.dismissable.is_empty() {
                println!("Finished: {}", report.dismissable.join(", "));
            }
            if !report.running.is_empty() {
                println!("Running: {}", report.running.join(", "));
            }
        }
    )
}

fn execute_replay(ctx: &CommandContext, file: &Path) -> Result<()> {
    let recorded: RecordedSequence = read_json(ctx, file)?;
    if let Some(delta) = recorded
        .updates
        .iter()
        .find(|delta| delta.job_sequence_id != recorded.job_sequence_id)
    {
        return Err(GradeError::invalid_input(
            "job progress update",
            format!(
                "update for {} in a recording of {}",
                delta.job_sequence_id, recorded.job_sequence_id
            ),
        ));
    }

    let relay = JobProgressRelay::new();
    let token = relay.register_sequence(&recorded.job_sequence_id, recorded.items.iter())?;

    let mut tracker = ProgressTracker::new();
    if !tracker.record_join(&relay, &recorded.job_sequence_id, &token) {
        return Err(GradeError::Other(format!(
            "could not join job sequence {}",
            recorded.job_sequence_id
        )));
    }

    let producer = {
        let relay = relay.clone();
        let updates = recorded.updates;
        thread::spawn(move || -> Result<usize> {
            for delta in &updates {
                relay.update(delta.clone())?;
            }
            Ok(updates.len())
        })
    };
    let sent = producer
        .join()
        .map_err(|_| GradeError::Other("job progress producer panicked".to_string()))??;
    let applied = tracker.poll();
    trace_command!(ctx.cli, ctx.start, "replay_updates");

    let snapshot = tracker
        .get(&recorded.job_sequence_id)
        .cloned()
        .ok_or_else(|| GradeError::not_found("job sequence", &recorded.job_sequence_id))?;
    let finished = snapshot.is_finished();
    let dismissed = tracker.dismiss(&recorded.job_sequence_id);

    output_by_format_result!(ctx.cli.format,
        json => print_json(&serde_json::json!({
            "job_sequence_id": snapshot.job_sequence_id,
            "updates_sent": sent,
            "updates_applied": applied,
            "finished": finished,
            "dismissed": dismissed,
            "progress": snapshot,
        })),
        human => {
            println!(
                "{}: {}/{} complete{}",
                snapshot.job_sequence_id,
                snapshot.num_complete,
                snapshot.num_total,
                if finished { " (finished)" } else { "" }
            );
            for (item, status) in &snapshot.item_statuses {
                println!("  {item}: {status}");
            }
        }
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_report_splits_finished_jobs() {
        let mut done = JobSequenceProgress::queued("done", ["a"]);
        done.apply(&JobProgressDelta::new("done").with_item("a", JobItemStatus::Complete));
        let running = JobSequenceProgress::queued("running", ["a", "b"]);

        let report = merge_report(&[done, running]);
        assert_eq!(report.dismissable, vec!["done".to_string()]);
        assert_eq!(report.running, vec!["running".to_string()]);
        assert_eq!(report.item_statuses["a"], JobItemStatus::Queued);
        assert_eq!(report.item_statuses["b"], JobItemStatus::Queued);
    }
}
