//! Shared output helpers for commands

use plgrade_core::error::Result;
use plgrade_core::format::format_points;
use plgrade_core::scoring::ScoreUpdate;
use serde::Serialize;
use serde_json::json;

/// Print a value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a JSON status message with optional fields
pub fn print_json_status(
    status: &str,
    message: Option<&str>,
    extra_fields: &[(&str, serde_json::Value)],
) -> Result<()> {
    let mut output = json!({ "status": status });

    if let Some(obj) = output.as_object_mut() {
        if let Some(msg) = message {
            obj.insert("message".to_string(), json!(msg));
        }
        for (key, value) in extra_fields {
            obj.insert(key.to_string(), value.clone());
        }
    }

    print_json(&output)
}

/// One-line human summary of an assessment instance score
pub fn score_line(assessment_instance_id: i64, update: &ScoreUpdate) -> String {
    format!(
        "Assessment instance {}: {} points, {}%{}",
        assessment_instance_id,
        format_points(update.points),
        format_points(update.score_perc),
        if update.updated { "" } else { " (unchanged)" }
    )
}
