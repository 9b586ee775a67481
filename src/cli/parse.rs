//! Value parsers for command arguments

use chrono::{DateTime, Utc};

use plgrade_core::grading::PartialScore;
use plgrade_core::rubric::AppliedRubricItem;

/// Parse `ID` or `ID=FRACTION`
pub fn parse_applied_item(s: &str) -> Result<AppliedRubricItem, String> {
    let (id, score) = match s.split_once('=') {
        Some((id, score)) => (id.trim(), Some(score.trim())),
        None => (s.trim(), None),
    };
    if id.is_empty() {
        return Err("rubric item id must not be empty".to_string());
    }

    match score {
        None => Ok(AppliedRubricItem::full(id)),
        Some(score) => score
            .parse::<f64>()
            .map(|score| AppliedRubricItem::partial(id, score))
            .map_err(|e| format!("invalid score '{score}': {e}")),
    }
}

/// Parse `NAME=SCORE` or `NAME=SCORE:WEIGHT`
pub fn parse_partial_score(s: &str) -> Result<(String, PartialScore), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=SCORE[:WEIGHT], got '{s}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err("partial score name must not be empty".to_string());
    }

    let (score, weight) = match value.split_once(':') {
        Some((score, weight)) => (score, Some(weight)),
        None => (value, None),
    };
    let score: f64 = score
        .trim()
        .parse()
        .map_err(|e| format!("invalid score '{score}': {e}"))?;
    let weight = weight
        .map(|w| {
            w.trim()
                .parse::<f64>()
                .map_err(|e| format!("invalid weight '{w}': {e}"))
        })
        .transpose()?;

    Ok((
        name.to_string(),
        PartialScore {
            score: Some(score),
            weight,
        },
    ))
}

/// Parse an RFC 3339 timestamp
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("invalid timestamp '{s}': {e}"))
}
