//! Validation of rubric definitions submitted by instructors

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use super::{PointLimits, RubricItem, RubricSettings};
use crate::config::RubricConfig;
use crate::error::Result;
use crate::bail_invalid;

/// A rubric item as submitted for creation or update
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RubricItemInput {
    /// Existing item to update; a new id is generated when absent
    #[serde(default)]
    pub id: Option<String>,
    /// Sort key; items are renumbered from 0 in this order
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub points: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub grader_note: Option<String>,
    #[serde(default)]
    pub always_show_to_students: bool,
}

/// Check that every item is complete and the list is usable
pub fn validate_rubric_items(items: &[RubricItemInput], config: &RubricConfig) -> Result<()> {
    if items.is_empty() {
        bail_invalid!("rubric", "no rubric items were provided");
    }

    for item in items {
        match item.points {
            None => {
                bail_invalid!(
                    "rubric item",
                    "provided without a points value",
                )
            }
            Some(points) if !points.is_finite() => {
                bail_invalid!("rubric item points", points.to_string())
            }
            Some(_) => {}
        }

        let description = item.description.as_deref().unwrap_or_default();
        if description.is_empty() {
            bail_invalid!(
                "rubric item",
                "provided without a description",
            );
        }
        if description.chars().count() > config.max_description_length {
            bail_invalid!(
                "rubric item",
                format!(
                    "description is longer than {} characters; use the explanation for further comments",
                    config.max_description_length
                ),
            );
        }
    }

    Ok(())
}

/// Check that the rubric leaves a non-empty range of points
pub fn validate_point_range(settings: &RubricSettings, limits: &PointLimits) -> Result<()> {
    let max = if settings.replace_auto_points {
        limits.max_points
    } else {
        limits.max_manual_points
    } + settings.max_extra_points;

    if max <= settings.min_points {
        bail_invalid!(
            "rubric",
            format!(
                "question has no range of possible points; rubric points are limited to a minimum of {} and a maximum of {}",
                settings.min_points, max
            ),
        );
    }
    Ok(())
}

/// Turn validated inputs into rubric items, numbered by `order`
pub fn build_rubric_items(mut inputs: Vec<RubricItemInput>) -> Vec<RubricItem> {
    inputs.sort_by_key(|item| item.order);

    inputs
        .into_iter()
        .enumerate()
        .map(|(number, input)| RubricItem {
            id: input.id.unwrap_or_else(|| Ulid::new().to_string()),
            points: input.points.unwrap_or_default(),
            number: u32::try_from(number).unwrap_or(u32::MAX),
            description: input.description.unwrap_or_default(),
            explanation: input.explanation,
            grader_note: input.grader_note,
            always_show_to_students: input.always_show_to_students,
        })
        .collect()
}
