//! Rubric grading model
//!
//! A [`Rubric`] is an ordered set of scoring items plus global settings. A
//! [`RubricGrading`] is one selection of items applied to a submission. It
//! records the item points and settings it was computed from so later
//! rubric edits can be detected as staleness instead of silently changing
//! the grade.

pub mod conflict;
pub mod lifecycle;
pub mod staleness;
pub mod validation;

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{GradeError, Result};
use crate::numeric::coerce_nan;
use crate::bail_invalid;

pub use conflict::{detect_conflict, ConflictChecker, ModifiedAtChecker};
pub use lifecycle::{GradingEvent, GradingState};
pub use staleness::{detect_staleness, RubricStaleness};
pub use validation::{build_rubric_items, validate_point_range, validate_rubric_items, RubricItemInput};

/// Global configuration of a rubric
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RubricSettings {
    /// Points before any item is applied; 0 for positive grading, the
    /// question total for negative grading
    #[serde(default)]
    pub starting_points: f64,
    /// Floor for the item-derived total
    #[serde(default)]
    pub min_points: f64,
    /// Points allowed above the question maximum
    #[serde(default)]
    pub max_extra_points: f64,
    /// Rubric computes the total points instead of only the manual points
    #[serde(default)]
    pub replace_auto_points: bool,
}

/// One scoring criterion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricItem {
    pub id: String,
    /// Signed; negative for deductions
    pub points: f64,
    /// Sort position within the rubric
    pub number: u32,
    pub description: String,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub grader_note: Option<String>,
    #[serde(default)]
    pub always_show_to_students: bool,
}

/// A rubric with items in `number` order and unique item ids
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rubric {
    id: i64,
    settings: RubricSettings,
    items: Vec<RubricItem>,
}

/// An item selected by a grader, with an optional partial-credit fraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedRubricItem {
    pub rubric_item_id: String,
    /// Fraction of the item's points; full value when absent
    #[serde(default)]
    pub score: Option<f64>,
}

impl AppliedRubricItem {
    pub fn full(rubric_item_id: impl Into<String>) -> Self {
        Self {
            rubric_item_id: rubric_item_id.into(),
            score: None,
        }
    }

    pub fn partial(rubric_item_id: impl Into<String>, score: f64) -> Self {
        Self {
            rubric_item_id: rubric_item_id.into(),
            score: Some(score),
        }
    }

    pub fn effective_score(&self) -> f64 {
        coerce_nan("rubric_item_score", self.score.unwrap_or(1.0))
    }
}

/// An applied item with the values it had at grading time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricGradingItem {
    pub rubric_item_id: String,
    pub score: f64,
    pub points: f64,
    pub description: String,
}

/// Maximum points the grading is clamped against
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PointLimits {
    pub max_points: f64,
    pub max_manual_points: f64,
}

/// One selection of rubric items applied to a submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricGrading {
    /// Assigned once stored
    pub id: Option<i64>,
    pub rubric_id: i64,
    pub items: BTreeMap<String, RubricGradingItem>,
    /// Sum of item points times applied fraction
    pub total: f64,
    pub adjust_points: f64,
    /// Rubric settings at grading time
    pub settings: RubricSettings,
}

impl Rubric {
    /// Build a rubric, sorting items by number and rejecting duplicate ids
    pub fn new(id: i64, settings: RubricSettings, mut items: Vec<RubricItem>) -> Result<Self> {
        let mut seen = HashSet::new();
        for item in &items {
            if !seen.insert(item.id.as_str()) {
                bail_invalid!(
                    "rubric item",
                    format!("duplicate id {}", item.id),
                );
            }
        }
        items.sort_by_key(|item| item.number);

        Ok(Self {
            id,
            settings,
            items,
        })
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn settings(&self) -> &RubricSettings {
        &self.settings
    }

    pub fn items(&self) -> &[RubricItem] {
        &self.items
    }

    pub fn item(&self, id: &str) -> Option<&RubricItem> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Apply a selection of items.
    ///
    /// Every applied id must belong to this rubric and appear at most once.
    pub fn apply(&self, applied: &[AppliedRubricItem]) -> Result<RubricGrading> {
        let mut items = BTreeMap::new();

        for selection in applied {
            let item = self.item(&selection.rubric_item_id).ok_or_else(|| {
                GradeError::invalid_input(
                    "rubric item",
                    format!(
                        "{} is not part of rubric {}",
                        selection.rubric_item_id, self.id
                    ),
                )
            })?;

            let graded = RubricGradingItem {
                rubric_item_id: item.id.clone(),
                score: selection.effective_score(),
                points: coerce_nan("rubric_item_points", item.points),
                description: item.description.clone(),
            };
            if items.insert(item.id.clone(), graded).is_some() {
                bail_invalid!(
                    "rubric item",
                    format!("{} applied more than once", item.id),
                );
            }
        }

        let total = items.values().map(|item| item.points * item.score).sum();

        Ok(RubricGrading {
            id: None,
            rubric_id: self.id,
            items,
            total,
            adjust_points: 0.0,
            settings: self.settings,
        })
    }
}

/// Apply `applied` to `rubric`; see [`Rubric::apply`]
pub fn apply_rubric_grading(
    rubric: &Rubric,
    applied: &[AppliedRubricItem],
) -> Result<RubricGrading> {
    rubric.apply(applied)
}

impl RubricGrading {
    pub fn with_adjust_points(mut self, adjust_points: f64) -> Self {
        self.adjust_points = coerce_nan("adjust_points", adjust_points);
        self
    }

    /// Points awarded by this grading.
    ///
    /// The item total is added to the starting points, clamped between the
    /// rubric floor and the question maximum plus extra points, and then
    /// shifted by the manual adjustment (which may cross either bound).
    pub fn computed_points(&self, limits: &PointLimits) -> f64 {
        let ceiling = if self.settings.replace_auto_points {
            limits.max_points
        } else {
            limits.max_manual_points
        } + self.settings.max_extra_points;

        (self.settings.starting_points + self.total)
            .max(self.settings.min_points)
            .min(ceiling)
            + self.adjust_points
    }

    pub fn applied_items(&self) -> Vec<AppliedRubricItem> {
        self.items
            .values()
            .map(|item| AppliedRubricItem {
                rubric_item_id: item.rubric_item_id.clone(),
                score: Some(item.score),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests;
