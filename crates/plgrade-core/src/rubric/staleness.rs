//! Detection of gradings made against an older rubric

use serde::{Deserialize, Serialize};

use super::{Rubric, RubricGrading};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RubricStaleness {
    pub rubric_settings_changed: bool,
    pub rubric_items_changed: bool,
}

impl RubricStaleness {
    pub fn is_stale(&self) -> bool {
        self.rubric_settings_changed || self.rubric_items_changed
    }
}

/// Compare a stored grading with the rubric as it is now.
///
/// Items count as changed when an applied item was removed from the
/// rubric or its point value differs from the one recorded at grading.
pub fn detect_staleness(grading: &RubricGrading, rubric: &Rubric) -> RubricStaleness {
    let current = rubric.settings();
    let recorded = &grading.settings;

    let rubric_settings_changed = current.starting_points != recorded.starting_points
        || current.min_points != recorded.min_points
        || current.max_extra_points != recorded.max_extra_points
        || current.replace_auto_points != recorded.replace_auto_points;

    let rubric_items_changed = grading.items.values().any(|graded| {
        rubric
            .item(&graded.rubric_item_id)
            .is_none_or(|item| item.points != graded.points)
    });

    RubricStaleness {
        rubric_settings_changed,
        rubric_items_changed,
    }
}
