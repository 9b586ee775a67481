//! Instance question score updates
//!
//! Turns a grader's input (points, percentages, partial scores or a rubric
//! selection) into new auto/manual/total points for one instance question.
//! The computation here is pure. Storage, conflict checks and assessment
//! recomputation are orchestrated by [`crate::db::Database`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GradeError, Result};
use crate::numeric::{coerce_nan, coerce_nan_opt};
use crate::rubric::{
    AppliedRubricItem, ConflictChecker, GradingEvent, GradingState, PointLimits, Rubric,
    RubricGrading,
};
use crate::scoring::ScoreUpdate;
use crate::bail_invalid;

/// Score of one sub-part of a question
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PartialScore {
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub weight: Option<f64>,
}

pub type PartialScores = BTreeMap<String, PartialScore>;

/// Weighted auto score percentage of a set of partial scores.
///
/// Missing scores count as 0 and missing weights as 1. Returns `None` when
/// the total weight is zero.
pub fn partial_scores_perc(scores: &PartialScores) -> Option<f64> {
    let (weighted, total_weight) = scores.values().fold((0.0, 0.0), |(sum, weights), part| {
        let score = coerce_nan("partial_score", part.score.unwrap_or(0.0));
        let weight = coerce_nan("partial_weight", part.weight.unwrap_or(1.0));
        (sum + score * weight, weights + weight)
    });

    (total_weight != 0.0).then(|| 100.0 * weighted / total_weight)
}

/// Stored state of an instance question at the start of a score update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionForScoreUpdate {
    pub assessment_instance_id: i64,
    pub instance_question_id: i64,
    pub submission_id: Option<i64>,
    pub max_points: Option<f64>,
    pub max_auto_points: Option<f64>,
    pub max_manual_points: Option<f64>,
    pub manual_rubric_id: Option<i64>,
    pub partial_scores: Option<PartialScores>,
    pub auto_points: Option<f64>,
    pub manual_points: Option<f64>,
    pub manual_rubric_grading_id: Option<i64>,
    pub grading_state: GradingState,
    pub modified_at: DateTime<Utc>,
    /// Set when the caller's view of the question is out of date
    pub modified_at_conflict: bool,
}

impl SubmissionForScoreUpdate {
    /// Coerce NaN values read from storage to zero
    pub fn sanitized(mut self) -> Self {
        self.max_points = coerce_nan_opt("max_points", self.max_points);
        self.max_auto_points = coerce_nan_opt("max_auto_points", self.max_auto_points);
        self.max_manual_points = coerce_nan_opt("max_manual_points", self.max_manual_points);
        self.auto_points = coerce_nan_opt("auto_points", self.auto_points);
        self.manual_points = coerce_nan_opt("manual_points", self.manual_points);
        self
    }

    /// Mark a conflict if the caller loaded a different version.
    ///
    /// Without a client timestamp no check is made.
    pub fn check_conflict<C>(mut self, checker: &C, client_modified_at: Option<&DateTime<Utc>>) -> Self
    where
        C: ConflictChecker<Version = DateTime<Utc>>,
    {
        if let Some(client) = client_modified_at {
            self.modified_at_conflict = checker.is_conflict(client, &self.modified_at);
        }
        self
    }

    pub fn limits(&self) -> PointLimits {
        PointLimits {
            max_points: self.max_points.unwrap_or(0.0),
            max_manual_points: self.max_manual_points.unwrap_or(0.0),
        }
    }

    /// Percentage of `max_points`; 0 when there is no positive maximum
    pub fn perc_of_max(&self, points: f64) -> f64 {
        match self.max_points {
            Some(max) if max > 0.0 => points * 100.0 / max,
            _ => 0.0,
        }
    }
}

/// Rubric selection used to compute manual points
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ManualRubricData {
    pub rubric_id: i64,
    #[serde(default)]
    pub applied_rubric_items: Vec<AppliedRubricItem>,
    #[serde(default)]
    pub adjust_points: Option<f64>,
}

/// Values a grader may set on an instance question
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InstanceQuestionScoreInput {
    #[serde(default)]
    pub manual_points: Option<f64>,
    #[serde(default)]
    pub manual_score_perc: Option<f64>,
    #[serde(default)]
    pub auto_points: Option<f64>,
    #[serde(default)]
    pub auto_score_perc: Option<f64>,
    /// Total points; manual points become this minus the auto points
    #[serde(default)]
    pub points: Option<f64>,
    /// Percentage of total points
    #[serde(default)]
    pub score_perc: Option<f64>,
    /// Merged over stored partial scores; determines auto points
    #[serde(default)]
    pub partial_scores: Option<PartialScores>,
    #[serde(default)]
    pub feedback: Option<serde_json::Value>,
    #[serde(default)]
    pub manual_rubric_data: Option<ManualRubricData>,
    /// The grade comes from an AI grader rather than a person
    #[serde(default)]
    pub ai_graded: bool,
}

/// What happens to the question's rubric grading reference
#[derive(Debug, Clone, PartialEq)]
pub enum RubricGradingChange {
    /// Store this new grading and reference it
    New(RubricGrading),
    /// Keep the existing reference
    Keep(Option<i64>),
    /// Manual points were set directly; drop the reference
    Clear,
}

/// New values for an instance question
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionScoreChange {
    pub points: Option<f64>,
    pub score_perc: Option<f64>,
    pub auto_points: Option<f64>,
    pub auto_score_perc: Option<f64>,
    pub manual_points: Option<f64>,
    pub partial_scores: Option<PartialScores>,
    pub rubric_grading: RubricGradingChange,
}

impl QuestionScoreChange {
    /// Lifecycle event implied by this change, if any
    pub fn grading_event(&self, ai_graded: bool) -> Option<GradingEvent> {
        let manual_changed = self.score_perc.is_some()
            && (self.manual_points.is_some() || matches!(self.rubric_grading, RubricGradingChange::New(_)));

        if manual_changed {
            Some(if ai_graded {
                GradingEvent::AiGrade
            } else {
                GradingEvent::ManualGrade
            })
        } else if self.auto_points.is_some() {
            Some(GradingEvent::AutoGrade)
        } else {
            None
        }
    }
}

fn exclusive(a: (&str, Option<f64>), b: (&str, Option<f64>)) -> Result<()> {
    if a.1.is_some() && b.1.is_some() {
        bail_invalid!(
            "score input",
            format!("cannot set both {} and {}", a.0, b.0),
        );
    }
    Ok(())
}

fn finite(name: &str, value: Option<f64>) -> Result<Option<f64>> {
    match value {
        Some(v) if !v.is_finite() => Err(GradeError::invalid_input(name, v)),
        other => Ok(other),
    }
}

/// Compute the new score for an instance question.
///
/// `rubric` must be the rubric named by the input's rubric data when the
/// question is graded with one.
pub fn compute_question_score(
    current: &SubmissionForScoreUpdate,
    input: &InstanceQuestionScoreInput,
    rubric: Option<&Rubric>,
) -> Result<QuestionScoreChange> {
    let auto_points_in = finite("auto_points", input.auto_points)?;
    let auto_score_perc_in = finite("auto_score_perc", input.auto_score_perc)?;
    let points_in = finite("points", input.points)?;
    let score_perc_in = finite("score_perc", input.score_perc)?;
    let mut manual_points_in = finite("manual_points", input.manual_points)?;
    let mut manual_score_perc_in = finite("manual_score_perc", input.manual_score_perc)?;

    let max_auto = current.max_auto_points.unwrap_or(0.0);
    let mut auto_points = None;
    let mut auto_score_perc = None;
    let mut partial_scores = None;

    if let Some(update) = &input.partial_scores {
        let mut merged = current.partial_scores.clone().unwrap_or_default();
        merged.extend(update.iter().map(|(k, v)| (k.clone(), *v)));
        if let Some(perc) = partial_scores_perc(&merged) {
            auto_score_perc = Some(perc);
            auto_points = Some(perc / 100.0 * max_auto);
        }
        partial_scores = Some(merged);
    }

    exclusive(("auto_score_perc", auto_score_perc_in), ("auto_points", auto_points_in))?;
    exclusive(("auto_score_perc", auto_score_perc_in), ("score_perc", score_perc_in))?;
    exclusive(("auto_points", auto_points_in), ("points", points_in))?;

    if let Some(perc) = auto_score_perc_in {
        auto_score_perc = Some(perc);
        auto_points = Some(perc * max_auto / 100.0);
    } else if let Some(points) = auto_points_in {
        auto_points = Some(points);
        auto_score_perc = Some(if max_auto > 0.0 {
            points * 100.0 / max_auto
        } else {
            0.0
        });
    }

    let current_auto = || auto_points.or(current.auto_points).unwrap_or(0.0);

    let rubric_grading = match (&input.manual_rubric_data, current.manual_rubric_id) {
        (Some(data), Some(question_rubric_id)) => {
            if data.rubric_id != question_rubric_id {
                bail_invalid!(
                    "rubric",
                    format!(
                        "{} is not the rubric of instance question {}",
                        data.rubric_id, current.instance_question_id
                    ),
                );
            }
            let rubric = rubric
                .filter(|r| r.id() == data.rubric_id)
                .ok_or_else(|| GradeError::not_found("rubric", data.rubric_id))?;

            let grading = rubric
                .apply(&data.applied_rubric_items)?
                .with_adjust_points(finite("adjust_points", data.adjust_points)?.unwrap_or(0.0));
            let computed = grading.computed_points(&current.limits());
            manual_points_in = Some(if grading.settings.replace_auto_points {
                computed - current_auto()
            } else {
                computed
            });
            manual_score_perc_in = None;
            RubricGradingChange::New(grading)
        }
        (Some(data), None) => {
            bail_invalid!(
                "rubric",
                format!(
                    "instance question {} is not graded with rubric {}",
                    current.instance_question_id, data.rubric_id
                ),
            )
        }
        (None, Some(_))
            if points_in.is_none()
                && score_perc_in.is_none()
                && manual_points_in.is_none()
                && manual_score_perc_in.is_none() =>
        {
            RubricGradingChange::Keep(current.manual_rubric_grading_id)
        }
        _ => RubricGradingChange::Clear,
    };

    exclusive(("manual_score_perc", manual_score_perc_in), ("manual_points", manual_points_in))?;
    exclusive(("manual_score_perc", manual_score_perc_in), ("score_perc", score_perc_in))?;
    exclusive(("manual_points", manual_points_in), ("points", points_in))?;
    exclusive(("score_perc", score_perc_in), ("points", points_in))?;

    let max_manual = current.max_manual_points.unwrap_or(0.0);
    let max_points = current.max_points.unwrap_or(0.0);

    let (points, score_perc, manual_points) = if let Some(perc) = manual_score_perc_in {
        let manual = perc * max_manual / 100.0;
        let points = manual + current_auto();
        (Some(points), Some(current.perc_of_max(points)), Some(manual))
    } else if let Some(manual) = manual_points_in {
        let points = manual + current_auto();
        (Some(points), Some(current.perc_of_max(points)), Some(manual))
    } else if let Some(perc) = score_perc_in {
        let points = perc * max_points / 100.0;
        (Some(points), Some(perc), Some(points - current_auto()))
    } else if let Some(points) = points_in {
        (
            Some(points),
            Some(current.perc_of_max(points)),
            Some(points - current_auto()),
        )
    } else if let Some(auto) = auto_points {
        let points = auto + current.manual_points.unwrap_or(0.0);
        (Some(points), Some(current.perc_of_max(points)), None)
    } else {
        (None, None, None)
    };

    Ok(QuestionScoreChange {
        points,
        score_perc,
        auto_points,
        auto_score_perc,
        manual_points,
        partial_scores,
        rubric_grading,
    })
}

/// New score of an instance question after an applied update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionScore {
    pub points: f64,
    pub score_perc: f64,
    pub auto_points: Option<f64>,
    pub manual_points: Option<f64>,
}

/// Result of [`crate::db::Database::update_instance_question_score`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScoreUpdateOutcome {
    /// The update was stored
    Applied {
        instance_question_id: i64,
        grading_job_id: Option<i64>,
        rubric_grading_id: Option<i64>,
        grading_state: GradingState,
        /// `None` when only feedback or stored data changed
        score: Option<QuestionScore>,
        /// Recomputed assessment instance score
        assessment: Option<ScoreUpdate>,
    },
    /// The question changed since the caller loaded it; nothing was scored
    Conflict {
        instance_question_id: i64,
        grading_job_id: Option<i64>,
        modified_at: DateTime<Utc>,
    },
}

impl ScoreUpdateOutcome {
    pub fn is_conflict(&self) -> bool {
        matches!(self, ScoreUpdateOutcome::Conflict { .. })
    }
}

#[cfg(test)]
mod tests;
