//! JSON gradebook documents loaded into the database

use std::path::Path;

use rusqlite::params;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::rubrics::write_rubric;
use super::{json_column, now, timestamp, Database};
use crate::error::{GradeError, Result};
use crate::grading::PartialScores;
use crate::rubric::{build_rubric_items, validate_rubric_items, GradingState, Rubric, RubricItemInput, RubricSettings};
use crate::scoring::FULL_CREDIT;
use crate::map_db_err;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GradebookFixture {
    #[serde(default)]
    pub zones: Vec<ZoneFixture>,
    #[serde(default)]
    pub rubrics: Vec<RubricFixture>,
    #[serde(default)]
    pub assessment_instances: Vec<AssessmentInstanceFixture>,
    #[serde(default)]
    pub instance_questions: Vec<InstanceQuestionFixture>,
    #[serde(default)]
    pub submissions: Vec<SubmissionFixture>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneFixture {
    pub id: i64,
    #[serde(default)]
    pub number: i64,
    #[serde(default)]
    pub best_questions: Option<u32>,
    #[serde(default)]
    pub max_points: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricFixture {
    pub id: i64,
    #[serde(flatten)]
    pub settings: RubricSettings,
    pub items: Vec<RubricItemInput>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentInstanceFixture {
    pub id: i64,
    #[serde(default)]
    pub max_points: Option<f64>,
    #[serde(default)]
    pub max_bonus_points: Option<f64>,
    #[serde(default)]
    pub points: f64,
    #[serde(default)]
    pub score_perc: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceQuestionFixture {
    pub id: i64,
    pub assessment_instance_id: i64,
    #[serde(default)]
    pub zone_id: Option<i64>,
    #[serde(default)]
    pub max_points: Option<f64>,
    #[serde(default)]
    pub max_auto_points: Option<f64>,
    #[serde(default)]
    pub max_manual_points: Option<f64>,
    #[serde(default)]
    pub manual_rubric_id: Option<i64>,
    #[serde(default)]
    pub auto_points: Option<f64>,
    #[serde(default)]
    pub manual_points: Option<f64>,
    /// Defaults to the sum of auto and manual points
    #[serde(default)]
    pub points: Option<f64>,
    #[serde(default = "default_grading_state")]
    pub grading_state: GradingState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionFixture {
    #[serde(default)]
    pub id: Option<i64>,
    pub instance_question_id: i64,
    #[serde(default = "default_credit")]
    pub credit: Option<i64>,
    #[serde(default)]
    pub partial_scores: Option<PartialScores>,
    #[serde(default)]
    pub date: Option<chrono::DateTime<chrono::Utc>>,
}

fn default_grading_state() -> GradingState {
    GradingState::AutoGraded
}

fn default_credit() -> Option<i64> {
    Some(FULL_CREDIT)
}

impl GradebookFixture {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl Database {
    /// Insert every record of `fixture` in one transaction.
    ///
    /// Rubric items are validated like any rubric definition. Stored scores
    /// are taken as given; nothing is recomputed.
    pub fn load_fixture(&self, fixture: &GradebookFixture) -> Result<()> {
        let tx = self.immediate()?;
        let modified_at = timestamp(&now());

        for zone in &fixture.zones {
            tx.execute(
                "INSERT INTO zones (id, number, best_questions, max_points) VALUES (?1, ?2, ?3, ?4)",
                params![zone.id, zone.number, zone.best_questions, zone.max_points],
            )
            .map_err(|e| map_db_err!(&format!("insert zone {}", zone.id), e))?;
        }

        for rubric in &fixture.rubrics {
            validate_rubric_items(&rubric.items, &self.config.rubric)?;
            let items = build_rubric_items(rubric.items.clone());
            let checked = Rubric::new(rubric.id, rubric.settings, items)?;
            write_rubric(&tx, Some(rubric.id), &rubric.settings, checked.items())?;
        }

        for instance in &fixture.assessment_instances {
            tx.execute(
                "INSERT INTO assessment_instances
                    (id, max_points, max_bonus_points, points, score_perc, modified_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    instance.id,
                    instance.max_points,
                    instance.max_bonus_points,
                    instance.points,
                    instance.score_perc,
                    modified_at,
                ],
            )
            .map_err(|e| {
                GradeError::db_operation(&format!("insert assessment instance {}", instance.id), e)
            })?;
        }

        for iq in &fixture.instance_questions {
            let points = iq
                .points
                .unwrap_or(iq.auto_points.unwrap_or(0.0) + iq.manual_points.unwrap_or(0.0));
            let score_perc = match iq.max_points {
                Some(max) if max > 0.0 => points * 100.0 / max,
                _ => 0.0,
            };
            tx.execute(
                "INSERT INTO instance_questions
                    (id, assessment_instance_id, zone_id, max_points, max_auto_points,
                     max_manual_points, manual_rubric_id, points, score_perc, auto_points,
                     manual_points, grading_state, modified_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    iq.id,
                    iq.assessment_instance_id,
                    iq.zone_id,
                    iq.max_points,
                    iq.max_auto_points,
                    iq.max_manual_points,
                    iq.manual_rubric_id,
                    points,
                    score_perc,
                    iq.auto_points,
                    iq.manual_points,
                    iq.grading_state.as_str(),
                    modified_at,
                ],
            )
            .map_err(|e| map_db_err!(&format!("insert instance question {}", iq.id), e))?;
        }

        for submission in &fixture.submissions {
            let date = submission.date.as_ref().map_or_else(|| modified_at.clone(), timestamp);
            tx.execute(
                "INSERT INTO submissions (id, instance_question_id, credit, partial_scores, date)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    submission.id,
                    submission.instance_question_id,
                    submission.credit,
                    json_column(submission.partial_scores.as_ref())?,
                    date,
                ],
            )
            .map_err(|e| {
                GradeError::db_operation(
                    &format!("insert submission for instance question {}", submission.instance_question_id),
                    e,
                )
            })?;
        }

        tx.commit()
            .map_err(|e| map_db_err!("commit fixture", e))?;
        debug!(
            assessment_instances = fixture.assessment_instances.len(),
            instance_questions = fixture.instance_questions.len(),
            "loaded fixture"
        );
        Ok(())
    }
}
