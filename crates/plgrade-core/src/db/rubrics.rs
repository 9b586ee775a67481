use std::collections::BTreeMap;

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::instance_questions::{select_submission_for_score_update, update_score_in};
use super::{now, read_points, timestamp, Database};
use crate::config::GradingConfig;
use crate::error::{GradeError, Result};
use crate::grading::{InstanceQuestionScoreInput, ManualRubricData, ScoreUpdateOutcome};
use crate::rubric::{
    build_rubric_items, detect_staleness, validate_point_range, validate_rubric_items,
    AppliedRubricItem, GradingState, Rubric, RubricGrading, RubricGradingItem, RubricItem,
    RubricItemInput, RubricSettings, RubricStaleness,
};
use crate::{bail_not_found, map_db_err};

/// Whether an instance question's current rubric grading is up to date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricStatus {
    pub instance_question_id: i64,
    pub rubric_id: Option<i64>,
    pub rubric_grading_id: Option<i64>,
    #[serde(flatten)]
    pub staleness: RubricStaleness,
}

/// A stored rubric and the gradings recomputed because of the change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricSaved {
    pub rubric: Rubric,
    pub recomputed: Vec<ScoreUpdateOutcome>,
    /// Instance questions sent back for manual grading
    #[serde(default)]
    pub tagged_for_grading: Vec<i64>,
}

pub(super) fn load_rubric(conn: &Connection, id: i64) -> Result<Rubric> {
    let settings = conn
        .query_row(
            "SELECT starting_points, min_points, max_extra_points, replace_auto_points
             FROM rubrics WHERE id = ?1",
            params![id],
            |row| {
                Ok(RubricSettings {
                    starting_points: read_points(row, 0, "starting_points")?,
                    min_points: read_points(row, 1, "min_points")?,
                    max_extra_points: read_points(row, 2, "max_extra_points")?,
                    replace_auto_points: row.get(3)?,
                })
            },
        )
        .optional()
        .map_err(|e| map_db_err!("select rubric", e))?
        .ok_or_else(|| GradeError::not_found("rubric", id))?;

    let mut stmt = conn
        .prepare(
            "SELECT id, points, number, description, explanation, grader_note,
                    always_show_to_students
             FROM rubric_items WHERE rubric_id = ?1 ORDER BY number",
        )
        .map_err(|e| map_db_err!("prepare rubric item query", e))?;
    let items = stmt
        .query_map(params![id], |row| {
            Ok(RubricItem {
                id: row.get(0)?,
                points: read_points(row, 1, "rubric_item_points")?,
                number: row.get(2)?,
                description: row.get(3)?,
                explanation: row.get(4)?,
                grader_note: row.get(5)?,
                always_show_to_students: row.get(6)?,
            })
        })
        .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
        .map_err(|e| map_db_err!("select rubric items", e))?;

    Rubric::new(id, settings, items)
}

pub(super) fn load_rubric_grading(conn: &Connection, id: i64) -> Result<RubricGrading> {
    let (rubric_id, adjust_points, settings) = conn
        .query_row(
            "SELECT rubric_id, adjust_points, starting_points, min_points,
                    max_extra_points, replace_auto_points
             FROM rubric_gradings WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    read_points(row, 1, "adjust_points")?,
                    RubricSettings {
                        starting_points: read_points(row, 2, "starting_points")?,
                        min_points: read_points(row, 3, "min_points")?,
                        max_extra_points: read_points(row, 4, "max_extra_points")?,
                        replace_auto_points: row.get(5)?,
                    },
                ))
            },
        )
        .optional()
        .map_err(|e| map_db_err!("select rubric grading", e))?
        .ok_or_else(|| GradeError::not_found("rubric grading", id))?;

    let mut stmt = conn
        .prepare(
            "SELECT rubric_item_id, score, points, description
             FROM rubric_grading_items WHERE rubric_grading_id = ?1",
        )
        .map_err(|e| map_db_err!("prepare rubric grading item query", e))?;
    let items: BTreeMap<String, RubricGradingItem> = stmt
        .query_map(params![id], |row| {
            let item = RubricGradingItem {
                rubric_item_id: row.get(0)?,
                score: read_points(row, 1, "rubric_item_score")?,
                points: read_points(row, 2, "rubric_item_points")?,
                description: row.get(3)?,
            };
            Ok((item.rubric_item_id.clone(), item))
        })
        .and_then(|rows| rows.collect::<rusqlite::Result<_>>())
        .map_err(|e| map_db_err!("select rubric grading items", e))?;

    let total = items.values().map(|item| item.points * item.score).sum();
    Ok(RubricGrading {
        id: Some(id),
        rubric_id,
        items,
        total,
        adjust_points,
        settings,
    })
}

pub(super) fn insert_rubric_grading(
    conn: &Connection,
    grading: &RubricGrading,
    computed_points: f64,
) -> Result<i64> {
    let settings = &grading.settings;
    conn.execute(
        "INSERT INTO rubric_gradings
            (rubric_id, computed_points, adjust_points, starting_points, min_points,
             max_extra_points, replace_auto_points, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            grading.rubric_id,
            computed_points,
            grading.adjust_points,
            settings.starting_points,
            settings.min_points,
            settings.max_extra_points,
            settings.replace_auto_points,
            timestamp(&now()),
        ],
    )
    .map_err(|e| map_db_err!("insert rubric grading", e))?;
    let id = conn.last_insert_rowid();

    for item in grading.items.values() {
        conn.execute(
            "INSERT INTO rubric_grading_items
                (rubric_grading_id, rubric_item_id, score, points, description)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, item.rubric_item_id, item.score, item.points, item.description],
        )
        .map_err(|e| map_db_err!("insert rubric grading item", e))?;
    }

    Ok(id)
}

/// Store a rubric and replace its item list
pub(super) fn write_rubric(
    conn: &Connection,
    rubric_id: Option<i64>,
    settings: &RubricSettings,
    items: &[RubricItem],
) -> Result<i64> {
    let modified_at = timestamp(&now());
    let id = match rubric_id {
        Some(id) => {
            conn.execute(
                "INSERT INTO rubrics
                    (id, starting_points, min_points, max_extra_points, replace_auto_points, modified_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    starting_points = excluded.starting_points,
                    min_points = excluded.min_points,
                    max_extra_points = excluded.max_extra_points,
                    replace_auto_points = excluded.replace_auto_points,
                    modified_at = excluded.modified_at",
                params![
                    id,
                    settings.starting_points,
                    settings.min_points,
                    settings.max_extra_points,
                    settings.replace_auto_points,
                    modified_at,
                ],
            )
            .map_err(|e| map_db_err!("upsert rubric", e))?;
            id
        }
        None => {
            conn.execute(
                "INSERT INTO rubrics
                    (starting_points, min_points, max_extra_points, replace_auto_points, modified_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    settings.starting_points,
                    settings.min_points,
                    settings.max_extra_points,
                    settings.replace_auto_points,
                    modified_at,
                ],
            )
            .map_err(|e| map_db_err!("insert rubric", e))?;
            conn.last_insert_rowid()
        }
    };

    conn.execute("DELETE FROM rubric_items WHERE rubric_id = ?1", params![id])
        .map_err(|e| map_db_err!("delete rubric items", e))?;
    for item in items {
        conn.execute(
            "INSERT INTO rubric_items
                (rubric_id, id, number, points, description, explanation, grader_note,
                 always_show_to_students)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id,
                item.id,
                item.number,
                item.points,
                item.description,
                item.explanation,
                item.grader_note,
                item.always_show_to_students,
            ],
        )
        .map_err(|e| map_db_err!("insert rubric item", e))?;
    }

    Ok(id)
}

fn attached_instance_questions(conn: &Connection, rubric_id: i64) -> Result<Vec<i64>> {
    let mut stmt = conn
        .prepare("SELECT id FROM instance_questions WHERE manual_rubric_id = ?1 ORDER BY id")
        .map_err(|e| map_db_err!("prepare attached question query", e))?;
    let ids = stmt
        .query_map(params![rubric_id], |row| row.get(0))
        .and_then(|rows| rows.collect::<rusqlite::Result<Vec<i64>>>())
        .map_err(|e| map_db_err!("select attached questions", e))?;
    Ok(ids)
}

fn rubric_exists(conn: &Connection, id: i64) -> Result<bool> {
    conn.query_row("SELECT 1 FROM rubrics WHERE id = ?1", params![id], |_| Ok(()))
        .optional()
        .map(|found| found.is_some())
        .map_err(|e| map_db_err!("select rubric", e))
}

/// Move manually or AI graded questions on `rubric_id` back to the
/// grading queue. Finalized questions are left alone.
fn tag_for_manual_grading(conn: &Connection, rubric_id: i64) -> Result<Vec<i64>> {
    let mut tagged = Vec::new();
    for iq_id in attached_instance_questions(conn, rubric_id)? {
        let changed = conn
            .execute(
                "UPDATE instance_questions SET grading_state = ?2, modified_at = ?3
                 WHERE id = ?1 AND grading_state IN (?4, ?5)",
                params![
                    iq_id,
                    GradingState::AutoGraded.as_str(),
                    timestamp(&now()),
                    GradingState::ManualGraded.as_str(),
                    GradingState::AiGraded.as_str(),
                ],
            )
            .map_err(|e| map_db_err!("tag instance question for grading", e))?;
        if changed > 0 {
            tagged.push(iq_id);
        }
    }
    Ok(tagged)
}

/// Regrade every attached question whose rubric grading went stale
fn recompute_in(
    conn: &Connection,
    config: &GradingConfig,
    rubric: &Rubric,
    authn_user_id: Option<i64>,
) -> Result<Vec<ScoreUpdateOutcome>> {
    let mut outcomes = Vec::new();

    for iq_id in attached_instance_questions(conn, rubric.id())? {
        let current = select_submission_for_score_update(conn, iq_id, None)?;
        let Some(grading_id) = current.manual_rubric_grading_id else {
            continue;
        };
        if current.grading_state == GradingState::Finalized {
            debug!(instance_question_id = iq_id, "skipping finalized question");
            continue;
        }

        let grading = load_rubric_grading(conn, grading_id)?;
        if !detect_staleness(&grading, rubric).is_stale() {
            continue;
        }

        let applied: Vec<AppliedRubricItem> = grading
            .applied_items()
            .into_iter()
            .filter(|item| rubric.item(&item.rubric_item_id).is_some())
            .collect();
        let input = InstanceQuestionScoreInput {
            manual_rubric_data: Some(ManualRubricData {
                rubric_id: rubric.id(),
                applied_rubric_items: applied,
                adjust_points: Some(grading.adjust_points),
            }),
            ai_graded: current.grading_state == GradingState::AiGraded,
            ..Default::default()
        };

        debug!(instance_question_id = iq_id, "recomputing stale rubric grading");
        outcomes.push(update_score_in(conn, config, iq_id, None, None, &input, authn_user_id)?);
    }

    Ok(outcomes)
}

impl Database {
    pub fn rubric(&self, id: i64) -> Result<Rubric> {
        load_rubric(&self.conn, id)
    }

    pub fn rubric_grading(&self, id: i64) -> Result<RubricGrading> {
        load_rubric_grading(&self.conn, id)
    }

    /// Create or update a rubric and regrade questions it made stale.
    ///
    /// The point range is checked against every attached question. With
    /// `tag_for_grading`, graded questions on the rubric also go back to
    /// the manual grading queue, keeping their recomputed points.
    pub fn save_rubric(
        &self,
        rubric_id: Option<i64>,
        settings: RubricSettings,
        items: Vec<RubricItemInput>,
        tag_for_grading: bool,
        authn_user_id: Option<i64>,
    ) -> Result<RubricSaved> {
        validate_rubric_items(&items, &self.config.rubric)?;
        let items = build_rubric_items(items);
        let candidate = Rubric::new(rubric_id.unwrap_or_default(), settings, items)?;

        let tx = self.immediate()?;
        if let Some(id) = rubric_id {
            if !rubric_exists(&tx, id)? {
                bail_not_found!("rubric", id);
            }
            for iq_id in attached_instance_questions(&tx, id)? {
                let current = select_submission_for_score_update(&tx, iq_id, None)?;
                validate_point_range(&settings, &current.limits())?;
            }
        }

        let id = write_rubric(&tx, rubric_id, &settings, candidate.items())?;
        let rubric = load_rubric(&tx, id)?;
        let recomputed = recompute_in(&tx, &self.config, &rubric, authn_user_id)?;
        let tagged_for_grading = if tag_for_grading {
            tag_for_manual_grading(&tx, id)?
        } else {
            Vec::new()
        };

        tx.commit()
            .map_err(|e| map_db_err!("commit rubric", e))?;
        debug!(
            rubric_id = id,
            recomputed = recomputed.len(),
            tagged = tagged_for_grading.len(),
            "saved rubric"
        );

        Ok(RubricSaved {
            rubric,
            recomputed,
            tagged_for_grading,
        })
    }

    /// Grade an instance question with a rubric from now on
    pub fn attach_rubric(&self, instance_question_id: i64, rubric_id: Option<i64>) -> Result<()> {
        if let Some(id) = rubric_id {
            load_rubric(&self.conn, id)?;
        }
        let changed = self
            .conn
            .execute(
                "UPDATE instance_questions SET manual_rubric_id = ?2 WHERE id = ?1",
                params![instance_question_id, rubric_id],
            )
            .map_err(|e| map_db_err!("attach rubric", e))?;
        if changed == 0 {
            bail_not_found!("instance question", instance_question_id);
        }
        Ok(())
    }

    /// Staleness of the rubric grading on the latest submission
    pub fn rubric_status(&self, instance_question_id: i64) -> Result<RubricStatus> {
        let current = select_submission_for_score_update(&self.conn, instance_question_id, None)?;

        let staleness = match (current.manual_rubric_id, current.manual_rubric_grading_id) {
            (Some(rubric_id), Some(grading_id)) => {
                let rubric = load_rubric(&self.conn, rubric_id)?;
                let grading = load_rubric_grading(&self.conn, grading_id)?;
                detect_staleness(&grading, &rubric)
            }
            _ => RubricStaleness::default(),
        };

        Ok(RubricStatus {
            instance_question_id,
            rubric_id: current.manual_rubric_id,
            rubric_grading_id: current.manual_rubric_grading_id,
            staleness,
        })
    }
}
