//! SQLite implementation of the scoring storage seams

use rusqlite::{params, Connection, OptionalExtension};

use super::{read_points, read_real, timestamp};
use crate::error::Result;
use crate::scoring::zones::{aggregate_zone_points, ZoneQuestionPoints, ZoneRule};
use crate::scoring::{AssessmentInstance, AuditSink, ScoreLogEntry, ScoreStore, ZonePoints};
use crate::{bail_not_found, map_db_err};

/// Zone id used for instance questions outside any zone
const NO_ZONE: i64 = 0;

/// Score store and audit sink over an open transaction
#[derive(Debug, Clone, Copy)]
pub struct ScoreTransaction<'c> {
    conn: &'c Connection,
}

impl<'c> ScoreTransaction<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

impl ScoreStore for ScoreTransaction<'_> {
    fn select_assessment_instance(&self, id: i64) -> Result<Option<AssessmentInstance>> {
        self.conn
            .query_row(
                "SELECT id, max_points, max_bonus_points, points, score_perc
                 FROM assessment_instances WHERE id = ?1",
                params![id],
                |row| {
                    Ok(AssessmentInstance {
                        id: row.get(0)?,
                        max_points: read_real(row, 1, "max_points")?,
                        max_bonus_points: read_real(row, 2, "max_bonus_points")?,
                        points: read_points(row, 3, "points")?,
                        score_perc: read_points(row, 4, "score_perc")?,
                    })
                },
            )
            .optional()
            .map_err(|e| map_db_err!("select assessment instance", e))
    }

    fn select_zone_points(&self, id: i64) -> Result<Vec<ZonePoints>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, COALESCE(zone_id, ?2), points, max_points
                 FROM instance_questions WHERE assessment_instance_id = ?1",
            )
            .map_err(|e| map_db_err!("prepare zone query", e))?;
        let questions = stmt
            .query_map(params![id, NO_ZONE], |row| {
                Ok(ZoneQuestionPoints {
                    instance_question_id: row.get(0)?,
                    zone_id: row.get(1)?,
                    points: read_points(row, 2, "points")?,
                    max_points: read_points(row, 3, "max_points")?,
                })
            })
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(|e| map_db_err!("select instance question points", e))?;

        let mut stmt = self
            .conn
            .prepare(
                "SELECT DISTINCT z.id, z.best_questions, z.max_points
                 FROM zones z
                 JOIN instance_questions iq ON iq.zone_id = z.id
                 WHERE iq.assessment_instance_id = ?1",
            )
            .map_err(|e| map_db_err!("prepare zone query", e))?;
        let rules = stmt
            .query_map(params![id], |row| {
                Ok(ZoneRule {
                    zone_id: row.get(0)?,
                    best_questions: row.get(1)?,
                    max_points: read_real(row, 2, "zone_max_points")?,
                })
            })
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(|e| map_db_err!("select zones", e))?;

        Ok(aggregate_zone_points(&rules, &questions))
    }

    fn select_last_submission_credit(&self, id: i64) -> Result<Option<i64>> {
        self.conn
            .query_row(
                "SELECT s.credit
                 FROM submissions s
                 JOIN instance_questions iq ON iq.id = s.instance_question_id
                 WHERE iq.assessment_instance_id = ?1
                 ORDER BY s.date DESC, s.id DESC
                 LIMIT 1",
                params![id],
                |row| row.get::<_, Option<i64>>(0),
            )
            .optional()
            .map(Option::flatten)
            .map_err(|e| map_db_err!("select last submission credit", e))
    }

    fn update_assessment_instance_score(&self, id: i64, points: f64, score_perc: f64) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE assessment_instances
                 SET points = ?2, score_perc = ?3, modified_at = ?4
                 WHERE id = ?1",
                params![id, points, score_perc, timestamp(&super::now())],
            )
            .map_err(|e| map_db_err!("update assessment instance score", e))?;

        if changed == 0 {
            bail_not_found!("assessment instance", id);
        }
        Ok(())
    }
}

impl AuditSink for ScoreTransaction<'_> {
    fn record_score_change(&self, entry: &ScoreLogEntry) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO assessment_score_logs
                    (assessment_instance_id, action, old_points, old_score_perc,
                     new_points, new_score_perc, credit, authn_user_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    entry.assessment_instance_id,
                    entry.action,
                    entry.old_state.points,
                    entry.old_state.score_perc,
                    entry.new_state.points,
                    entry.new_state.score_perc,
                    entry.credit,
                    entry.authn_user_id,
                    timestamp(&entry.created_at),
                ],
            )
            .map_err(|e| map_db_err!("insert score log", e))?;
        Ok(())
    }
}
