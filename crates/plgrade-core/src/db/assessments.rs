use rusqlite::params;
use serde::{Deserialize, Serialize};

use super::{read_points, read_real, read_timestamp, Database, ScoreTransaction};
use crate::error::{GradeError, Result};
use crate::rubric::GradingState;
use crate::scoring::{
    compute_assessment_instance_score, set_assessment_instance_points,
    set_assessment_instance_score_perc, AssessmentInstance, ScoreLogEntry, ScoreRequest,
    ScoreState, ScoreStore, ScoreUpdate,
};
use crate::map_db_err;

/// Instance question as listed under its assessment instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceQuestionSummary {
    pub id: i64,
    pub zone_id: Option<i64>,
    pub points: f64,
    pub score_perc: f64,
    pub max_points: Option<f64>,
    pub auto_points: Option<f64>,
    pub manual_points: Option<f64>,
    pub manual_rubric_id: Option<i64>,
    pub grading_state: GradingState,
    pub modified_at: chrono::DateTime<chrono::Utc>,
}

impl Database {
    pub fn assessment_instance(&self, id: i64) -> Result<AssessmentInstance> {
        ScoreTransaction::new(&self.conn)
            .select_assessment_instance(id)?
            .ok_or_else(|| GradeError::not_found("assessment instance", id))
    }

    /// Recompute an assessment instance score from its questions
    pub fn grade_assessment_instance(&self, request: &ScoreRequest) -> Result<ScoreUpdate> {
        let tx = self.immediate()?;
        let update = {
            let store = ScoreTransaction::new(&tx);
            compute_assessment_instance_score(&store, &store, request, &self.config.scoring)?
        };
        tx.commit()
            .map_err(|e| map_db_err!("commit score update", e))?;
        Ok(update)
    }

    /// Override an instance's percentage
    pub fn set_score_perc(&self, id: i64, score_perc: f64, authn_user_id: Option<i64>) -> Result<ScoreUpdate> {
        let tx = self.immediate()?;
        let update = {
            let store = ScoreTransaction::new(&tx);
            set_assessment_instance_score_perc(&store, &store, id, score_perc, authn_user_id)?
        };
        tx.commit()
            .map_err(|e| map_db_err!("commit score override", e))?;
        Ok(update)
    }

    /// Override an instance's points
    pub fn set_points(&self, id: i64, points: f64, authn_user_id: Option<i64>) -> Result<ScoreUpdate> {
        let tx = self.immediate()?;
        let update = {
            let store = ScoreTransaction::new(&tx);
            set_assessment_instance_points(&store, &store, id, points, authn_user_id)?
        };
        tx.commit()
            .map_err(|e| map_db_err!("commit points override", e))?;
        Ok(update)
    }

    /// Audit log of an instance, oldest first
    pub fn select_score_log(&self, id: i64) -> Result<Vec<ScoreLogEntry>> {
        self.assessment_instance(id)?;

        let mut stmt = self
            .conn
            .prepare(
                "SELECT assessment_instance_id, action, old_points, old_score_perc,
                        new_points, new_score_perc, credit, authn_user_id, created_at
                 FROM assessment_score_logs
                 WHERE assessment_instance_id = ?1
                 ORDER BY id",
            )
            .map_err(|e| map_db_err!("prepare score log query", e))?;

        let entries = stmt
            .query_map(params![id], |row| {
                Ok(ScoreLogEntry {
                    assessment_instance_id: row.get(0)?,
                    action: row.get(1)?,
                    old_state: ScoreState {
                        points: read_points(row, 2, "old_points")?,
                        score_perc: read_points(row, 3, "old_score_perc")?,
                    },
                    new_state: ScoreState {
                        points: read_points(row, 4, "new_points")?,
                        score_perc: read_points(row, 5, "new_score_perc")?,
                    },
                    credit: row.get(6)?,
                    authn_user_id: row.get(7)?,
                    created_at: read_timestamp(row, 8)?,
                })
            })
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(|e| map_db_err!("select score log", e))?;

        Ok(entries)
    }

    /// Instance questions of an assessment instance, by id
    pub fn instance_questions(&self, assessment_instance_id: i64) -> Result<Vec<InstanceQuestionSummary>> {
        self.assessment_instance(assessment_instance_id)?;

        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, zone_id, points, score_perc, max_points, auto_points,
                        manual_points, manual_rubric_id, grading_state, modified_at
                 FROM instance_questions
                 WHERE assessment_instance_id = ?1
                 ORDER BY id",
            )
            .map_err(|e| map_db_err!("prepare instance question query", e))?;

        let rows = stmt
            .query_map(params![assessment_instance_id], |row| {
                let state: String = row.get(8)?;
                Ok(InstanceQuestionSummary {
                    id: row.get(0)?,
                    zone_id: row.get(1)?,
                    points: read_points(row, 2, "points")?,
                    score_perc: read_points(row, 3, "score_perc")?,
                    max_points: read_real(row, 4, "max_points")?,
                    auto_points: read_real(row, 5, "auto_points")?,
                    manual_points: read_real(row, 6, "manual_points")?,
                    manual_rubric_id: row.get(7)?,
                    grading_state: state.parse().unwrap_or_default(),
                    modified_at: read_timestamp(row, 9)?,
                })
            })
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(|e| map_db_err!("select instance questions", e))?;

        Ok(rows)
    }
}
