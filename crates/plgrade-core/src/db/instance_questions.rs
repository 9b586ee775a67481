use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::rubrics::{insert_rubric_grading, load_rubric};
use super::{json_column, now, read_real, read_timestamp, timestamp, Database, ScoreTransaction};
use crate::config::GradingConfig;
use crate::error::Result;
use crate::grading::{
    compute_question_score, partial_scores_perc, InstanceQuestionScoreInput, PartialScores,
    QuestionScore, RubricGradingChange, ScoreUpdateOutcome, SubmissionForScoreUpdate,
};
use crate::rubric::{GradingEvent, GradingState, ModifiedAtChecker};
use crate::scoring::{compute_assessment_instance_score, ScoreRequest, ScoreUpdate, FULL_CREDIT};
use crate::{bail_invalid, bail_not_found, map_db_err};

/// A student submission, optionally with the external grader's result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSubmission {
    pub instance_question_id: i64,
    /// Integer percentage awarded for this submission's timing
    #[serde(default = "full_credit")]
    pub credit: i64,
    /// Auto points follow from these when present
    #[serde(default)]
    pub partial_scores: Option<PartialScores>,
    #[serde(default)]
    pub auto_points: Option<f64>,
}

fn full_credit() -> i64 {
    FULL_CREDIT
}

impl NewSubmission {
    pub fn new(instance_question_id: i64) -> Self {
        Self {
            instance_question_id,
            credit: FULL_CREDIT,
            partial_scores: None,
            auto_points: None,
        }
    }
}

/// Result of [`Database::record_submission`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    pub submission_id: i64,
    pub instance_question_id: i64,
    pub grading_state: GradingState,
    /// Present when the submission was auto graded
    pub score: Option<QuestionScore>,
    pub assessment: Option<ScoreUpdate>,
}

/// Load an instance question with its latest (or the given) submission
pub(super) fn select_submission_for_score_update(
    conn: &Connection,
    instance_question_id: i64,
    submission_id: Option<i64>,
) -> Result<SubmissionForScoreUpdate> {
    let row = conn
        .query_row(
            "SELECT iq.assessment_instance_id, iq.id, s.id, iq.max_points, iq.max_auto_points,
                    iq.max_manual_points, iq.manual_rubric_id, s.partial_scores,
                    iq.auto_points, iq.manual_points, s.manual_rubric_grading_id,
                    iq.grading_state, iq.modified_at
             FROM instance_questions iq
             LEFT JOIN submissions s ON s.id = (
                SELECT id FROM submissions
                WHERE instance_question_id = iq.id AND (?2 IS NULL OR id = ?2)
                ORDER BY date DESC, id DESC
                LIMIT 1
             )
             WHERE iq.id = ?1",
            params![instance_question_id, submission_id],
            |row| {
                let partial_scores: Option<String> = row.get(7)?;
                let state: String = row.get(11)?;
                Ok((
                    SubmissionForScoreUpdate {
                        assessment_instance_id: row.get(0)?,
                        instance_question_id: row.get(1)?,
                        submission_id: row.get(2)?,
                        max_points: read_real(row, 3, "max_points")?,
                        max_auto_points: read_real(row, 4, "max_auto_points")?,
                        max_manual_points: read_real(row, 5, "max_manual_points")?,
                        manual_rubric_id: row.get(6)?,
                        partial_scores: None,
                        auto_points: read_real(row, 8, "auto_points")?,
                        manual_points: read_real(row, 9, "manual_points")?,
                        manual_rubric_grading_id: row.get(10)?,
                        grading_state: GradingState::default(),
                        modified_at: read_timestamp(row, 12)?,
                        modified_at_conflict: false,
                    },
                    partial_scores,
                    state,
                ))
            },
        )
        .optional()
        .map_err(|e| map_db_err!("select instance question", e))?;

    let Some((mut current, partial_scores, state)) = row else {
        bail_not_found!("instance question", instance_question_id);
    };
    if let (Some(id), None) = (submission_id, current.submission_id) {
        bail_not_found!("submission", id);
    }

    current.partial_scores = partial_scores
        .map(|text| serde_json::from_str(&text))
        .transpose()?;
    current.grading_state = state.parse()?;
    Ok(current.sanitized())
}

struct GradingJobRow {
    submission_id: i64,
    authn_user_id: Option<i64>,
    score: Option<f64>,
    auto_points: Option<f64>,
    manual_points: Option<f64>,
    manual_rubric_grading_id: Option<i64>,
    feedback: Value,
    modified_at_conflict: bool,
}

fn insert_grading_job(conn: &Connection, job: &GradingJobRow) -> Result<i64> {
    conn.execute(
        "INSERT INTO grading_jobs
            (submission_id, authn_user_id, score, auto_points, manual_points,
             manual_rubric_grading_id, feedback, modified_at_conflict, graded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            job.submission_id,
            job.authn_user_id,
            job.score,
            job.auto_points,
            job.manual_points,
            job.manual_rubric_grading_id,
            job.feedback,
            job.modified_at_conflict,
            timestamp(&now()),
        ],
    )
    .map_err(|e| map_db_err!("insert grading job", e))?;
    Ok(conn.last_insert_rowid())
}

/// Keep an audit row of a grading attempt made against stale data.
///
/// Nothing about the question is evaluated: its state may have moved on
/// in ways that would make the attempt invalid.
fn record_conflict(
    conn: &Connection,
    current: &SubmissionForScoreUpdate,
    input: &InstanceQuestionScoreInput,
    authn_user_id: Option<i64>,
) -> Result<ScoreUpdateOutcome> {
    let grading_job_id = match current.submission_id {
        Some(sid) => Some(insert_grading_job(
            conn,
            &GradingJobRow {
                submission_id: sid,
                authn_user_id,
                score: None,
                auto_points: input.auto_points,
                manual_points: input.manual_points,
                manual_rubric_grading_id: None,
                feedback: json_column(input.feedback.as_ref())?,
                modified_at_conflict: true,
            },
        )?),
        None => None,
    };
    info!(
        instance_question_id = current.instance_question_id,
        modified_at = %current.modified_at,
        "instance question changed since it was loaded; score not updated"
    );
    Ok(ScoreUpdateOutcome::Conflict {
        instance_question_id: current.instance_question_id,
        grading_job_id,
        modified_at: current.modified_at,
    })
}

fn next_state(current: GradingState, event: Option<GradingEvent>) -> Result<GradingState> {
    match event {
        Some(event) => current.transition(event),
        None => Ok(current),
    }
}

/// Score update inside an open transaction
pub(super) fn update_score_in(
    conn: &Connection,
    config: &GradingConfig,
    instance_question_id: i64,
    submission_id: Option<i64>,
    check_modified_at: Option<&DateTime<Utc>>,
    input: &InstanceQuestionScoreInput,
    authn_user_id: Option<i64>,
) -> Result<ScoreUpdateOutcome> {
    let current = select_submission_for_score_update(conn, instance_question_id, submission_id)?
        .check_conflict(&ModifiedAtChecker, check_modified_at);

    if current.modified_at_conflict {
        return record_conflict(conn, &current, input, authn_user_id);
    }

    let rubric = match (&input.manual_rubric_data, current.manual_rubric_id) {
        (Some(data), Some(_)) => Some(load_rubric(conn, data.rubric_id)?),
        _ => None,
    };
    let change = compute_question_score(&current, input, rubric.as_ref())?;
    let grading_state = next_state(current.grading_state, change.grading_event(input.ai_graded))?;

    let rubric_grading_id = match &change.rubric_grading {
        RubricGradingChange::New(grading) => {
            let computed = grading.computed_points(&current.limits());
            Some(insert_rubric_grading(conn, grading, computed)?)
        }
        RubricGradingChange::Keep(id) => *id,
        RubricGradingChange::Clear => None,
    };

    let auto_score = change.auto_score_perc.map(|perc| perc / 100.0);
    let correct = change.auto_score_perc.map(|perc| perc > 50.0);
    let feedback = json_column(input.feedback.as_ref())?;
    let partial_scores = json_column(change.partial_scores.as_ref())?;

    let grading_job_id = match current.submission_id {
        Some(sid)
            if submission_id.is_some()
                || change.score_perc.is_some()
                || input.feedback.is_some()
                || input.partial_scores.is_some() =>
        {
            Some(insert_grading_job(
                conn,
                &GradingJobRow {
                    submission_id: sid,
                    authn_user_id,
                    score: change.score_perc.map(|perc| perc / 100.0),
                    auto_points: change.auto_points,
                    manual_points: change.manual_points,
                    manual_rubric_grading_id: rubric_grading_id,
                    feedback: feedback.clone(),
                    modified_at_conflict: false,
                },
            )?)
        }
        _ => None,
    };

    if let (Some(sid), Some(_)) = (current.submission_id, grading_job_id) {
        conn.execute(
            "UPDATE submissions
             SET feedback = COALESCE(?2, feedback),
                 partial_scores = COALESCE(?3, partial_scores),
                 manual_rubric_grading_id = ?4,
                 score = COALESCE(?5, score),
                 correct = COALESCE(?6, correct)
             WHERE id = ?1",
            params![sid, feedback, partial_scores, rubric_grading_id, auto_score, correct],
        )
        .map_err(|e| map_db_err!("update submission score", e))?;
    }

    let (Some(points), Some(score_perc)) = (change.points, change.score_perc) else {
        debug!(instance_question_id, "no score change");
        return Ok(ScoreUpdateOutcome::Applied {
            instance_question_id,
            grading_job_id,
            rubric_grading_id,
            grading_state,
            score: None,
            assessment: None,
        });
    };

    conn.execute(
        "UPDATE instance_questions
         SET points = ?2, score_perc = ?3,
             auto_points = COALESCE(?4, auto_points),
             manual_points = COALESCE(?5, manual_points),
             grading_state = ?6, last_grader = ?7, modified_at = ?8
         WHERE id = ?1",
        params![
            instance_question_id,
            points,
            score_perc,
            change.auto_points,
            change.manual_points,
            grading_state.as_str(),
            authn_user_id,
            timestamp(&now()),
        ],
    )
    .map_err(|e| map_db_err!("update instance question score", e))?;

    let store = ScoreTransaction::new(conn);
    let request = ScoreRequest::new(current.assessment_instance_id)
        .with_authn_user(authn_user_id)
        .with_credit(Some(FULL_CREDIT))
        .only_log_if_score_updated(false)
        .allow_decrease(true);
    let assessment = compute_assessment_instance_score(&store, &store, &request, &config.scoring)?;

    Ok(ScoreUpdateOutcome::Applied {
        instance_question_id,
        grading_job_id,
        rubric_grading_id,
        grading_state,
        score: Some(QuestionScore {
            points,
            score_perc,
            auto_points: change.auto_points.or(current.auto_points),
            manual_points: change.manual_points.or(current.manual_points),
        }),
        assessment: Some(assessment),
    })
}

/// Auto points and percentage reported by the external grader, if any
fn grader_points(submission: &NewSubmission, max_auto: f64) -> Option<(f64, f64)> {
    match (&submission.partial_scores, submission.auto_points) {
        (Some(scores), _) => {
            partial_scores_perc(scores).map(|perc| (perc / 100.0 * max_auto, perc))
        }
        (None, Some(points)) => {
            let perc = if max_auto > 0.0 {
                points * 100.0 / max_auto
            } else {
                0.0
            };
            Some((points, perc))
        }
        (None, None) => None,
    }
}

impl Database {
    /// Instance question with its latest submission
    pub fn instance_question(&self, instance_question_id: i64) -> Result<SubmissionForScoreUpdate> {
        select_submission_for_score_update(&self.conn, instance_question_id, None)
    }

    /// Grade an instance question and recompute its assessment instance.
    ///
    /// With `check_modified_at` set, a question modified since that time is
    /// reported as [`ScoreUpdateOutcome::Conflict`] and nothing is scored.
    pub fn update_instance_question_score(
        &self,
        instance_question_id: i64,
        submission_id: Option<i64>,
        check_modified_at: Option<&DateTime<Utc>>,
        input: &InstanceQuestionScoreInput,
        authn_user_id: Option<i64>,
    ) -> Result<ScoreUpdateOutcome> {
        let tx = self.immediate()?;
        let outcome = update_score_in(
            &tx,
            &self.config,
            instance_question_id,
            submission_id,
            check_modified_at,
            input,
            authn_user_id,
        )?;
        tx.commit()
            .map_err(|e| map_db_err!("commit instance question score", e))?;
        Ok(outcome)
    }

    /// Store a new submission.
    ///
    /// The question restarts its grading lifecycle. When the submission
    /// carries grader results, or the question has no auto points to earn,
    /// it is auto graded and the assessment instance is recomputed; the
    /// credit comes from this latest submission.
    pub fn record_submission(&self, submission: &NewSubmission, authn_user_id: Option<i64>) -> Result<SubmissionOutcome> {
        if submission.partial_scores.is_some() && submission.auto_points.is_some() {
            bail_invalid!(
                "submission",
                "cannot set both partial_scores and auto_points",
            );
        }
        if let Some(points) = submission.auto_points.filter(|p| !p.is_finite()) {
            bail_invalid!("auto_points", points);
        }

        let tx = self.immediate()?;
        let iq_id = submission.instance_question_id;
        let current = select_submission_for_score_update(&tx, iq_id, None)?;
        let mut grading_state = current.grading_state.transition(GradingEvent::NewSubmission)?;

        let max_auto = current.max_auto_points.unwrap_or(0.0);
        let grader_result = grader_points(submission, max_auto);
        // Questions without an auto-graded part go straight to manual grading
        let auto = grader_result.or((max_auto <= 0.0).then_some((0.0, 0.0)));

        tx.execute(
            "INSERT INTO submissions (instance_question_id, credit, score, correct, partial_scores, date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                iq_id,
                submission.credit,
                grader_result.map(|(_, perc)| perc / 100.0),
                grader_result.map(|(_, perc)| perc > 50.0),
                json_column(submission.partial_scores.as_ref())?,
                timestamp(&now()),
            ],
        )
        .map_err(|e| map_db_err!("insert submission", e))?;
        let submission_id = tx.last_insert_rowid();

        let mut score = None;
        let mut assessment = None;

        if let Some((auto_points, _)) = auto {
            grading_state = grading_state.transition(GradingEvent::AutoGrade)?;
            let manual_points = current.manual_points.unwrap_or(0.0);
            let points = auto_points + manual_points;
            let score_perc = current.perc_of_max(points);

            tx.execute(
                "UPDATE instance_questions
                 SET points = ?2, score_perc = ?3, auto_points = ?4,
                     grading_state = ?5, modified_at = ?6
                 WHERE id = ?1",
                params![
                    iq_id,
                    points,
                    score_perc,
                    auto_points,
                    grading_state.as_str(),
                    timestamp(&now()),
                ],
            )
            .map_err(|e| map_db_err!("update instance question score", e))?;

            let store = ScoreTransaction::new(&tx);
            let request = ScoreRequest::new(current.assessment_instance_id)
                .with_authn_user(authn_user_id)
                .only_log_if_score_updated(true);
            assessment = Some(compute_assessment_instance_score(
                &store,
                &store,
                &request,
                &self.config.scoring,
            )?);
            score = Some(QuestionScore {
                points,
                score_perc,
                auto_points: Some(auto_points),
                manual_points: current.manual_points,
            });
        } else {
            tx.execute(
                "UPDATE instance_questions SET grading_state = ?2, modified_at = ?3 WHERE id = ?1",
                params![iq_id, grading_state.as_str(), timestamp(&now())],
            )
            .map_err(|e| map_db_err!("update instance question state", e))?;
        }

        tx.commit()
            .map_err(|e| map_db_err!("commit submission", e))?;
        debug!(submission_id, instance_question_id = iq_id, %grading_state, "recorded submission");

        Ok(SubmissionOutcome {
            submission_id,
            instance_question_id: iq_id,
            grading_state,
            score,
            assessment,
        })
    }

    /// Close grading of the current submission
    pub fn finalize_instance_question(&self, instance_question_id: i64) -> Result<GradingState> {
        let tx = self.immediate()?;
        let current = select_submission_for_score_update(&tx, instance_question_id, None)?;
        let state = current.grading_state.transition(GradingEvent::Finalize)?;

        tx.execute(
            "UPDATE instance_questions SET grading_state = ?2, modified_at = ?3 WHERE id = ?1",
            params![instance_question_id, state.as_str(), timestamp(&now())],
        )
        .map_err(|e| map_db_err!("finalize instance question", e))?;
        tx.commit()
            .map_err(|e| map_db_err!("commit finalize", e))?;
        Ok(state)
    }
}
